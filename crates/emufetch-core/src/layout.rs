//! Library folder skeleton under a user-chosen base directory

use crate::error::AcquireError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Leaf directories of the skeleton, relative to the base
pub const SKELETON: [&[&str]; 6] = [
    &["Emulators"],
    &["Switch games", "Roms"],
    &["Switch games", "Updates"],
    &["Switch games", "Dlc"],
    &["WiiGames"],
    &["Firmware", "misc"],
];

/// Create every skeleton directory that does not exist yet and return them all
pub async fn create_skeleton(base: &Path) -> Result<Vec<PathBuf>, AcquireError> {
    if base.as_os_str().is_empty() {
        return Err(AcquireError::InvalidRequest("basePath is required".to_string()));
    }

    let mut created = Vec::with_capacity(SKELETON.len());
    for parts in SKELETON {
        let dir = parts.iter().fold(base.to_path_buf(), |dir, part| dir.join(part));
        tokio::fs::create_dir_all(&dir).await?;
        created.push(dir);
    }

    info!("Library skeleton ready under {}", base.display());
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_all_folders_and_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("library");

        let first = create_skeleton(&base).await.unwrap();
        assert_eq!(first.len(), SKELETON.len());
        assert!(base.join("Switch games").join("Dlc").is_dir());
        assert!(base.join("Firmware").join("misc").is_dir());

        std::fs::write(base.join("Emulators").join("keep.txt"), b"x").unwrap();
        let second = create_skeleton(&base).await.unwrap();
        assert_eq!(first, second);
        assert!(base.join("Emulators").join("keep.txt").exists());
    }

    #[tokio::test]
    async fn empty_base_is_rejected() {
        let err = create_skeleton(Path::new("")).await.unwrap_err();
        assert!(matches!(err, AcquireError::InvalidRequest(_)));
    }
}
