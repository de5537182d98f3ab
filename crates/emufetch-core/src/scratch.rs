//! Per-request scratch files

use crate::error::AcquireError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Transient file holding downloaded bytes for exactly one request
#[derive(Debug)]
pub struct ScratchArtifact {
    path: PathBuf,
    size_known_at_completion: bool,
}

impl ScratchArtifact {
    /// Reserve a unique path inside `scratch_dir`, creating the directory if needed.
    /// The file itself is created by the persister.
    pub async fn allocate(scratch_dir: &Path, request_id: Uuid) -> Result<Self, AcquireError> {
        tokio::fs::create_dir_all(scratch_dir).await?;
        Ok(Self {
            path: scratch_dir.join(format!("emufetch-{}.part", request_id)),
            size_known_at_completion: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_known_at_completion(&self) -> bool {
        self.size_known_at_completion
    }

    pub(crate) fn mark_complete(&mut self, size_known: bool) {
        self.size_known_at_completion = size_known;
    }

    /// Delete the scratch file. A file that is already gone (moved into place,
    /// or never written) counts as removed.
    pub async fn remove(&self) -> Result<(), AcquireError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AcquireError::CleanupFailed {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for ScratchArtifact {
    fn drop(&mut self) {
        if std::fs::remove_file(&self.path).is_ok() {
            debug!(path = %self.path.display(), "Removed scratch file on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paths_are_unique_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let a = ScratchArtifact::allocate(dir.path(), Uuid::new_v4()).await.unwrap();
        let b = ScratchArtifact::allocate(dir.path(), Uuid::new_v4()).await.unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(dir.path()));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArtifact::allocate(&dir.path().join("nested"), Uuid::new_v4())
            .await
            .unwrap();
        std::fs::write(scratch.path(), b"partial").unwrap();

        scratch.remove().await.unwrap();
        assert!(!scratch.path().exists());
        scratch.remove().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_scratch_takes_its_file_along() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchArtifact::allocate(dir.path(), Uuid::new_v4()).await.unwrap();
        let path = scratch.path().to_path_buf();
        std::fs::write(&path, b"partial").unwrap();

        drop(scratch);
        assert!(!path.exists());
    }
}
