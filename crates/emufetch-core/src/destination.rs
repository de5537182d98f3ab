//! Destination resolver: maps a content category to its target directory

use crate::error::AcquireError;
use emufetch_types::DestinationCategory;
use std::path::{Path, PathBuf};

/// Longest folder name derived from a free-text title
pub const MAX_TITLE_LEN: usize = 30;

/// Folder name used when a title sanitizes to nothing
pub const FALLBACK_TOOL_DIR: &str = "tool";

/// Turn untrusted free text into a single safe path component.
///
/// Every character outside `[A-Za-z0-9]` becomes `_`, the result is cut to
/// [`MAX_TITLE_LEN`] characters, and an empty result becomes
/// [`FALLBACK_TOOL_DIR`].
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_TITLE_LEN)
        .collect();

    if cleaned.is_empty() {
        FALLBACK_TOOL_DIR.to_string()
    } else {
        cleaned
    }
}

/// Compute the target directory for `category`.
///
/// Base-rooted categories need `base_path`; the firmware placements need
/// `firmware_root`. A missing root is an `InvalidRequest`.
pub fn resolve_target(
    category: DestinationCategory,
    base_path: Option<&Path>,
    firmware_root: Option<&Path>,
    title: Option<&str>,
) -> Result<PathBuf, AcquireError> {
    if category.uses_firmware_root() {
        let root = firmware_root.ok_or_else(|| {
            AcquireError::InvalidRequest(format!("firmwareRoot is required for category {}", category))
        })?;
        return Ok(match category {
            DestinationCategory::FirmwareKeys => root.join("keys"),
            _ => root.join("nand").join("system").join("Contents").join("registered"),
        });
    }

    let base = base_path.ok_or_else(|| {
        AcquireError::InvalidRequest(format!("basePath is required for category {}", category))
    })?;

    Ok(match category {
        DestinationCategory::Emulator => base.join("Emulators"),
        DestinationCategory::Firmware => base.join("Firmware"),
        DestinationCategory::Tool => base.join(title.map(sanitize_title).unwrap_or_else(|| FALLBACK_TOOL_DIR.to_string())),
        DestinationCategory::Wiigames => base.join("wiigames"),
        _ => base.to_path_buf(),
    })
}

/// Create the target directory (and parents) if it does not exist yet
pub async fn ensure_target(target: &Path) -> Result<(), AcquireError> {
    tokio::fs::create_dir_all(target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DestinationCategory; 7] = [
        DestinationCategory::Emulator,
        DestinationCategory::Firmware,
        DestinationCategory::Tool,
        DestinationCategory::Wiigames,
        DestinationCategory::Base,
        DestinationCategory::FirmwareKeys,
        DestinationCategory::FirmwareContent,
    ];

    fn is_safe(name: &str) -> bool {
        (1..=MAX_TITLE_LEN).contains(&name.len())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    #[test]
    fn sanitize_replaces_and_truncates() {
        assert_eq!(sanitize_title("Ryujinx 1.1!"), "Ryujinx_1_1_");
        assert_eq!(sanitize_title("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_title(""), "tool");
        assert_eq!(
            sanitize_title("An extremely long tool title that keeps going"),
            "An_extremely_long_tool_title_t"
        );
    }

    #[test]
    fn sanitize_is_idempotent_and_safe() {
        let samples = [
            "",
            "   ",
            "Yuzu Early Access",
            "émulateur · ünïcode ☃",
            "a/b\\c:d*e?f\"g<h>i|j",
            "0123456789012345678901234567890123456789",
            "___",
        ];
        for sample in samples {
            let once = sanitize_title(sample);
            assert!(is_safe(&once), "{:?} -> {:?}", sample, once);
            assert_eq!(sanitize_title(&once), once);
        }
    }

    #[test]
    fn category_targets_stay_under_their_root() {
        let base = Path::new("/data/switch");
        let firmware = Path::new("/data/ryujinx");

        for category in ALL {
            let target = resolve_target(category, Some(base), Some(firmware), Some("../../escape")).unwrap();
            if category.uses_firmware_root() {
                assert!(target.starts_with(firmware), "{} -> {}", category, target.display());
            } else {
                assert!(target.starts_with(base), "{} -> {}", category, target.display());
            }
        }
    }

    #[test]
    fn category_table() {
        let base = Path::new("/b");
        let fw = Path::new("/fw");
        let target = |c| resolve_target(c, Some(base), Some(fw), None).unwrap();

        assert_eq!(target(DestinationCategory::Emulator), PathBuf::from("/b/Emulators"));
        assert_eq!(target(DestinationCategory::Firmware), PathBuf::from("/b/Firmware"));
        assert_eq!(target(DestinationCategory::Tool), PathBuf::from("/b/tool"));
        assert_eq!(target(DestinationCategory::Wiigames), PathBuf::from("/b/wiigames"));
        assert_eq!(target(DestinationCategory::Base), PathBuf::from("/b"));
        assert_eq!(target(DestinationCategory::FirmwareKeys), PathBuf::from("/fw/keys"));
        assert_eq!(
            target(DestinationCategory::FirmwareContent),
            PathBuf::from("/fw/nand/system/Contents/registered")
        );
    }

    #[test]
    fn missing_roots_are_invalid_requests() {
        let err = resolve_target(DestinationCategory::FirmwareKeys, Some(Path::new("/b")), None, None)
            .unwrap_err();
        assert!(matches!(err, AcquireError::InvalidRequest(_)));

        let err = resolve_target(DestinationCategory::Emulator, None, Some(Path::new("/fw")), None)
            .unwrap_err();
        assert!(matches!(err, AcquireError::InvalidRequest(_)));
    }
}
