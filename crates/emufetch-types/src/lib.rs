//! Shared types for emufetch
//!
//! This crate contains the request, outcome, event and settings structures
//! shared by the core pipeline, the HTTP service and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

// ============================================================================
// Request Types
// ============================================================================

/// Where acquired content ends up, relative to the base or firmware root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestinationCategory {
    Emulator,
    Firmware,
    Tool,
    #[serde(alias = "game")]
    Wiigames,
    /// Key files placed under `<firmware root>/keys`
    FirmwareKeys,
    /// Installed firmware content under `<firmware root>/nand/system/Contents/registered`
    FirmwareContent,
    #[serde(other)]
    Base,
}

impl DestinationCategory {
    /// Categories placed beneath the firmware root instead of the base path
    pub fn uses_firmware_root(&self) -> bool {
        matches!(self, Self::FirmwareKeys | Self::FirmwareContent)
    }

    /// Content for this category must be an archive; it is never moved as-is
    pub fn requires_archive(&self) -> bool {
        matches!(self, Self::FirmwareKeys)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emulator => "emulator",
            Self::Firmware => "firmware",
            Self::Tool => "tool",
            Self::Wiigames => "wiigames",
            Self::FirmwareKeys => "firmware-keys",
            Self::FirmwareContent => "firmware-content",
            Self::Base => "base",
        }
    }
}

impl std::fmt::Display for DestinationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DestinationCategory {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to `Base`, same as the JSON form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "emulator" => Self::Emulator,
            "firmware" => Self::Firmware,
            "tool" => Self::Tool,
            "wiigames" | "game" => Self::Wiigames,
            "firmware-keys" => Self::FirmwareKeys,
            "firmware-content" => Self::FirmwareContent,
            _ => Self::Base,
        })
    }
}

/// A single acquire-and-place request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionRequest {
    pub url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub base_path: Option<PathBuf>,
    pub category: DestinationCategory,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub firmware_root: Option<PathBuf>,
}

impl AcquisitionRequest {
    pub fn new(url: impl Into<String>, category: DestinationCategory) -> Self {
        Self {
            url: url.into(),
            file_name: None,
            base_path: None,
            category,
            title: None,
            firmware_root: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_firmware_root(mut self, firmware_root: impl Into<PathBuf>) -> Self {
        self.firmware_root = Some(firmware_root.into());
        self
    }
}

// ============================================================================
// Outcome Types
// ============================================================================

/// Archive container family, derived from a name or leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DetectedFormat {
    Zip,
    /// `.7z` and `.rar`, both handled by the external archive tool
    SevenZipFamily,
    Unknown,
}

impl DetectedFormat {
    pub fn is_archive(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Result of unpacking one archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    /// Top-level entries of the target directory, sorted
    pub extracted_files: Vec<String>,
    pub target_dir: PathBuf,
}

/// What the pipeline did with the fetched content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Placement {
    Extracted {
        format: DetectedFormat,
        #[serde(flatten)]
        outcome: ExtractionOutcome,
    },
    #[serde(rename_all = "camelCase")]
    Moved {
        moved_file_name: String,
        target_dir: PathBuf,
    },
}

impl Placement {
    pub fn target_dir(&self) -> &PathBuf {
        match self {
            Placement::Extracted { outcome, .. } => &outcome.target_dir,
            Placement::Moved { target_dir, .. } => target_dir,
        }
    }
}

/// Terminal success of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionOutcome {
    pub request_id: Uuid,
    pub file_name: String,
    pub bytes_downloaded: u64,
    pub placement: Placement,
    /// Set when the scratch file could not be removed; the placement still stands
    pub cleanup_error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

// ============================================================================
// Error Kinds
// ============================================================================

/// Stable, serializable classification of pipeline failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidRequest,
    MissingFileId,
    ConfirmationTokenNotFound,
    Network,
    PersistenceFailed,
    UnsupportedFormat,
    ZipExtractionFailed,
    SevenZipExtractionFailed,
    ArchiveToolUnavailable,
    NoFilesExtracted,
    CleanupFailed,
    NotFound,
    Io,
}

// ============================================================================
// Pipeline Events
// ============================================================================

/// Stage of a single acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    Validating,
    Downloading,
    FormatDetecting,
    Extracting,
    Cleaning,
    Completed,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Events emitted by the core while a request runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PipelineEvent {
    StageChanged {
        request_id: Uuid,
        stage: PipelineStage,
    },
    DownloadProgress {
        request_id: Uuid,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        request_id: Uuid,
        error: Option<String>,
    },
}

// ============================================================================
// Settings Types
// ============================================================================

/// Pipeline settings, stored as camelCase JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Executable of the 7z-compatible archive tool
    pub seven_zip_path: PathBuf,
    /// Directory for scratch files; the OS temp dir when unset
    pub scratch_dir: Option<PathBuf>,
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// URLs whose host contains this go through the confirmation-token resolver
    pub drive_host: String,
    pub drive_endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seven_zip_path: PathBuf::from("7z"),
            scratch_dir: None,
            user_agent: "Mozilla/5.0".to_string(),
            connect_timeout_secs: 30,
            drive_host: "drive.google.com".to_string(),
            drive_endpoint: "https://drive.google.com/uc".to_string(),
        }
    }
}

impl Settings {
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_category_falls_back_to_base() {
        let category: DestinationCategory = serde_json::from_str("\"switch-roms\"").unwrap();
        assert_eq!(category, DestinationCategory::Base);
        assert_eq!("nonsense".parse::<DestinationCategory>().unwrap(), DestinationCategory::Base);
    }

    #[test]
    fn game_alias_maps_to_wiigames() {
        let category: DestinationCategory = serde_json::from_str("\"game\"").unwrap();
        assert_eq!(category, DestinationCategory::Wiigames);
        assert_eq!(category.to_string(), "wiigames");
    }

    #[test]
    fn request_accepts_camel_case_json() {
        let request: AcquisitionRequest = serde_json::from_str(
            r#"{"url":"https://example.com/a.zip","basePath":"/games","category":"tool","title":"My Tool"}"#,
        )
        .unwrap();
        assert_eq!(request.category, DestinationCategory::Tool);
        assert_eq!(request.base_path, Some(PathBuf::from("/games")));
        assert!(request.file_name.is_none());
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"sevenZipPath":"/opt/7za"}"#).unwrap();
        assert_eq!(settings.seven_zip_path, PathBuf::from("/opt/7za"));
        assert_eq!(settings.drive_host, "drive.google.com");
    }

    #[test]
    fn moved_placement_serializes_flat() {
        let placement = Placement::Moved {
            moved_file_name: "prod.keys".to_string(),
            target_dir: PathBuf::from("/fw/keys"),
        };
        let value = serde_json::to_value(&placement).unwrap();
        assert_eq!(value["kind"], "moved");
        assert_eq!(value["movedFileName"], "prod.keys");
    }

    #[test]
    fn stage_event_uses_camel_case_names() {
        let event = PipelineEvent::StageChanged {
            request_id: Uuid::nil(),
            stage: PipelineStage::FormatDetecting,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["payload"]["stage"], "formatDetecting");
    }
}
