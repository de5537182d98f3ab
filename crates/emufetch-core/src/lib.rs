//! emufetch Core - Acquisition Pipeline
//!
//! This crate fetches remote archives (plain URLs or Google Drive shares),
//! persists them to scratch files, unpacks or moves them into a category
//! folder, and always cleans up after itself.

mod destination;
mod error;
mod extract;
mod fetch;
mod format;
mod layout;
mod persist;
mod pipeline;
mod provider;
mod scratch;
mod settings;

pub use destination::*;
pub use error::*;
pub use extract::*;
pub use fetch::*;
pub use format::*;
pub use layout::*;
pub use persist::*;
pub use pipeline::*;
pub use provider::*;
pub use scratch::*;
pub use settings::*;

use emufetch_types::{AcquisitionOutcome, AcquisitionRequest, ExtractionOutcome, PipelineEvent, Settings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// The main emufetch core instance
#[derive(Debug, Clone)]
pub struct EmufetchCore {
    /// Settings the core was built with
    settings: Arc<Settings>,
    /// Event broadcaster
    event_tx: broadcast::Sender<PipelineEvent>,
    /// Request runner
    pipeline: Arc<Pipeline>,
}

impl EmufetchCore {
    /// Create a new core from loaded settings
    pub fn new(settings: Settings) -> Result<Self, AcquireError> {
        let client = build_client(&settings)?;
        let (event_tx, _) = broadcast::channel(256);
        let pipeline = Arc::new(Pipeline::new(&settings, client, event_tx.clone()));

        info!(
            seven_zip = %settings.seven_zip_path.display(),
            scratch = %settings.scratch_dir().display(),
            "emufetch core ready"
        );

        Ok(Self {
            settings: Arc::new(settings),
            event_tx,
            pipeline,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Fetch, place and clean up after one request.
    ///
    /// The run is spawned onto its own task, so dropping the returned future
    /// (a caller that went away) leaves it to finish and clean up.
    pub async fn acquire(&self, request: AcquisitionRequest) -> Result<AcquisitionOutcome, AcquireError> {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move { pipeline.run(request).await }).await?
    }

    /// Unpack an archive that is already on disk. The archive is left in place.
    pub async fn extract_local(
        &self,
        archive: &Path,
        target: &Path,
    ) -> Result<ExtractionOutcome, AcquireError> {
        if archive.as_os_str().is_empty() || target.as_os_str().is_empty() {
            return Err(AcquireError::InvalidRequest(
                "archivePath and targetDir are required".to_string(),
            ));
        }
        match tokio::fs::metadata(archive).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(AcquireError::NotFound(archive.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AcquireError::NotFound(archive.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        }

        let name = archive.file_name().and_then(|n| n.to_str());
        let format = detect(name, archive).await?;
        self.pipeline.dispatcher().extract(archive, target, format).await
    }

    /// Create the library folder skeleton under `base`
    pub async fn create_skeleton(&self, base: &Path) -> Result<Vec<PathBuf>, AcquireError> {
        create_skeleton(base).await
    }

    /// Resolve a Drive file id into a byte stream without persisting it
    pub async fn open_drive_stream(&self, file_id: &str) -> Result<ResolvedDownload, AcquireError> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            return Err(AcquireError::InvalidRequest("fileId is required".to_string()));
        }
        self.pipeline.drive().resolve(file_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn core() -> EmufetchCore {
        EmufetchCore::new(Settings::default()).unwrap()
    }

    #[tokio::test]
    async fn extract_local_missing_archive_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = core()
            .extract_local(&dir.path().join("absent.zip"), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::NotFound(_)));
    }

    #[tokio::test]
    async fn extract_local_rejects_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = core()
            .extract_local(dir.path(), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::NotFound(_)));
    }

    #[tokio::test]
    async fn extract_local_keeps_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        {
            let mut writer = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
            writer
                .start_file("readme.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"hi").unwrap();
            writer.finish().unwrap();
        }

        let target = dir.path().join("out");
        let outcome = core().extract_local(&archive, &target).await.unwrap();
        assert_eq!(outcome.extracted_files, vec!["readme.txt"]);
        assert!(archive.exists());
    }

    #[tokio::test]
    async fn drive_stream_needs_an_id() {
        let err = core().open_drive_stream("  ").await.unwrap_err();
        assert!(matches!(err, AcquireError::InvalidRequest(_)));
    }
}
