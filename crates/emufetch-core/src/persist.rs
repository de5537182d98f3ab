//! Stream persister: copies a resolved byte stream into a scratch file
//!
//! The persister never deletes what it wrote. On failure the partial file is
//! left for the pipeline, which owns scratch cleanup.

use crate::error::{AcquireError, PersistCause};
use crate::fetch::ResolvedDownload;
use futures::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Summary of a completed copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistReport {
    pub bytes_written: u64,
    /// The source declared its length up front
    pub size_known: bool,
}

/// Copy `download` into a new file at `path`.
///
/// The file must not exist yet. `on_progress` receives `(written, total)`
/// about four times a second and once more at the end.
pub async fn persist<F>(
    download: ResolvedDownload,
    path: &Path,
    mut on_progress: F,
) -> Result<PersistReport, AcquireError>
where
    F: FnMut(u64, Option<u64>),
{
    let total = download.content_length;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| sink_failure(0, e))?;

    let mut stream = download.body;
    let mut written = 0u64;
    let mut last_progress = Instant::now();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AcquireError::PersistenceFailed {
            bytes_written: written,
            cause: PersistCause::Source(e),
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| sink_failure(written, e))?;
        written += chunk.len() as u64;

        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            on_progress(written, total);
            last_progress = Instant::now();
        }
    }

    file.flush().await.map_err(|e| sink_failure(written, e))?;
    file.sync_all().await.map_err(|e| sink_failure(written, e))?;
    drop(file);

    if let Some(expected) = total {
        if written < expected {
            warn!(written, expected, "Source ended before its declared length");
            return Err(AcquireError::PersistenceFailed {
                bytes_written: written,
                cause: PersistCause::Truncated { expected },
            });
        }
    }

    on_progress(written, total);
    info!("Persisted {} bytes to {}", written, path.display());

    Ok(PersistReport {
        bytes_written: written,
        size_known: total.is_some(),
    })
}

fn sink_failure(bytes_written: u64, error: std::io::Error) -> AcquireError {
    AcquireError::PersistenceFailed {
        bytes_written,
        cause: PersistCause::Sink(error),
    }
}
