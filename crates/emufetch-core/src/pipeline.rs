//! Pipeline orchestrator
//!
//! One run takes a request through
//! `Validating -> Downloading -> FormatDetecting -> Extracting -> Cleaning -> Completed`,
//! with `Failed` reachable from every non-terminal stage. Every transition is
//! logged and broadcast as a [`PipelineEvent`]. `FormatDetecting` is skipped
//! when the content is moved into place as-is.
//!
//! The scratch file is removed on every path once it has been allocated. A
//! failed removal is attached to the outcome as a warning and never turns a
//! successful placement into a failure.

use crate::destination::{ensure_target, resolve_target};
use crate::error::AcquireError;
use crate::extract::ExtractionDispatcher;
use crate::fetch::{fetch, ResolvedDownload};
use crate::format::{classify_name, detect, NameHint};
use crate::persist::persist;
use crate::provider::{extract_file_id, is_provider_url, DriveResolver};
use crate::scratch::ScratchArtifact;
use emufetch_types::{
    AcquisitionOutcome, AcquisitionRequest, DestinationCategory, DetectedFormat, Placement,
    PipelineEvent, PipelineStage, Settings,
};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// Name used when neither the request, the response nor the URL names the file
const FALLBACK_FILE_NAME: &str = "download";

/// A request that passed validation
#[derive(Debug)]
struct Plan {
    url: Url,
    target: PathBuf,
}

/// What to do with the persisted bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Unpack(DetectedFormat),
    Move,
}

/// Successful stages before cleanup
struct Placed {
    file_name: String,
    bytes_downloaded: u64,
    placement: Placement,
}

/// Runs acquisition requests end to end
#[derive(Debug, Clone)]
pub struct Pipeline {
    client: Client,
    drive: DriveResolver,
    dispatcher: ExtractionDispatcher,
    drive_host: String,
    scratch_dir: PathBuf,
    events: broadcast::Sender<PipelineEvent>,
}

impl Pipeline {
    pub fn new(settings: &Settings, client: Client, events: broadcast::Sender<PipelineEvent>) -> Self {
        Self {
            drive: DriveResolver::new(client.clone(), settings.drive_endpoint.clone()),
            client,
            dispatcher: ExtractionDispatcher::new(settings.seven_zip_path.clone()),
            drive_host: settings.drive_host.clone(),
            scratch_dir: settings.scratch_dir(),
            events,
        }
    }

    pub fn dispatcher(&self) -> &ExtractionDispatcher {
        &self.dispatcher
    }

    pub fn drive(&self) -> &DriveResolver {
        &self.drive
    }

    /// Fetch, place and clean up after one request
    pub async fn run(&self, request: AcquisitionRequest) -> Result<AcquisitionOutcome, AcquireError> {
        let request_id = Uuid::new_v4();
        info!(%request_id, category = %request.category, url = %request.url, "Starting acquisition");

        self.stage(request_id, PipelineStage::Validating);
        let plan = match validate(&request) {
            Ok(plan) => plan,
            Err(e) => return self.fail(request_id, e),
        };

        let mut scratch = match ScratchArtifact::allocate(&self.scratch_dir, request_id).await {
            Ok(scratch) => scratch,
            Err(e) => return self.fail(request_id, e),
        };

        let placed = self.place(request_id, &request, &plan, &mut scratch).await;

        self.stage(request_id, PipelineStage::Cleaning);
        let cleanup = scratch.remove().await;

        let placed = match placed {
            Ok(placed) => placed,
            Err(e) => {
                if let Err(cleanup_err) = cleanup {
                    warn!(%request_id, "{}", cleanup_err);
                }
                return self.fail(request_id, e);
            }
        };

        let cleanup_error = cleanup.err().map(|e| {
            warn!(%request_id, "Placement succeeded but {}", e);
            e.to_string()
        });

        self.stage(request_id, PipelineStage::Completed);
        let _ = self.events.send(PipelineEvent::Finished {
            request_id,
            error: None,
        });

        Ok(AcquisitionOutcome {
            request_id,
            file_name: placed.file_name,
            bytes_downloaded: placed.bytes_downloaded,
            placement: placed.placement,
            cleanup_error,
            completed_at: chrono::Utc::now(),
        })
    }

    /// Downloading, FormatDetecting and Extracting
    async fn place(
        &self,
        request_id: Uuid,
        request: &AcquisitionRequest,
        plan: &Plan,
        scratch: &mut ScratchArtifact,
    ) -> Result<Placed, AcquireError> {
        self.stage(request_id, PipelineStage::Downloading);
        let download = self.resolve(&plan.url).await?;
        let file_name = effective_file_name(
            request.file_name.as_deref(),
            download.file_name.as_deref(),
            &download.final_url,
        );
        debug!(%request_id, file_name = %file_name, final_url = %download.final_url, "Resolved download");

        let events = self.events.clone();
        let report = persist(download, scratch.path(), move |downloaded, total| {
            let _ = events.send(PipelineEvent::DownloadProgress {
                request_id,
                downloaded,
                total,
            });
        })
        .await?;
        scratch.mark_complete(report.size_known);

        let action = if moves_directly(request.category, &file_name) {
            Action::Move
        } else {
            self.stage(request_id, PipelineStage::FormatDetecting);
            Action::Unpack(archive_format(&file_name, scratch.path()).await?)
        };
        info!(%request_id, ?action, "Placement decided");

        self.stage(request_id, PipelineStage::Extracting);
        let placement = match action {
            Action::Unpack(format) => {
                let outcome = self
                    .dispatcher
                    .extract(scratch.path(), &plan.target, format)
                    .await?;
                Placement::Extracted { format, outcome }
            }
            Action::Move => {
                ensure_target(&plan.target).await?;
                move_file(scratch.path(), &plan.target.join(&file_name)).await?;
                Placement::Moved {
                    moved_file_name: file_name.clone(),
                    target_dir: plan.target.clone(),
                }
            }
        };

        Ok(Placed {
            file_name,
            bytes_downloaded: report.bytes_written,
            placement,
        })
    }

    async fn resolve(&self, url: &Url) -> Result<ResolvedDownload, AcquireError> {
        if is_provider_url(url, &self.drive_host) {
            let file_id =
                extract_file_id(url).ok_or_else(|| AcquireError::MissingFileId(url.to_string()))?;
            self.drive.resolve(&file_id).await
        } else {
            fetch(&self.client, url.as_str()).await
        }
    }

    fn stage(&self, request_id: Uuid, stage: PipelineStage) {
        info!(%request_id, ?stage, "Stage changed");
        let _ = self
            .events
            .send(PipelineEvent::StageChanged { request_id, stage });
    }

    fn fail<T>(&self, request_id: Uuid, error: AcquireError) -> Result<T, AcquireError> {
        error!(%request_id, kind = ?error.kind(), "Acquisition failed: {}", error);
        self.stage(request_id, PipelineStage::Failed);
        let _ = self.events.send(PipelineEvent::Finished {
            request_id,
            error: Some(error.to_string()),
        });
        Err(error)
    }
}

/// Reject malformed requests before any network or disk I/O
fn validate(request: &AcquisitionRequest) -> Result<Plan, AcquireError> {
    let raw = request.url.trim();
    if raw.is_empty() {
        return Err(AcquireError::InvalidRequest("url is required".to_string()));
    }

    let url = Url::parse(raw)
        .map_err(|e| AcquireError::InvalidRequest(format!("invalid url {:?}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AcquireError::InvalidRequest(format!(
            "unsupported url scheme: {}",
            url.scheme()
        )));
    }

    let target = resolve_target(
        request.category,
        non_empty(request.base_path.as_deref()),
        non_empty(request.firmware_root.as_deref()),
        request.title.as_deref(),
    )?;

    Ok(Plan { url, target })
}

fn non_empty(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

/// Pick the name the content is placed (or detected) under.
///
/// Order: declared name, `Content-Disposition`, last URL segment, then
/// [`FALLBACK_FILE_NAME`]. Only the final path component of a candidate counts.
pub fn effective_file_name(declared: Option<&str>, disposition: Option<&str>, url: &str) -> String {
    let from_url = Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .map(|segment| {
                urlencoding::decode(&segment)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or(segment)
            })
    });

    [declared.map(str::to_string), disposition.map(str::to_string), from_url]
        .into_iter()
        .flatten()
        .find_map(|candidate| final_component(&candidate))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Last `/`- or `\`-separated piece of `name`, unless it is empty or a dot entry
fn final_component(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next()?.trim();
    match last {
        "" | "." | ".." => None,
        _ => Some(last.to_string()),
    }
}

/// A non-archive extension goes straight into place unless the category needs an archive
fn moves_directly(category: DestinationCategory, file_name: &str) -> bool {
    classify_name(file_name) == NameHint::Other && !category.requires_archive()
}

async fn archive_format(file_name: &str, scratch: &Path) -> Result<DetectedFormat, AcquireError> {
    let format = detect(Some(file_name), scratch).await?;
    if format.is_archive() {
        Ok(format)
    } else {
        Err(AcquireError::UnsupportedFormat(file_name.to_string()))
    }
}

/// Rename into place; across filesystems, copy and leave the source for cleanup
async fn move_file(from: &Path, to: &Path) -> Result<(), AcquireError> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("Rename to {} failed ({}), copying instead", to.display(), e);
            tokio::fs::copy(from, to).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_precedence() {
        let url = "https://example.com/files/Ryujinx%201.1.zip?dl=1";
        assert_eq!(
            effective_file_name(Some("keys.zip"), Some("other.7z"), url),
            "keys.zip"
        );
        assert_eq!(effective_file_name(None, Some("other.7z"), url), "other.7z");
        assert_eq!(effective_file_name(None, None, url), "Ryujinx 1.1.zip");
        assert_eq!(effective_file_name(None, None, "https://example.com/"), "download");
        assert_eq!(effective_file_name(Some(""), None, "not a url"), "download");
    }

    #[test]
    fn file_names_cannot_traverse() {
        let url = "https://example.com/";
        assert_eq!(effective_file_name(Some("../../etc/passwd"), None, url), "passwd");
        assert_eq!(effective_file_name(Some("..\\..\\boot.ini"), None, url), "boot.ini");
        assert_eq!(effective_file_name(Some("dir/.."), Some("ok.zip"), url), "ok.zip");
    }

    #[test]
    fn validation_rejects_before_io() {
        let missing_url = AcquisitionRequest::new("  ", DestinationCategory::Emulator)
            .with_base_path("/games");
        assert!(matches!(validate(&missing_url), Err(AcquireError::InvalidRequest(_))));

        let bad_url = AcquisitionRequest::new("not a url", DestinationCategory::Emulator)
            .with_base_path("/games");
        assert!(matches!(validate(&bad_url), Err(AcquireError::InvalidRequest(_))));

        let ftp = AcquisitionRequest::new("ftp://example.com/a.zip", DestinationCategory::Emulator)
            .with_base_path("/games");
        assert!(matches!(validate(&ftp), Err(AcquireError::InvalidRequest(_))));

        let no_base = AcquisitionRequest::new("https://example.com/a.zip", DestinationCategory::Tool)
            .with_base_path("");
        assert!(matches!(validate(&no_base), Err(AcquireError::InvalidRequest(_))));

        let no_root =
            AcquisitionRequest::new("https://example.com/k.zip", DestinationCategory::FirmwareKeys);
        assert!(matches!(validate(&no_root), Err(AcquireError::InvalidRequest(_))));
    }

    #[test]
    fn validation_resolves_target() {
        let request = AcquisitionRequest::new("https://example.com/t.zip", DestinationCategory::Tool)
            .with_base_path("/games")
            .with_title("My Tool!");
        let plan = validate(&request).unwrap();
        assert_eq!(plan.target, PathBuf::from("/games/My_Tool_"));
    }

    #[tokio::test]
    async fn non_archive_extension_is_moved_unless_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.part");
        std::fs::write(&path, b"PK\x03\x04 looks like zip").unwrap();

        assert!(moves_directly(DestinationCategory::Base, "game.nsp"));
        assert!(!moves_directly(DestinationCategory::Base, "uc"));
        assert!(!moves_directly(DestinationCategory::FirmwareKeys, "prod.keys"));

        assert_eq!(archive_format("uc", &path).await.unwrap(), DetectedFormat::Zip);
        assert!(matches!(
            archive_format("prod.keys", &path).await,
            Err(AcquireError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn move_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("scratch.part");
        let to = dir.path().join("game.nsp");
        std::fs::write(&from, b"new").unwrap();
        std::fs::write(&to, b"old").unwrap();

        move_file(&from, &to).await.unwrap();
        assert_eq!(std::fs::read(&to).unwrap(), b"new");
    }
}
