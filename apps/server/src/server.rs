//! HTTP service
//!
//! Exposes the acquisition pipeline to a browser front end. `/api/acquire`
//! takes a full request; the older per-purpose routes (`/download-dynamic`,
//! `/download-emulator`, `/download-keys`) map their bodies onto one.

use crate::error::ApiError;
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequest, Request, State},
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use emufetch_core::EmufetchCore;
use emufetch_types::{AcquisitionOutcome, AcquisitionRequest, DestinationCategory, Placement};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicDownloadRequest {
    pub url: Option<String>,
    pub file_name: Option<String>,
    pub base_path: Option<PathBuf>,
    pub destination_type: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmulatorDownloadRequest {
    pub url: Option<String>,
    pub file_name: Option<String>,
    pub base_path: Option<PathBuf>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub subtype: Option<String>,
    pub firmware_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysDownloadRequest {
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub subtype: Option<String>,
    pub firmware_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFoldersRequest {
    pub base_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub archive_path: Option<PathBuf>,
    pub target_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareDownloadRequest {
    pub file_id: Option<String>,
    pub filename: Option<String>,
}

/// Success body for every placement route
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_file_name: Option<String>,
    pub target_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_warning: Option<String>,
}

impl From<AcquisitionOutcome> for PlacementResponse {
    fn from(outcome: AcquisitionOutcome) -> Self {
        let request_id = Some(outcome.request_id);
        let cleanup_warning = outcome.cleanup_error;
        match outcome.placement {
            Placement::Extracted { outcome, .. } => Self {
                message: "Download and extraction complete.".to_string(),
                request_id,
                files: Some(outcome.extracted_files),
                moved_file_name: None,
                target_dir: outcome.target_dir,
                cleanup_warning,
            },
            Placement::Moved {
                moved_file_name,
                target_dir,
            } => Self {
                message: "Download complete.".to_string(),
                request_id,
                files: None,
                moved_file_name: Some(moved_file_name),
                target_dir,
                cleanup_warning,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldersResponse {
    pub message: String,
    pub folders: Vec<PathBuf>,
}

// ============================================================================
// API Server
// ============================================================================

pub struct ApiServer {
    core: EmufetchCore,
    addr: SocketAddr,
    allowed_origins: Vec<HeaderValue>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(core: EmufetchCore, addr: SocketAddr, allowed_origins: Vec<HeaderValue>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            core,
            addr,
            allowed_origins,
            shutdown_tx,
        }
    }

    /// Handle that stops a running server when sent to
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let app = router(self.core.clone(), &self.allowed_origins);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("emufetch server listening on http://{}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        tracing::info!("emufetch server stopped");
        Ok(())
    }
}

/// Cross-origin policy: listed origins only, with credentials
pub fn cors_layer(allowed_origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins.iter().cloned()))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn router(core: EmufetchCore, allowed_origins: &[HeaderValue]) -> Router {
    Router::new()
        // Liveness
        .route("/ping", get(|| async { "pong" }))
        // Pipeline
        .route("/api/acquire", post(handle_acquire))
        .route("/download-dynamic", post(handle_download_dynamic))
        .route("/download-emulator", post(handle_download_emulator))
        .route("/download-keys", post(handle_download_keys))
        // Local operations
        .route("/create-folders", post(handle_create_folders))
        .route("/extract", post(handle_extract))
        // Drive proxy
        .route("/firmware-download", post(handle_firmware_download))
        .layer(cors_layer(allowed_origins))
        .with_state(core)
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// JSON body whose rejections answer with the usual error body
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

fn required<T>(value: Option<T>, message: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(message))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn run(core: &EmufetchCore, request: AcquisitionRequest) -> Result<Json<PlacementResponse>, ApiError> {
    let outcome = core.acquire(request).await?;
    Ok(Json(outcome.into()))
}

/// POST /api/acquire
async fn handle_acquire(
    State(core): State<EmufetchCore>,
    ApiJson(request): ApiJson<AcquisitionRequest>,
) -> Result<Json<PlacementResponse>, ApiError> {
    run(&core, request).await
}

/// POST /download-dynamic: category taken from `destinationType`
async fn handle_download_dynamic(
    State(core): State<EmufetchCore>,
    ApiJson(req): ApiJson<DynamicDownloadRequest>,
) -> Result<Json<PlacementResponse>, ApiError> {
    const MISSING: &str = "Missing url, fileName, or basePath";
    let url = required(non_blank(req.url), MISSING)?;
    let file_name = required(non_blank(req.file_name), MISSING)?;
    let base_path = required(req.base_path, MISSING)?;

    let category = req
        .destination_type
        .as_deref()
        .map(|t| t.parse().unwrap_or(DestinationCategory::Base))
        .unwrap_or(DestinationCategory::Base);

    let mut request = AcquisitionRequest::new(url, category)
        .with_file_name(file_name)
        .with_base_path(base_path);
    request.title = req.title;

    run(&core, request).await
}

/// POST /download-emulator: firmware content when `type=tool, subtype=firmware`
async fn handle_download_emulator(
    State(core): State<EmufetchCore>,
    ApiJson(req): ApiJson<EmulatorDownloadRequest>,
) -> Result<Json<PlacementResponse>, ApiError> {
    const MISSING: &str = "Missing url, fileName, or basePath";
    let url = required(non_blank(req.url), MISSING)?;
    let file_name = required(non_blank(req.file_name), MISSING)?;
    let base_path = required(req.base_path, MISSING)?;

    let is_firmware =
        req.kind.as_deref() == Some("tool") && req.subtype.as_deref() == Some("firmware");

    let request = if is_firmware {
        let firmware_path = required(req.firmware_path, "Missing firmwarePath in request body.")?;
        AcquisitionRequest::new(url, DestinationCategory::FirmwareContent)
            .with_firmware_root(firmware_path)
    } else {
        AcquisitionRequest::new(url, DestinationCategory::Emulator)
    }
    .with_file_name(file_name)
    .with_base_path(base_path);

    run(&core, request).await
}

/// POST /download-keys: always unpacked under `<firmwarePath>/keys`
async fn handle_download_keys(
    State(core): State<EmufetchCore>,
    ApiJson(req): ApiJson<KeysDownloadRequest>,
) -> Result<Json<PlacementResponse>, ApiError> {
    const MISSING: &str = "Missing required fields (url, type, subtype, firmwarePath)";
    let url = required(non_blank(req.url), MISSING)?;
    let kind = required(req.kind, MISSING)?;
    let subtype = required(req.subtype, MISSING)?;
    let firmware_path = required(req.firmware_path, MISSING)?;

    if kind != "tool" || subtype != "firmware" {
        return Err(ApiError::bad_request("Invalid type or subtype"));
    }

    let request = AcquisitionRequest::new(url, DestinationCategory::FirmwareKeys)
        .with_firmware_root(firmware_path);
    run(&core, request).await
}

/// POST /create-folders
async fn handle_create_folders(
    State(core): State<EmufetchCore>,
    ApiJson(req): ApiJson<CreateFoldersRequest>,
) -> Result<Json<FoldersResponse>, ApiError> {
    let base_path = required(req.base_path, "basePath is required")?;
    let folders = core.create_skeleton(&base_path).await?;

    Ok(Json(FoldersResponse {
        message: "Folders created successfully.".to_string(),
        folders,
    }))
}

/// POST /extract: unpack an archive already on disk
async fn handle_extract(
    State(core): State<EmufetchCore>,
    ApiJson(req): ApiJson<ExtractRequest>,
) -> Result<Json<PlacementResponse>, ApiError> {
    const MISSING: &str = "archivePath and targetDir are required";
    let archive_path = required(req.archive_path, MISSING)?;
    let target_dir = required(req.target_dir, MISSING)?;

    let outcome = core.extract_local(&archive_path, &target_dir).await?;

    Ok(Json(PlacementResponse {
        message: "Extraction complete.".to_string(),
        request_id: None,
        files: Some(outcome.extracted_files),
        moved_file_name: None,
        target_dir: outcome.target_dir,
        cleanup_warning: None,
    }))
}

/// POST /firmware-download: stream a Drive file straight back as an attachment
async fn handle_firmware_download(
    State(core): State<EmufetchCore>,
    ApiJson(req): ApiJson<FirmwareDownloadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    const MISSING: &str = "Missing fileId or filename";
    let file_id = required(non_blank(req.file_id), MISSING)?;
    let filename = required(non_blank(req.filename), MISSING)?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        header_safe(&filename)
    ))
    .map_err(|e| ApiError::bad_request(format!("Invalid filename: {}", e)))?;

    let download = core.open_drive_stream(&file_id).await?;
    tracing::info!(file_id = %file_id, "Proxying provider download as {}", filename);

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(download.body),
    ))
}

/// Replace characters that cannot appear inside a quoted header parameter
fn header_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
