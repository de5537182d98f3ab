//! Plain HTTP fetching and the resolved byte stream handed to the persister

use crate::error::AcquireError;
use bytes::Bytes;
use emufetch_types::Settings;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::info;

/// Body of a resolved download, consumed exactly once
pub type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// A source URL resolved down to its final byte stream
pub struct ResolvedDownload {
    pub final_url: String,
    /// False when the body was already read into memory (provider small-file case)
    pub streamed: bool,
    /// Filename announced by `Content-Disposition`, if any
    pub file_name: Option<String>,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl ResolvedDownload {
    /// Wrap a live response without reading its body
    pub fn from_response(response: Response) -> Self {
        let final_url = response.url().to_string();
        let file_name = content_disposition_filename(response.headers());
        let content_length = declared_length(response.headers());

        Self {
            final_url,
            streamed: true,
            file_name,
            content_length,
            body: response.bytes_stream().boxed(),
        }
    }

    /// Wrap a body that has already been read in full
    pub fn buffered(final_url: String, headers: &HeaderMap, body: Bytes) -> Self {
        let content_length = Some(body.len() as u64);
        Self {
            final_url,
            streamed: false,
            file_name: content_disposition_filename(headers),
            content_length,
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }
}

impl std::fmt::Debug for ResolvedDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDownload")
            .field("final_url", &self.final_url)
            .field("streamed", &self.streamed)
            .field("file_name", &self.file_name)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Build the HTTP client shared by every request
pub fn build_client(settings: &Settings) -> Result<Client, AcquireError> {
    let client = Client::builder()
        .user_agent(settings.user_agent.clone())
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .build()?;
    Ok(client)
}

/// Streaming GET of an arbitrary URL
pub async fn fetch(client: &Client, url: &str) -> Result<ResolvedDownload, AcquireError> {
    info!("Fetching {}", url);
    let response = client.get(url).send().await?;
    let response = check_status(response)?;
    Ok(ResolvedDownload::from_response(response))
}

/// Map non-success statuses to `ServerError`
pub(crate) fn check_status(response: Response) -> Result<Response, AcquireError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(AcquireError::ServerError {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

pub(crate) fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

pub(crate) fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

/// Extract the filename from a `Content-Disposition` header.
///
/// The RFC 5987 `filename*=` form wins over the plain `filename=` form.
pub fn content_disposition_filename(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;

    let mut plain = None;
    for part in value.split(';').map(str::trim) {
        if let Some(encoded) = part.strip_prefix("filename*=") {
            let encoded = encoded.trim_matches('"');
            let raw = encoded.rsplit("''").next().unwrap_or(encoded);
            if let Ok(decoded) = urlencoding::decode(raw) {
                if !decoded.is_empty() {
                    return Some(decoded.into_owned());
                }
            }
        } else if let Some(name) = part.strip_prefix("filename=") {
            let name = name.trim_matches('"');
            if !name.is_empty() {
                plain = Some(name.to_string());
            }
        }
    }
    plain
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn disposition(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn plain_filename_is_unquoted() {
        let headers = disposition("attachment; filename=\"prod.keys.zip\"");
        assert_eq!(
            content_disposition_filename(&headers).as_deref(),
            Some("prod.keys.zip")
        );
    }

    #[test]
    fn encoded_filename_takes_precedence() {
        let headers =
            disposition("attachment; filename=\"fallback.7z\"; filename*=UTF-8''Firmware%2019.0.1.zip");
        assert_eq!(
            content_disposition_filename(&headers).as_deref(),
            Some("Firmware 19.0.1.zip")
        );
    }

    #[test]
    fn missing_header_yields_none() {
        assert!(content_disposition_filename(&HeaderMap::new()).is_none());
        assert!(content_disposition_filename(&disposition("inline")).is_none());
    }
}
