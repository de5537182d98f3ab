//! Google Drive confirmation-token resolver
//!
//! Large Drive files are served behind a "can't scan this file for viruses"
//! page. The page carries a confirmation token; repeating the export request
//! with `confirm=<token>` yields the real bytes. Small files skip the page and
//! come back directly with a `Content-Disposition` header.
//!
//! The token scraping in [`find_confirm_token`] depends on Drive's markup and
//! may need replacing when that changes.

use crate::error::AcquireError;
use crate::fetch::{check_status, is_html, ResolvedDownload};
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use url::Url;

/// Resolves a Drive file id into a downloadable byte stream
#[derive(Debug, Clone)]
pub struct DriveResolver {
    client: Client,
    endpoint: String,
}

impl DriveResolver {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Run the export request, following the confirmation page if one is served
    pub async fn resolve(&self, file_id: &str) -> Result<ResolvedDownload, AcquireError> {
        info!(file_id, "Resolving provider download");

        let first = self
            .client
            .get(&self.endpoint)
            .query(&[("export", "download"), ("id", file_id)])
            .send()
            .await?;
        let first = check_status(first)?;

        let has_disposition = first.headers().contains_key(CONTENT_DISPOSITION);
        if has_disposition && !is_html(first.headers()) {
            info!(file_id, "Provider served the file directly");
            return Ok(ResolvedDownload::from_response(first));
        }

        let final_url = first.url().to_string();
        let headers = first.headers().clone();
        let body = first.bytes().await?;

        if let Some(token) = find_confirm_token(&String::from_utf8_lossy(&body)) {
            debug!(file_id, token = %token, "Found confirmation token");
            let confirmed = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("export", "download"),
                    ("confirm", token.as_str()),
                    ("id", file_id),
                ])
                .send()
                .await?;
            return Ok(ResolvedDownload::from_response(check_status(confirmed)?));
        }

        if has_disposition {
            info!(file_id, "No confirmation token, using first response body");
            return Ok(ResolvedDownload::buffered(final_url, &headers, body));
        }

        warn!(file_id, "Provider page carried neither a token nor a file");
        Err(AcquireError::ConfirmationTokenNotFound {
            file_id: file_id.to_string(),
        })
    }
}

fn form_field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<input[^>]*\bname="confirm"[^>]*\bvalue="([^"]+)""#)
            .expect("confirm form pattern is valid")
    })
}

fn form_field_reversed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<input[^>]*\bvalue="([^"]+)"[^>]*\bname="confirm""#)
            .expect("confirm form pattern is valid")
    })
}

fn query_fragment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"confirm=([0-9A-Za-z_%-]+)&").expect("confirm query pattern is valid")
    })
}

/// Find the confirmation token in a Drive interstitial page.
///
/// Accepts `<input name="confirm" value="...">` and `confirm=<token>&`
/// (percent-decoded). Tokens are limited to `[0-9A-Za-z_-]`.
pub fn find_confirm_token(html: &str) -> Option<String> {
    let candidates = [
        form_field_pattern(),
        form_field_reversed_pattern(),
        query_fragment_pattern(),
    ];

    candidates
        .iter()
        .filter_map(|pattern| pattern.captures(html))
        .filter_map(|captures| captures.get(1))
        .filter_map(|raw| urlencoding::decode(raw.as_str()).ok())
        .map(|token| token.into_owned())
        .find(|token| {
            !token.is_empty()
                && token
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

/// Whether `url` points at the file-sharing provider
pub fn is_provider_url(url: &Url, provider_host: &str) -> bool {
    url.host_str()
        .map(|host| host.to_ascii_lowercase().contains(&provider_host.to_ascii_lowercase()))
        .unwrap_or(false)
}

/// Pull the file id out of `?id=<id>` or `/d/<id>/...` provider URLs
pub fn extract_file_id(url: &Url) -> Option<String> {
    if let Some((_, id)) = url.query_pairs().find(|(key, value)| key == "id" && !value.is_empty()) {
        return Some(id.into_owned());
    }

    let segments: Vec<&str> = url.path_segments()?.collect();
    segments
        .windows(2)
        .find(|pair| pair[0] == "d" && !pair[1].is_empty())
        .map(|pair| pair[1].to_string())
}
