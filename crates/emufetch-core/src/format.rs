//! Archive format detection: declared extension first, magic bytes second

use emufetch_types::DetectedFormat;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

const ZIP_LOCAL_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const ZIP_SPANNED_MAGIC: &[u8] = b"PK\x07\x08";
const SEVEN_ZIP_MAGIC: &[u8] = b"7z\xBC\xAF\x27\x1C";
const RAR4_MAGIC: &[u8] = b"Rar!\x1A\x07\x00";
const RAR5_MAGIC: &[u8] = b"Rar!\x1A\x07\x01\x00";

const SNIFF_LEN: usize = 16;

/// What a declared file name says about its content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameHint {
    Archive(DetectedFormat),
    /// Has an extension, just not an archive one (`.nsp`, `.bin`, ...)
    Other,
    NoExtension,
}

/// Classify a file name by its extension, case-insensitively
pub fn classify_name(file_name: &str) -> NameHint {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("zip") => NameHint::Archive(DetectedFormat::Zip),
        Some("7z") | Some("rar") => NameHint::Archive(DetectedFormat::SevenZipFamily),
        Some(_) => NameHint::Other,
        None => NameHint::NoExtension,
    }
}

/// Map leading bytes to an archive family
pub fn sniff_bytes(data: &[u8]) -> DetectedFormat {
    if data.starts_with(ZIP_LOCAL_MAGIC)
        || data.starts_with(ZIP_EMPTY_MAGIC)
        || data.starts_with(ZIP_SPANNED_MAGIC)
    {
        DetectedFormat::Zip
    } else if data.starts_with(SEVEN_ZIP_MAGIC)
        || data.starts_with(RAR4_MAGIC)
        || data.starts_with(RAR5_MAGIC)
    {
        DetectedFormat::SevenZipFamily
    } else {
        DetectedFormat::Unknown
    }
}

/// Read the first bytes of `path` and sniff them
pub async fn sniff_file(path: &Path) -> std::io::Result<DetectedFormat> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut header).await?;
    debug!("Sniffed header of {}: {:02x?}", path.display(), header);
    Ok(sniff_bytes(&header))
}

/// Detect the archive format of a persisted file.
///
/// The extension of `file_name` decides when it names an archive. Without an
/// extension, or without a name at all, the file content is sniffed. A
/// non-archive extension is `Unknown`.
pub async fn detect(file_name: Option<&str>, path: &Path) -> std::io::Result<DetectedFormat> {
    match file_name.map(classify_name).unwrap_or(NameHint::NoExtension) {
        NameHint::Archive(format) => Ok(format),
        NameHint::Other => Ok(DetectedFormat::Unknown),
        NameHint::NoExtension => sniff_file(path).await,
    }
}
