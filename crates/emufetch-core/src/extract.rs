//! Extraction dispatcher
//!
//! Zip archives are decoded in-process on a blocking thread. The 7z/rar
//! family goes through an external 7z-compatible tool whose location is fixed
//! when the dispatcher is built. Both paths end with a listing of the target
//! directory; an empty listing is a failure.

use crate::destination::ensure_target;
use crate::error::AcquireError;
use emufetch_types::{DetectedFormat, ExtractionOutcome};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Lines of tool output kept for error details
const OUTPUT_TAIL: usize = 20;

/// Routes archives to the matching unpacker
#[derive(Debug, Clone)]
pub struct ExtractionDispatcher {
    seven_zip_path: PathBuf,
}

impl ExtractionDispatcher {
    pub fn new(seven_zip_path: impl Into<PathBuf>) -> Self {
        Self {
            seven_zip_path: seven_zip_path.into(),
        }
    }

    pub fn seven_zip_path(&self) -> &Path {
        &self.seven_zip_path
    }

    /// Unpack `archive` into `target` and list what is there afterwards
    pub async fn extract(
        &self,
        archive: &Path,
        target: &Path,
        format: DetectedFormat,
    ) -> Result<ExtractionOutcome, AcquireError> {
        if !format.is_archive() {
            return Err(AcquireError::UnsupportedFormat(archive.display().to_string()));
        }
        ensure_target(target).await?;
        info!(?format, "Extracting {} into {}", archive.display(), target.display());

        match format {
            DetectedFormat::Zip => extract_zip(archive, target).await?,
            _ => self.extract_seven_zip(archive, target).await?,
        }

        let extracted_files = list_entries(target).await?;
        if extracted_files.is_empty() {
            warn!("Extraction reported success but {} is empty", target.display());
            return Err(AcquireError::NoFilesExtracted(target.to_path_buf()));
        }

        info!("Extraction complete, {} entries in target", extracted_files.len());
        Ok(ExtractionOutcome {
            extracted_files,
            target_dir: target.to_path_buf(),
        })
    }

    /// Run `7z x <archive> -o<target> -aoa -y` and wait for it to exit
    async fn extract_seven_zip(&self, archive: &Path, target: &Path) -> Result<(), AcquireError> {
        let mut output_flag = OsString::from("-o");
        output_flag.push(target.as_os_str());

        let mut child = Command::new(&self.seven_zip_path)
            .arg("x")
            .arg(archive)
            .arg(output_flag)
            // overwrite all existing entries, answer yes to every prompt
            .args(["-aoa", "-y", "-bb1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AcquireError::ArchiveToolUnavailable {
                program: self.seven_zip_path.clone(),
                source,
            })?;

        // Both pipes are drained before waiting so the tool never blocks on a full buffer
        let (stdout, stderr) = tokio::join!(
            drain_output(child.stdout.take(), "stdout"),
            drain_output(child.stderr.take(), "stderr"),
        );
        let status = child.wait().await?;

        let mut errors = stdout.errors;
        errors.extend(stderr.errors);

        if status.success() && errors.is_empty() {
            debug!("7z exited cleanly");
            return Ok(());
        }

        let detail = if errors.is_empty() {
            stderr
                .tail
                .into_iter()
                .chain(stdout.tail)
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            errors.join("\n")
        };

        warn!(code = ?status.code(), "7z extraction failed: {}", detail);
        Err(AcquireError::SevenZipExtractionFailed {
            code: status.code(),
            detail,
        })
    }
}

#[derive(Debug, Default)]
struct ToolOutput {
    errors: Vec<String>,
    tail: VecDeque<String>,
}

async fn drain_output<R>(pipe: Option<R>, stream: &'static str) -> ToolOutput
where
    R: AsyncRead + Unpin,
{
    let mut output = ToolOutput::default();
    let Some(pipe) = pipe else {
        return output;
    };

    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                debug!(stream, "7z: {}", line);
                if line.starts_with("ERROR:") {
                    output.errors.push(line.clone());
                }
                if output.tail.len() == OUTPUT_TAIL {
                    output.tail.pop_front();
                }
                output.tail.push_back(line);
            }
            Err(e) => {
                warn!(stream, "Stopped reading 7z output: {}", e);
                break;
            }
        }
    }
    output
}

async fn extract_zip(archive: &Path, target: &Path) -> Result<(), AcquireError> {
    let archive = archive.to_path_buf();
    let target = target.to_path_buf();

    let written = tokio::task::spawn_blocking(move || unzip(&archive, &target))
        .await
        .map_err(|e| AcquireError::ZipExtractionFailed(format!("zip worker failed: {}", e)))?
        .map_err(|e| AcquireError::ZipExtractionFailed(e.to_string()))?;

    debug!("Unzipped {} entries", written);
    Ok(())
}

fn unzip(archive: &Path, target: &Path) -> zip::result::ZipResult<usize> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(std::io::BufReader::new(file))?;
    let mut written = 0;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = target.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
        written += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(written)
}

/// Sorted names of the entries directly inside `dir`
pub async fn list_entries(dir: &Path) -> Result<Vec<String>, AcquireError> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}
