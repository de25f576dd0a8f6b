use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

pub const CHECKSUM_FAILED: &str = "checksum verification failed";

/// Progress and terminal events emitted while fetching an installer.
///
/// `Progress` fires once per received chunk whenever the server reported a
/// content length; `percent` is floored and stays within 0..=100.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Progress {
        downloaded: u64,
        total: u64,
        percent: u8,
    },
    Completed(PathBuf),
    Failed(String),
}

/// How a download worker ended. `Cancelled` produces no event at all; the
/// partial file stays behind for `cleanup_temp_files`.
#[derive(Debug)]
pub(crate) enum DownloadOutcome {
    Completed(PathBuf),
    Cancelled,
    Failed(String),
}

/// Stream `url` to `dest`, reporting progress through `emit` and honouring
/// the cancellation flag at chunk granularity. When `expected_checksum` is
/// supplied the finished file must hash to it (hex, case-insensitive).
pub(crate) async fn run_download<F>(
    client: &Client,
    url: &str,
    dest: &Path,
    expected_checksum: Option<&str>,
    cancel: &AtomicBool,
    mut emit: F,
) -> DownloadOutcome
where
    F: FnMut(DownloadEvent),
{
    if cancel.load(Ordering::SeqCst) {
        warn!("download: cancelled before start");
        return DownloadOutcome::Cancelled;
    }

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(err) => {
            return DownloadOutcome::Failed(format!("download request failed: {err}"));
        }
    };
    let response = match response.error_for_status() {
        Ok(response) => response,
        Err(err) => {
            return DownloadOutcome::Failed(format!("download status error: {err}"));
        }
    };

    let total = response.content_length().unwrap_or(0);
    let mut stream = response.bytes_stream();
    let mut file = match File::create(dest).await {
        Ok(file) => file,
        Err(err) => {
            return DownloadOutcome::Failed(format!(
                "failed to create {}: {err}",
                dest.display()
            ));
        }
    };

    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        if cancel.load(Ordering::SeqCst) {
            warn!("download: cancelled after {downloaded} bytes");
            return DownloadOutcome::Cancelled;
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => return DownloadOutcome::Failed(format!("stream error: {err}")),
        };
        if let Err(err) = file.write_all(&chunk).await {
            return DownloadOutcome::Failed(format!("write error: {err}"));
        }
        downloaded += chunk.len() as u64;

        if total > 0 {
            emit(DownloadEvent::Progress {
                downloaded,
                total,
                percent: (downloaded * 100 / total).min(100) as u8,
            });
        }
    }

    if let Err(err) = file.flush().await {
        return DownloadOutcome::Failed(format!("flush error: {err}"));
    }
    drop(file);

    if let Some(expected) = expected_checksum {
        match file_sha256(dest) {
            Ok(actual) if actual == expected.to_lowercase() => {
                debug!("download: checksum ok for {}", dest.display());
            }
            Ok(actual) => {
                warn!("download: checksum mismatch: expected {expected}, got {actual}");
                return DownloadOutcome::Failed(CHECKSUM_FAILED.into());
            }
            Err(err) => return DownloadOutcome::Failed(err),
        }
    }

    info!(
        "download: completed {} ({downloaded} bytes)",
        dest.display()
    );
    DownloadOutcome::Completed(dest.to_path_buf())
}

/// SHA-256 of a file on disk as lowercase hex.
pub fn file_sha256(path: &Path) -> Result<String, String> {
    let mut file = fs::File::open(path).map_err(|e| format!("checksum open error: {e}"))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|e| format!("checksum read error: {e}"))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
