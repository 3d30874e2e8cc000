//! HTTP download of runtime archives.
//!
//! Downloads are streamed to `<destination>.part` and renamed onto the
//! destination once the body is complete, so the destination either holds a
//! whole file or does not exist. Every failure path removes the partial file.
//!
//! Redirects are followed manually instead of by the HTTP client: vendor
//! APIs such as Adoptium answer with a 302 to a CDN, and following hops
//! ourselves lets us count them, report them and enforce [`MAX_REDIRECTS`].
//!
//! There is no automatic retry. A failed download is reported to the caller,
//! which decides whether to try again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::LOCATION;
use tokio::io::AsyncWriteExt;

use crate::errors::TransferError;

/// Maximum number of redirect hops followed before giving up.
pub const MAX_REDIRECTS: u32 = 5;

/// Minimum interval between progress callback invocations in milliseconds.
const PROGRESS_CALLBACK_INTERVAL_MS: u128 = 100;

/// Connection timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Maximum time without receiving a byte, in seconds.
const READ_TIMEOUT_SECS: u64 = 120;

/// Progress event emitted during downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// The final URL answered with a body.
    Started {
        /// URL the body is served from, after redirects.
        url: String,
        /// `Content-Length`, when the server sent one.
        total: Option<u64>,
    },
    /// Periodic progress update.
    Progress {
        /// Bytes received so far.
        downloaded: u64,
        /// `Content-Length`, when known.
        total: Option<u64>,
        /// Average throughput in bytes per second.
        speed: u64,
    },
    /// A redirect hop was followed.
    Redirected {
        /// URL that answered with the redirect.
        from: String,
        /// Resolved `Location`.
        to: String,
    },
    /// The file is in place.
    Completed {
        /// Size of the file.
        bytes: u64,
    },
    /// The download failed; the partial file has been removed.
    Failed {
        /// Error description.
        error: String,
    },
}

impl TransferEvent {
    /// Percentage complete for progress events with a known total.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        match self {
            Self::Progress {
                downloaded,
                total: Some(total),
                ..
            } if *total > 0 => {
                #[allow(clippy::cast_possible_truncation)]
                let percent = (downloaded.saturating_mul(100) / total).min(100) as u8;
                Some(percent)
            }
            Self::Completed { .. } => Some(100),
            _ => None,
        }
    }
}

/// Callback type for receiving progress updates during downloads.
pub type TransferCallback = Arc<dyn Fn(TransferEvent) + Send + Sync>;

/// Result of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    /// URL the body was served from.
    pub final_url: String,
    /// Number of redirect hops followed.
    pub redirects: u32,
    /// Bytes written to the destination.
    pub bytes: u64,
}

/// Downloads `url` to `dest`, following up to [`MAX_REDIRECTS`] redirects.
///
/// The parent directory of `dest` is created if needed. `on_progress`
/// receives at most one [`TransferEvent::Progress`] per 100 ms plus a final one.
///
/// # Errors
///
/// - [`TransferError::Network`] on connection, TLS or body-stream failure
/// - [`TransferError::Http`] on a non-success status or a redirect without a
///   usable `Location`
/// - [`TransferError::TooManyRedirects`] when the chain exceeds the limit
/// - [`TransferError::Io`] if the file cannot be created, written or renamed
///
/// In every error case nothing is left at `dest` or at the partial path.
pub async fn download(
    url: &str,
    dest: &Path,
    on_progress: Option<TransferCallback>,
) -> Result<DownloadSummary, TransferError> {
    let callback = on_progress.unwrap_or_else(|| Arc::new(|_| {}));
    let temp_path = part_path(dest);

    let result = download_to(url, dest, &temp_path, &callback).await;

    match result {
        Ok(summary) => {
            tracing::debug!(url, dest = %dest.display(), bytes = summary.bytes, "download complete");
            callback(TransferEvent::Completed {
                bytes: summary.bytes,
            });
            Ok(summary)
        }
        Err(error) => {
            if let Err(e) = tokio::fs::remove_file(&temp_path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %temp_path.display(), error = %e, "failed to remove partial download");
            }
            callback(TransferEvent::Failed {
                error: error.to_string(),
            });
            Err(error)
        }
    }
}

/// Path the body is streamed to before the final rename.
#[must_use]
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

async fn download_to(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    callback: &TransferCallback,
) -> Result<DownloadSummary, TransferError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TransferError::Io { path, source }
    };

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .build()
        .map_err(|source| TransferError::Network {
            url: url.to_string(),
            source,
        })?;

    let mut current = url.to_string();
    let mut redirects = 0u32;

    let response = loop {
        let response = client
            .get(&current)
            .send()
            .await
            .map_err(|source| TransferError::Network {
                url: current.clone(),
                source,
            })?;
        let status = response.status();

        if is_redirect(status) {
            if redirects == MAX_REDIRECTS {
                return Err(TransferError::TooManyRedirects {
                    url: url.to_string(),
                    limit: MAX_REDIRECTS,
                });
            }
            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| response.url().join(location).ok())
                .ok_or_else(|| TransferError::Http {
                    status: status.as_u16(),
                    url: current.clone(),
                })?;

            redirects += 1;
            tracing::debug!(from = %current, to = %next, hop = redirects, "following redirect");
            callback(TransferEvent::Redirected {
                from: current.clone(),
                to: next.to_string(),
            });
            current = next.to_string();
            continue;
        }

        if !status.is_success() {
            return Err(TransferError::Http {
                status: status.as_u16(),
                url: current,
            });
        }

        break response;
    };

    let total = response.content_length();
    callback(TransferEvent::Started {
        url: current.clone(),
        total,
    });

    let mut file = tokio::fs::File::create(temp_path)
        .await
        .map_err(io_err(temp_path))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let start_time = Instant::now();
    let mut last_callback_time = Instant::now();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| TransferError::Network {
            url: current.clone(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(io_err(temp_path))?;
        downloaded += chunk.len() as u64;

        let now = Instant::now();
        if now.duration_since(last_callback_time).as_millis() >= PROGRESS_CALLBACK_INTERVAL_MS {
            callback(TransferEvent::Progress {
                downloaded,
                total,
                speed: average_speed(downloaded, start_time),
            });
            last_callback_time = now;
        }
    }

    file.flush().await.map_err(io_err(temp_path))?;
    drop(file);

    callback(TransferEvent::Progress {
        downloaded,
        total,
        speed: average_speed(downloaded, start_time),
    });

    tokio::fs::rename(temp_path, dest)
        .await
        .map_err(io_err(dest))?;

    Ok(DownloadSummary {
        final_url: current,
        redirects,
        bytes: downloaded,
    })
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn average_speed(downloaded: u64, start_time: Instant) -> u64 {
    let elapsed_secs = start_time.elapsed().as_secs_f64();
    if elapsed_secs > 0.0 {
        (downloaded as f64 / elapsed_secs) as u64
    } else {
        0
    }
}

/// Formats bytes into a human-readable string (KB, MB, GB).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a speed in bytes per second.
#[must_use]
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}
