//! Fetching: materialise an inbound document as a local transient file.
//!
//! Two steps, either of which can fail the job:
//!
//! 1. ask the chat platform for the file's download URL
//! 2. stream the body into a fresh [`TransientFile`] that keeps the
//!    original extension, so the converter can detect the input format
//!
//! If the download breaks off halfway, the partially written file is
//! released before the error is returned.

use crate::error::BridgeError;
use crate::job::InboundDocument;
use crate::pipeline::normalize::extension_of;
use crate::platform::ChatPlatform;
use crate::store::{TransientFile, TransientStore};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Default HTTP download timeout in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Copies the resource at a URL into a local file.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the body at `url` into `dest`, truncating it. Returns bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, BridgeError>;
}

/// [`Downloader`] over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpDownloader {
    pub fn new(timeout_secs: u64) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BridgeError::ClientSetup {
                client: "download",
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    /// Map a reqwest error without leaking the URL, which carries the bot token.
    fn map_err(&self, e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::DownloadTimeout {
                secs: self.timeout_secs,
            }
        } else {
            BridgeError::DownloadFailed {
                reason: e.without_url().to_string(),
            }
        }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, BridgeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        if !response.status().is_success() {
            return Err(BridgeError::DownloadFailed {
                reason: format!("HTTP {}", response.status()),
            });
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(dest)
            .await
            .map_err(|e| BridgeError::local_io("Failed to open temp file", dest, e))?;

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.map_err(e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| BridgeError::local_io("Failed to write temp file", dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| BridgeError::local_io("Failed to write temp file", dest, e))?;

        Ok(written)
    }
}

/// Suffix for the local copy: the original extension when it is safe to put
/// in a file name, otherwise none.
pub fn local_suffix(file_name: &str) -> &str {
    let ext = extension_of(file_name);
    let safe = ext
        .chars()
        .skip(1)
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ext.len() > 1 && safe {
        ext
    } else {
        ""
    }
}

/// Resolve, download and store `doc`. The returned file is the job's source.
pub async fn fetch_document(
    platform: &dyn ChatPlatform,
    downloader: &dyn Downloader,
    store: &TransientStore,
    doc: &InboundDocument,
) -> Result<TransientFile, BridgeError> {
    let url = platform.resolve_file_url(&doc.file_id).await?;
    debug!("Resolved download URL for file {}", doc.file_id);

    let file = store.acquire(local_suffix(&doc.file_name))?;
    match downloader.download(&url, file.path()).await {
        Ok(bytes) => {
            info!(
                "Downloaded '{}' ({} bytes) to {}",
                doc.file_name,
                bytes,
                file.path().display()
            );
            Ok(file)
        }
        Err(e) => {
            file.release();
            Err(e)
        }
    }
}
