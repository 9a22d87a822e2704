// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte fetching with progress, behind a trait so tests can script failures.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use recall_core::{NetworkFailure, ProgressFn, RecallError};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Fetches remote artifacts.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Stream `url` into `target`, reporting fractional progress.
    ///
    /// On failure the partial target is removed. Returns the byte count.
    async fn fetch_to_file(
        &self,
        url: &str,
        target: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<u64, RecallError>;

    /// Fetch a small text resource.
    async fn fetch_string(&self, url: &str) -> Result<String, RecallError>;
}

/// reqwest-backed downloader.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self, RecallError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("Recall/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RecallError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, RecallError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(&e, url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RecallError::Network {
                message: format!("HTTP {} for {url}", status.as_u16()),
                failure: NetworkFailure::Status(status.as_u16()),
            });
        }
        Ok(response)
    }

    async fn stream_into(
        &self,
        url: &str,
        target: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<u64, RecallError> {
        let response = self.get(url).await?;
        let total = response.content_length();

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RecallError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| RecallError::io(format!("creating {}", target.display()), e))?;

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| classify(&e, url))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| RecallError::io(format!("writing {}", target.display()), e))?;
            written += chunk.len() as u64;
            if let Some(total) = total.filter(|t| *t > 0) {
                progress((written as f32 / total as f32).min(1.0));
            }
        }
        file.flush()
            .await
            .map_err(|e| RecallError::io(format!("flushing {}", target.display()), e))?;
        progress(1.0);
        Ok(written)
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch_to_file(
        &self,
        url: &str,
        target: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<u64, RecallError> {
        debug!(url, target = %target.display(), "starting download");
        match self.stream_into(url, target, progress).await {
            Ok(bytes) => {
                debug!(url, bytes, "download complete");
                Ok(bytes)
            }
            Err(e) => {
                warn!(url, error = %e, "download failed");
                let _ = tokio::fs::remove_file(target).await;
                Err(e)
            }
        }
    }

    async fn fetch_string(&self, url: &str) -> Result<String, RecallError> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| classify(&e, url))
    }
}

/// Translate a reqwest failure into the network error taxonomy.
fn classify(err: &reqwest::Error, url: &str) -> RecallError {
    if let Some(status) = err.status() {
        return RecallError::Network {
            message: format!("HTTP {} for {url}", status.as_u16()),
            failure: NetworkFailure::Status(status.as_u16()),
        };
    }
    let failure = if is_dns_failure(err) {
        NetworkFailure::HostUnresolved {
            host: host_of(url).unwrap_or_else(|| url.to_string()),
        }
    } else {
        NetworkFailure::Transport
    };
    RecallError::Network {
        message: format!("{err} ({url})"),
        failure,
    }
}

/// Walk the source chain looking for a resolver error.
fn is_dns_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no address associated")
        {
            return true;
        }
        current = e.source();
    }
    false
}

fn host_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
