// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`Downloader`] with scripted failures.
//!
//! Bodies are served by exact URL. Unknown URLs answer HTTP 404, and every
//! request is recorded so tests can assert which stages hit the network.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use recall_core::{NetworkFailure, ProgressFn, RecallError};
use recall_models::Downloader;

/// Progress checkpoints reported while "transferring" a body.
const CHECKPOINTS: [f32; 5] = [0.2, 0.4, 0.6, 0.8, 1.0];

#[derive(Debug, Clone)]
enum Fault {
    /// Report progress up to the fraction, then drop the connection.
    DropAt(f32),
    /// Fail before any bytes arrive.
    Refuse(NetworkFailure),
}

#[derive(Default)]
struct Routes {
    bodies: HashMap<String, Vec<u8>>,
    faults: HashMap<String, VecDeque<Fault>>,
    requests: Vec<String>,
}

/// A downloader that never touches the network.
#[derive(Default)]
pub struct MockDownloader {
    routes: Mutex<Routes>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> std::sync::MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `body` for `url`.
    pub fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.routes().bodies.insert(url.into(), body.into());
    }

    /// The next request for `url` reports progress up to `fraction` and
    /// then fails with a transport error. Later requests succeed.
    pub fn drop_once_at(&self, url: impl Into<String>, fraction: f32) {
        self.routes()
            .faults
            .entry(url.into())
            .or_default()
            .push_back(Fault::DropAt(fraction));
    }

    /// The next request for `url` fails with `failure` before any progress.
    pub fn refuse_once(&self, url: impl Into<String>, failure: NetworkFailure) {
        self.routes()
            .faults
            .entry(url.into())
            .or_default()
            .push_back(Fault::Refuse(failure));
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.routes().requests.clone()
    }

    /// How many times `url` was requested.
    pub fn request_count(&self, url: &str) -> usize {
        self.routes().requests.iter().filter(|u| *u == url).count()
    }

    fn begin(&self, url: &str) -> (Option<Vec<u8>>, Option<Fault>) {
        let mut routes = self.routes();
        routes.requests.push(url.to_string());
        let fault = routes.faults.get_mut(url).and_then(VecDeque::pop_front);
        (routes.bodies.get(url).cloned(), fault)
    }
}

fn network(message: String, failure: NetworkFailure) -> RecallError {
    RecallError::Network { message, failure }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn fetch_to_file(
        &self,
        url: &str,
        target: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<u64, RecallError> {
        let (body, fault) = self.begin(url);
        if let Some(Fault::Refuse(failure)) = fault {
            return Err(network(format!("refused {url}"), failure));
        }
        let Some(body) = body else {
            return Err(network(format!("HTTP 404 for {url}"), NetworkFailure::Status(404)));
        };

        if let Some(Fault::DropAt(fraction)) = fault {
            let cut = ((body.len() as f32) * fraction) as usize;
            tokio::fs::write(target, &body[..cut.min(body.len())])
                .await
                .map_err(|e| RecallError::io(format!("writing {}", target.display()), e))?;
            for checkpoint in CHECKPOINTS.iter().take_while(|c| **c <= fraction) {
                progress(*checkpoint);
            }
            let _ = tokio::fs::remove_file(target).await;
            return Err(network(
                format!("connection reset while reading {url}"),
                NetworkFailure::Transport,
            ));
        }

        tokio::fs::write(target, &body)
            .await
            .map_err(|e| RecallError::io(format!("writing {}", target.display()), e))?;
        for checkpoint in CHECKPOINTS {
            progress(checkpoint);
        }
        Ok(body.len() as u64)
    }

    async fn fetch_string(&self, url: &str) -> Result<String, RecallError> {
        let (body, fault) = self.begin(url);
        match (body, fault) {
            (_, Some(Fault::Refuse(failure))) => Err(network(format!("refused {url}"), failure)),
            (_, Some(Fault::DropAt(_))) => Err(network(
                format!("connection reset while reading {url}"),
                NetworkFailure::Transport,
            )),
            (Some(body), None) => Ok(String::from_utf8_lossy(&body).into_owned()),
            (None, None) => Err(network(format!("HTTP 404 for {url}"), NetworkFailure::Status(404))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn dropped_transfer_removes_partial_file_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("w.zip");
        let mock = MockDownloader::new();
        mock.serve("https://h/w.zip", vec![7u8; 100]);
        mock.drop_once_at("https://h/w.zip", 0.4);

        let seen = StdMutex::new(Vec::new());
        let record = |p: f32| seen.lock().unwrap().push(p);
        let err = mock.fetch_to_file("https://h/w.zip", &target, &record).await.unwrap_err();
        assert!(err.is_network());
        assert!(!target.exists());
        assert_eq!(*seen.lock().unwrap(), vec![0.2, 0.4]);

        let bytes = mock.fetch_to_file("https://h/w.zip", &target, &|_: f32| {}).await.unwrap();
        assert_eq!(bytes, 100);
        assert_eq!(mock.request_count("https://h/w.zip"), 2);
    }

    #[tokio::test]
    async fn unknown_url_is_a_404() {
        let mock = MockDownloader::new();
        let err = mock.fetch_string("https://h/missing").await.unwrap_err();
        assert_eq!(err.user_message(), "Download failed: HTTP 404");
    }
}
