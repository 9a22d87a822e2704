// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-run setup of the ONNX embedding model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use recall_core::RecallError;
use recall_models::Downloader;
use tokio::sync::Mutex;
use tracing::info;

pub const MODEL_URL: &str = "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
pub const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// Downloads and locates all-MiniLM-L6-v2 under `<data_dir>/models/embedding`.
pub struct EmbeddingModelManager {
    dir: PathBuf,
    downloader: Arc<dyn Downloader>,
    model_url: String,
    tokenizer_url: String,
    guard: Mutex<()>,
}

impl EmbeddingModelManager {
    pub fn new(data_dir: &Path, downloader: Arc<dyn Downloader>) -> Self {
        Self::with_urls(data_dir, downloader, MODEL_URL, TOKENIZER_URL)
    }

    pub fn with_urls(
        data_dir: &Path,
        downloader: Arc<dyn Downloader>,
        model_url: &str,
        tokenizer_url: &str,
    ) -> Self {
        Self {
            dir: data_dir.join("models").join("embedding"),
            downloader,
            model_url: model_url.to_string(),
            tokenizer_url: tokenizer_url.to_string(),
            guard: Mutex::new(()),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    pub fn is_model_available(&self) -> bool {
        self.model_path().is_file() && self.tokenizer_path().is_file()
    }

    /// Fetch whichever files are missing. Concurrent callers download once.
    pub async fn ensure_model(&self) -> Result<(), RecallError> {
        let _guard = self.guard.lock().await;
        if self.is_model_available() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RecallError::io(format!("creating {}", self.dir.display()), e))?;

        for (file, url) in [
            (MODEL_FILE, &self.model_url),
            (TOKENIZER_FILE, &self.tokenizer_url),
        ] {
            let dest = self.dir.join(file);
            if dest.is_file() {
                continue;
            }
            // A torn download stays under the temporary name.
            let partial = self.dir.join(format!(".{file}.part"));
            info!(file, "downloading embedding model file");
            let bytes = self.downloader.fetch_to_file(url, &partial, &|_| {}).await?;
            tokio::fs::rename(&partial, &dest)
                .await
                .map_err(|e| RecallError::io(format!("installing {}", dest.display()), e))?;
            info!(file, bytes, "embedding model file ready");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use recall_core::ProgressFn;

    struct Offline;

    #[async_trait]
    impl Downloader for Offline {
        async fn fetch_to_file(&self, url: &str, _: &Path, _: ProgressFn<'_>) -> Result<u64, RecallError> {
            Err(RecallError::NotFound(url.to_string()))
        }

        async fn fetch_string(&self, url: &str) -> Result<String, RecallError> {
            Err(RecallError::NotFound(url.to_string()))
        }
    }

    #[test]
    fn files_live_under_models_embedding() {
        let mgr = EmbeddingModelManager::new(Path::new("/data"), Arc::new(Offline));
        assert_eq!(mgr.model_path(), PathBuf::from("/data/models/embedding/model.onnx"));
        assert_eq!(
            mgr.tokenizer_path(),
            PathBuf::from("/data/models/embedding/tokenizer.json")
        );
    }

    #[tokio::test]
    async fn present_files_skip_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = EmbeddingModelManager::new(dir.path(), Arc::new(Offline));
        std::fs::create_dir_all(mgr.model_dir()).unwrap();
        std::fs::write(mgr.model_path(), b"graph").unwrap();
        std::fs::write(mgr.tokenizer_path(), b"{}").unwrap();
        mgr.ensure_model().await.unwrap();
    }

    #[tokio::test]
    async fn download_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = EmbeddingModelManager::new(dir.path(), Arc::new(Offline));
        assert!(mgr.ensure_model().await.is_err());
        assert!(!mgr.is_model_available());
    }
}
