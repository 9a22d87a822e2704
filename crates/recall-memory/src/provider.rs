// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lazily initialized embedding backend.
//!
//! Nothing is downloaded or loaded until the first `embed` call. A failed
//! initialization is not cached, so the next call tries again.

use std::sync::Arc;

use async_trait::async_trait;
use recall_core::types::{EmbeddingInput, EmbeddingOutput};
use recall_core::{AdapterType, EmbeddingAdapter, HealthStatus, PluginAdapter, RecallError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::embedder::OnnxEmbedder;
use crate::model_manager::EmbeddingModelManager;

enum Source {
    Onnx {
        manager: Arc<EmbeddingModelManager>,
        intra_threads: usize,
    },
    Fixed,
}

pub struct EmbeddingProvider {
    source: Source,
    backend: OnceCell<Arc<dyn EmbeddingAdapter>>,
}

impl EmbeddingProvider {
    /// ONNX embedder built on first use from files ensured by `manager`.
    pub fn onnx(manager: Arc<EmbeddingModelManager>, intra_threads: usize) -> Self {
        Self {
            source: Source::Onnx {
                manager,
                intra_threads,
            },
            backend: OnceCell::new(),
        }
    }

    /// Wrap an already constructed adapter.
    pub fn with_adapter(adapter: Arc<dyn EmbeddingAdapter>) -> Self {
        Self {
            source: Source::Fixed,
            backend: OnceCell::new_with(Some(adapter)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.initialized()
    }

    async fn backend(&self) -> Result<&Arc<dyn EmbeddingAdapter>, RecallError> {
        self.backend
            .get_or_try_init(|| async {
                let Source::Onnx {
                    manager,
                    intra_threads,
                } = &self.source
                else {
                    return Err(RecallError::Internal("embedding backend missing".into()));
                };
                manager.ensure_model().await?;
                let model = manager.model_path();
                let tokenizer = manager.tokenizer_path();
                let threads = *intra_threads;
                let embedder = tokio::task::spawn_blocking(move || {
                    OnnxEmbedder::new(&model, &tokenizer, threads)
                })
                .await
                .map_err(|e| RecallError::Internal(format!("embedder load task failed: {e}")))??;
                info!("embedding model loaded");
                Ok(Arc::new(embedder) as Arc<dyn EmbeddingAdapter>)
            })
            .await
    }

    /// Embed one text.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        self.embed_one(text).await
    }
}

#[async_trait]
impl PluginAdapter for EmbeddingProvider {
    fn name(&self) -> &str {
        "embedding-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        match self.backend.get() {
            Some(backend) => backend.health_check().await,
            None => Ok(HealthStatus::Degraded("embedding model not loaded yet".into())),
        }
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        if let Some(backend) = self.backend.get() {
            backend.shutdown().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for EmbeddingProvider {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        let backend = self.backend().await?;
        debug!(texts = input.texts.len(), "embedding");
        backend.embed(input).await
    }
}
