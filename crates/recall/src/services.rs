// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process wiring.
//!
//! Every service is built once here and handed to its consumers through
//! constructors. Nothing below is global.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use recall_agent::{OrchestratorSettings, SessionOrchestrator};
use recall_config::RecallConfig;
use recall_config::model::EngineVariant;
use recall_core::{InferenceEngine, RecallError, StorageAdapter};
use recall_engine::{BundledEngine, EngineOptions, FailedBackends, MockEngine, NativeEngine, OnnxRuntime};
use recall_memory::{EmbeddingModelManager, EmbeddingProvider, MemoryStore, MemoryWriter, RetrievalIndex};
use recall_models::{ArtifactStore, BackendDetector, Downloader, HttpDownloader, ModelStatusTracker};
use recall_storage::SqliteStorage;
use tracing::{debug, warn};

/// Delay between scripted initialization steps of the mock engine.
const MOCK_STEP_DELAY: Duration = Duration::from_millis(200);
/// Delay between streamed words of the mock engine.
const MOCK_TOKEN_DELAY: Duration = Duration::from_millis(100);

pub struct Services {
    pub config: RecallConfig,
    pub storage: Arc<SqliteStorage>,
    pub store: Arc<ArtifactStore>,
    pub detector: Arc<BackendDetector>,
    pub tracker: Arc<ModelStatusTracker>,
    pub failed: FailedBackends,
    pub embedding_models: Arc<EmbeddingModelManager>,
    pub embedder: Arc<EmbeddingProvider>,
    pub memories: MemoryStore,
}

impl Services {
    /// Wire everything against the real network and system probes.
    pub async fn open(config: RecallConfig) -> Result<Self, RecallError> {
        let downloader: Arc<dyn Downloader> = Arc::new(HttpDownloader::new()?);
        Self::open_with(config, downloader, BackendDetector::system()).await
    }

    pub async fn open_with(
        config: RecallConfig,
        downloader: Arc<dyn Downloader>,
        detector: BackendDetector,
    ) -> Result<Self, RecallError> {
        if let Some(parent) = Path::new(&config.storage.database_path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RecallError::io(format!("creating {}", parent.display()), e))?;
        }
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let memories = MemoryStore::new(storage.database()?.clone());

        let store = Arc::new(ArtifactStore::from_config(&config.models, downloader.clone()));
        let embedding_models = Arc::new(EmbeddingModelManager::new(
            &config.models.data_dir_path(),
            downloader,
        ));
        let embedder = Arc::new(EmbeddingProvider::onnx(
            embedding_models.clone(),
            config.engine.intra_threads,
        ));
        debug!(
            models = %store.internal_root().display(),
            database = %config.storage.database_path,
            "services wired"
        );

        Ok(Self {
            config,
            storage: Arc::new(storage),
            store,
            detector: Arc::new(detector),
            tracker: Arc::new(ModelStatusTracker::new()),
            failed: FailedBackends::new(),
            embedding_models,
            embedder,
            memories,
        })
    }

    /// The engine variant named by `[engine].variant` for the selected model.
    pub fn engine(&self) -> Arc<dyn InferenceEngine> {
        let model_id = self.config.models.selected_model.clone();
        let options = EngineOptions::from_config(
            &self.config.engine,
            self.config.agent.system_prompt.as_deref(),
        );
        let runtime = Arc::new(OnnxRuntime::new(self.config.engine.intra_threads));
        match self.config.engine.variant {
            EngineVariant::Native => Arc::new(NativeEngine::new(
                model_id,
                self.store.clone(),
                self.detector.clone(),
                runtime,
                self.failed.clone(),
                options,
            )),
            EngineVariant::Bundled => {
                Arc::new(BundledEngine::new(model_id, self.store.clone(), runtime, options))
            }
            EngineVariant::Mock => {
                Arc::new(MockEngine::new(model_id).with_delays(MOCK_STEP_DELAY, MOCK_TOKEN_DELAY))
            }
        }
    }

    pub fn retrieval(&self) -> Option<Arc<RetrievalIndex>> {
        self.config.memory.enabled.then(|| {
            Arc::new(RetrievalIndex::new(
                Arc::new(self.memories.clone()),
                self.embedder.clone(),
            ))
        })
    }

    pub fn writer(&self) -> MemoryWriter {
        MemoryWriter::new(self.memories.clone(), self.embedder.clone())
    }

    pub fn orchestrator(&self, engine: Arc<dyn InferenceEngine>) -> SessionOrchestrator {
        SessionOrchestrator::new(
            self.storage.clone(),
            engine,
            self.retrieval(),
            OrchestratorSettings::from_config(&self.config),
        )
    }

    /// Close the database, checkpointing the WAL.
    pub async fn shutdown(&self) {
        if let Err(e) = self.storage.close().await {
            warn!(error = %e, "storage close failed");
        }
    }
}
