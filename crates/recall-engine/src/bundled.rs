// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine over a single-file model bundle, always on CPU.

use std::sync::Arc;

use async_trait::async_trait;
use recall_core::{
    AdapterType, ChatMessage, EngineState, HealthStatus, InferenceEngine, PluginAdapter,
    ProgressFn, RecallError, TokenStream,
};
use recall_models::ArtifactStore;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::runtime::BundleLoader;
use crate::session::{EngineOptions, SessionCore, not_ready};
use crate::state::StateCell;

/// Extensions recognised as model bundles.
pub const BUNDLE_EXTENSIONS: &[&str] = &["onnx", "task", "bin"];

pub struct BundledEngine {
    model_id: String,
    store: Arc<ArtifactStore>,
    loader: Arc<dyn BundleLoader>,
    state: StateCell,
    init: Mutex<()>,
    core: SessionCore,
}

impl BundledEngine {
    pub fn new(
        model_id: impl Into<String>,
        store: Arc<ArtifactStore>,
        loader: Arc<dyn BundleLoader>,
        options: EngineOptions,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            store,
            loader,
            state: StateCell::new(),
            init: Mutex::new(()),
            core: SessionCore::new(options),
        }
    }

    async fn load(&self, progress: ProgressFn<'_>) -> Result<(), RecallError> {
        let bundle = self
            .store
            .find_bundle(&self.model_id, BUNDLE_EXTENSIONS)
            .ok_or_else(|| RecallError::Integrity {
                model_id: self.model_id.clone(),
                message: "model bundle is not downloaded".into(),
            })?;
        progress(0.1);
        self.core.clear().await;
        progress(0.6);

        let loader = self.loader.clone();
        let path = bundle.clone();
        let model = tokio::task::spawn_blocking(move || loader.load_bundle(&path))
            .await
            .map_err(|e| RecallError::BackendLoad {
                message: format!("bundle load panicked: {e}"),
                source: None,
            })??;
        self.core.install(model).await?;
        info!(model_id = %self.model_id, bundle = %bundle.display(), "bundle loaded");
        progress(1.0);
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for BundledEngine {
    fn name(&self) -> &str {
        "bundled"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Engine
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        Ok(self.state.health())
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        self.unload().await;
        Ok(())
    }
}

#[async_trait]
impl InferenceEngine for BundledEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn state(&self) -> EngineState {
        self.state.get()
    }

    async fn initialize(&self, progress: ProgressFn<'_>) -> Result<(), RecallError> {
        let _init = self.init.lock().await;
        self.state.set(EngineState::Initializing);
        match self.load(progress).await {
            Ok(()) => {
                self.state.set(EngineState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(model_id = %self.model_id, error = %e, "bundle initialization failed");
                self.core.clear().await;
                self.state.set(EngineState::Failed);
                Err(e)
            }
        }
    }

    async fn start_session(&self, history: &[ChatMessage]) -> Result<(), RecallError> {
        if self.state.get() != EngineState::Ready {
            return Err(RecallError::EngineNotReady("engine not initialized".into()));
        }
        self.core.start_session(history).await
    }

    fn generate(&self, prompt: &str) -> TokenStream {
        if self.state.get() != EngineState::Ready {
            return not_ready("engine not initialized");
        }
        self.core.generate(prompt)
    }

    fn generate_stateless(&self, prompt: &str) -> TokenStream {
        if self.state.get() != EngineState::Ready {
            return not_ready("engine not initialized");
        }
        self.core.generate_stateless(prompt)
    }

    async fn unload(&self) {
        let _init = self.init.lock().await;
        self.core.clear().await;
        self.state.set(EngineState::Uninitialized);
    }
}
