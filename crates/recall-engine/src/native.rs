// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine over compiled-native backends with ordered fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recall_core::{
    AdapterType, Backend, ChatMessage, EngineState, HealthStatus, InferenceEngine,
    PluginAdapter, ProgressFn, RecallError, TokenStream,
};
use recall_models::catalog;
use recall_models::{ArtifactStore, BackendDetector};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::failed::FailedBackends;
use crate::runtime::{BackendHandle, RuntimeFactory};
use crate::session::{EngineOptions, SessionCore, not_ready};
use crate::state::StateCell;

/// Inference engine that probes Vulkan, OpenCL and CPU in turn.
///
/// A backend that fails construction is recorded in the shared
/// [`FailedBackends`] set and never retried in this process.
pub struct NativeEngine {
    model_id: String,
    store: Arc<ArtifactStore>,
    detector: Arc<BackendDetector>,
    runtime: Arc<dyn RuntimeFactory>,
    failed: FailedBackends,
    state: StateCell,
    handle: Mutex<Option<Arc<dyn BackendHandle>>>,
    core: SessionCore,
}

impl NativeEngine {
    pub fn new(
        model_id: impl Into<String>,
        store: Arc<ArtifactStore>,
        detector: Arc<BackendDetector>,
        runtime: Arc<dyn RuntimeFactory>,
        failed: FailedBackends,
        options: EngineOptions,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            store,
            detector,
            runtime,
            failed,
            state: StateCell::new(),
            handle: Mutex::new(None),
            core: SessionCore::new(options),
        }
    }

    /// Backend in use, if one has been secured.
    pub async fn active_backend(&self) -> Option<Backend> {
        self.handle.lock().await.as_ref().map(|h| h.backend())
    }

    fn candidates(&self, descriptor: &catalog::ModelDescriptor) -> Vec<Backend> {
        let detected = if descriptor.forces_cpu() {
            vec![Backend::Cpu]
        } else {
            self.detector.detect_available_backends()
        };
        detected
            .into_iter()
            .filter(|b| !self.failed.contains(*b))
            .collect()
    }

    async fn secure_backend(
        &self,
        descriptor: &catalog::ModelDescriptor,
    ) -> Result<Arc<dyn BackendHandle>, RecallError> {
        let candidates = self.candidates(descriptor);
        if candidates.is_empty() {
            return Err(RecallError::BackendConstruction {
                backend: "none".into(),
                message: format!(
                    "no untried backends remain (failed: {:?})",
                    self.failed.snapshot()
                ),
            });
        }

        let options = self.core.options();
        let mut last: Option<(Backend, String)> = None;
        for backend in candidates {
            tokio::time::sleep(Duration::from_millis(options.settle_delay_ms)).await;
            let runtime = self.runtime.clone();
            let attempt = tokio::task::spawn_blocking(move || runtime.construct(backend)).await;
            let message = match attempt {
                Ok(Ok(handle)) => {
                    info!(model_id = %descriptor.id, backend = %backend, "backend secured");
                    return Ok(handle);
                }
                Ok(Err(e)) => e.to_string(),
                Err(join) => format!("backend constructor panicked: {join}"),
            };
            warn!(model_id = %descriptor.id, backend = %backend, error = %message, "backend construction failed");
            self.failed.mark(backend);
            last = Some((backend, message));
            tokio::time::sleep(Duration::from_millis(options.failure_backoff_ms)).await;
        }

        let (backend, message) = last.unwrap_or((Backend::Cpu, "no attempt made".into()));
        Err(RecallError::BackendConstruction {
            backend: backend.to_string(),
            message: format!("failed to initialize on any backend, last error: {message}"),
        })
    }

    async fn initialize_locked(
        &self,
        handle: &mut Option<Arc<dyn BackendHandle>>,
        progress: ProgressFn<'_>,
    ) -> Result<(), RecallError> {
        let descriptor = catalog::find(&self.model_id)
            .ok_or_else(|| RecallError::NotFound(format!("model {}", self.model_id)))?;
        if !self.store.is_model_complete(descriptor.id) {
            return Err(RecallError::Integrity {
                model_id: descriptor.id.to_string(),
                message: "model is not downloaded. Download it from the model manager first"
                    .into(),
            });
        }
        progress(0.1);

        let backend = match handle.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                let secured = self.secure_backend(descriptor).await?;
                *handle = Some(secured.clone());
                secured
            }
        };
        progress(0.4);

        self.core.clear().await;
        progress(0.6);
        let root = self.store.path_for(descriptor.id);
        let lib = descriptor.model_lib;
        let loaded = tokio::task::spawn_blocking(move || backend.load(&root, lib)).await;
        let model = match loaded {
            Ok(Ok(model)) => model,
            Ok(Err(e)) => {
                *handle = None;
                return Err(match e {
                    e @ RecallError::BackendLoad { .. } => e,
                    other => RecallError::BackendLoad {
                        message: other.to_string(),
                        source: Some(Box::new(other)),
                    },
                });
            }
            Err(join) => {
                *handle = None;
                return Err(RecallError::BackendLoad {
                    message: format!("model load panicked: {join}"),
                    source: None,
                });
            }
        };

        self.core.install(model).await?;
        progress(1.0);
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for NativeEngine {
    fn name(&self) -> &str {
        "native"
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
impl InferenceEngine for NativeEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn state(&self) -> EngineState {
        self.state.get()
    }

    async fn initialize(&self, progress: ProgressFn<'_>) -> Result<(), RecallError> {
        let mut handle = self.handle.lock().await;
        self.state.set(EngineState::Initializing);
        match self.initialize_locked(&mut handle, progress).await {
            Ok(()) => {
                self.state.set(EngineState::Ready);
                info!(model_id = %self.model_id, "engine ready");
                Ok(())
            }
            Err(e) => {
                self.core.clear().await;
                self.state.set(EngineState::Failed);
                warn!(model_id = %self.model_id, error = %e, "engine initialization failed");
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
        let mut handle = self.handle.lock().await;
        self.core.clear().await;
        *handle = None;
        self.state.set(EngineState::Uninitialized);
    }
}
