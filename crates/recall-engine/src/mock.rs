// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic engine for exercising the chat pipeline without weights.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use recall_core::{
    AdapterType, ChatMessage, EngineState, HealthStatus, InferenceEngine, PluginAdapter,
    ProgressFn, RecallError, TokenStream,
};
use tokio::sync::mpsc;

use crate::session::not_ready;
use crate::state::StateCell;

const INIT_STEPS: u32 = 5;

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Streamed word by word.
    Text(String),
    /// Streams `partial` and then fails with `message`.
    Error { partial: String, message: String },
}

#[derive(Default)]
struct Script {
    session_replies: VecDeque<MockReply>,
    stateless_replies: VecDeque<MockReply>,
    init_failure: Option<String>,
    prompts: Vec<String>,
    stateless_prompts: Vec<String>,
    sessions: Vec<Vec<ChatMessage>>,
}

pub struct MockEngine {
    model_id: String,
    state: StateCell,
    script: Mutex<Script>,
    gate: Arc<tokio::sync::Mutex<()>>,
    step_delay: Duration,
    token_delay: Duration,
}

pub fn default_reply(prompt: &str) -> String {
    format!(
        "This is a mock response from Recall. Since I'm in mock mode, I'm just acknowledging your prompt: \"{prompt}\""
    )
}

impl MockEngine {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            state: StateCell::new(),
            script: Mutex::new(Script::default()),
            gate: Arc::new(tokio::sync::Mutex::new(())),
            step_delay: Duration::ZERO,
            token_delay: Duration::ZERO,
        }
    }

    /// Pace initialization steps and streamed words.
    pub fn with_delays(mut self, step: Duration, token: Duration) -> Self {
        self.step_delay = step;
        self.token_delay = token;
        self
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.script().session_replies.push_back(reply);
    }

    pub fn push_response(&self, text: impl Into<String>) {
        self.push_reply(MockReply::Text(text.into()));
    }

    pub fn push_stateless_response(&self, text: impl Into<String>) {
        self.script()
            .stateless_replies
            .push_back(MockReply::Text(text.into()));
    }

    /// Make the next `initialize` fail with `message`.
    pub fn fail_next_initialize(&self, message: impl Into<String>) {
        self.script().init_failure = Some(message.into());
    }

    pub fn prompts(&self) -> Vec<String> {
        self.script().prompts.clone()
    }

    pub fn stateless_prompts(&self) -> Vec<String> {
        self.script().stateless_prompts.clone()
    }

    /// Histories passed to each `start_session`, oldest first.
    pub fn sessions(&self) -> Vec<Vec<ChatMessage>> {
        self.script().sessions.clone()
    }

    fn stream(&self, reply: MockReply) -> TokenStream {
        let (text, failure) = match reply {
            MockReply::Text(text) => (text, None),
            MockReply::Error { partial, message } => (partial, Some(message)),
        };
        let words: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();
        let gate = self.gate.clone();
        let delay = self.token_delay;
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let _gate = gate.lock_owned().await;
            for word in words {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(word)).await.is_err() {
                    return;
                }
            }
            if let Some(message) = failure {
                let _ = tx.send(Err(RecallError::Internal(message))).await;
            }
        });

        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }
}

#[async_trait]
impl PluginAdapter for MockEngine {
    fn name(&self) -> &str {
        "mock"
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
impl InferenceEngine for MockEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn state(&self) -> EngineState {
        self.state.get()
    }

    async fn initialize(&self, progress: ProgressFn<'_>) -> Result<(), RecallError> {
        self.state.set(EngineState::Initializing);
        let failure = self.script().init_failure.take();
        for step in 1..=INIT_STEPS {
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            if let Some(message) = &failure
                && step == INIT_STEPS / 2
            {
                self.state.set(EngineState::Failed);
                return Err(RecallError::BackendConstruction {
                    backend: "mock".into(),
                    message: message.clone(),
                });
            }
            progress(step as f32 / INIT_STEPS as f32);
        }
        self.state.set(EngineState::Ready);
        Ok(())
    }

    async fn start_session(&self, history: &[ChatMessage]) -> Result<(), RecallError> {
        if self.state.get() != EngineState::Ready {
            return Err(RecallError::EngineNotReady("mock engine not initialized".into()));
        }
        let _gate = self.gate.lock().await;
        self.script().sessions.push(history.to_vec());
        Ok(())
    }

    fn generate(&self, prompt: &str) -> TokenStream {
        if self.state.get() != EngineState::Ready {
            return not_ready("mock engine not initialized");
        }
        let reply = {
            let mut script = self.script();
            script.prompts.push(prompt.to_string());
            script.session_replies.pop_front()
        };
        self.stream(reply.unwrap_or_else(|| MockReply::Text(default_reply(prompt))))
    }

    fn generate_stateless(&self, prompt: &str) -> TokenStream {
        if self.state.get() != EngineState::Ready {
            return not_ready("mock engine not initialized");
        }
        let reply = {
            let mut script = self.script();
            script.stateless_prompts.push(prompt.to_string());
            script.stateless_replies.pop_front()
        };
        self.stream(reply.unwrap_or_else(|| MockReply::Text(default_reply(prompt))))
    }

    async fn unload(&self) {
        self.state.set(EngineState::Uninitialized);
    }
}
