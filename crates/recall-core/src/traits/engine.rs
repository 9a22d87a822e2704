// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inference engine trait: one stateful chat-session contract over every backend.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::RecallError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChatMessage, EngineState};

/// Incremental text produced by a generation call.
///
/// Dropping the stream cancels generation.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, RecallError>> + Send>>;

/// Progress callback receiving values in `[0, 1]`.
pub type ProgressFn<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// A stateful text-generation engine.
///
/// `start_session`, `generate`, and `generate_stateless` are serialized by
/// one gate per engine, so a reset can never interleave with streaming.
#[async_trait]
pub trait InferenceEngine: PluginAdapter {
    /// Identifier of the model this engine serves.
    fn model_id(&self) -> &str;

    fn state(&self) -> EngineState;

    fn is_initialized(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Verifies artifacts, secures a backend, and loads weights.
    async fn initialize(&self, progress: ProgressFn<'_>) -> Result<(), RecallError>;

    /// Resets the context and replays the tail of `history`.
    async fn start_session(&self, history: &[ChatMessage]) -> Result<(), RecallError>;

    /// Appends `prompt` as a user turn and streams the reply.
    ///
    /// An engine that is not ready yields a single `EngineNotReady` error.
    fn generate(&self, prompt: &str) -> TokenStream;

    /// Generates outside the session context (titles, utilities).
    fn generate_stateless(&self, prompt: &str) -> TokenStream;

    /// Releases the context and the loaded model. Idempotent.
    async fn unload(&self);
}
