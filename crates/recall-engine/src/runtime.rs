// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The seam between engines and the native inference runtime.
//!
//! Every method here blocks. Engines call them from `spawn_blocking`.

use std::path::Path;
use std::sync::Arc;

use recall_core::{Backend, RecallError};

/// Receives each decoded increment. Returning `false` stops generation.
pub type TokenSink<'a> = &'a mut dyn FnMut(&str) -> bool;

/// A mutable token context holding one conversation.
pub trait ChatContext: Send {
    /// Append prompt text without generating.
    fn append(&mut self, text: &str) -> Result<(), RecallError>;

    /// Generate up to `max_new_tokens`, appending them to the context.
    fn generate(&mut self, max_new_tokens: usize, sink: TokenSink<'_>) -> Result<(), RecallError>;
}

/// Weights resident on a backend, shared across session resets.
pub trait LoadedModel: Send + Sync {
    fn new_context(&self) -> Result<Box<dyn ChatContext>, RecallError>;

    /// Generate from `prompt` in a throwaway context.
    fn generate_stateless(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        sink: TokenSink<'_>,
    ) -> Result<(), RecallError>;
}

/// A constructed compute backend.
pub trait BackendHandle: Send + Sync {
    fn backend(&self) -> Backend;

    /// Load the weights rooted at `model_dir` with the given library.
    fn load(&self, model_dir: &Path, model_lib: &str) -> Result<Arc<dyn LoadedModel>, RecallError>;
}

/// Constructs backends by kind. Construction may fail or panic.
pub trait RuntimeFactory: Send + Sync {
    fn construct(&self, backend: Backend) -> Result<Arc<dyn BackendHandle>, RecallError>;
}

/// Loads a single-file model bundle on the CPU.
pub trait BundleLoader: Send + Sync {
    fn load_bundle(&self, path: &Path) -> Result<Arc<dyn LoadedModel>, RecallError>;
}
