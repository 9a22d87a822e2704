// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Recall on-device assistant.
//!
//! Defines the error taxonomy, the domain types persisted and exchanged
//! between crates, and the adapter traits that storage, embedding, and
//! inference implementations plug into.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{NetworkFailure, RecallError};
pub use types::{
    AdapterType, Backend, ChatMessage, ChatSession, EngineState, HealthStatus,
    DEFAULT_SESSION_TITLE,
};

pub use traits::{
    EmbeddingAdapter, InferenceEngine, MessageStream, PluginAdapter, ProgressFn,
    SessionStream, StorageAdapter, TokenStream,
};
