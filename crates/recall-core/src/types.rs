// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across adapter traits and the Recall crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Title given to sessions before the first exchange is summarized.
pub const DEFAULT_SESSION_TITLE: &str = "New Conversation";

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Embedding,
    Engine,
}

/// A concrete compute path for inference.
///
/// Declaration order is the default fallback priority.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Vulkan,
    #[strum(serialize = "opencl")]
    #[serde(rename = "opencl")]
    OpenCl,
    Cpu,
}

/// Lifecycle of an inference engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    /// Unix milliseconds of the last write to this session.
    pub last_modified: i64,
}

impl ChatSession {
    /// A fresh session with a random id, stamped now.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            last_modified: now_millis(),
        }
    }
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub text: String,
    pub is_user: bool,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user(session_id: &str, text: impl Into<String>) -> Self {
        Self::new(session_id, text, true)
    }

    pub fn assistant(session_id: &str, text: impl Into<String>) -> Self {
        Self::new(session_id, text, false)
    }

    fn new(session_id: &str, text: impl Into<String>, is_user: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            text: text.into(),
            is_user,
            timestamp: now_millis(),
        }
    }

    /// ChatML role name for this turn.
    pub fn role(&self) -> &'static str {
        if self.is_user { "user" } else { "assistant" }
    }
}

/// Input for an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
