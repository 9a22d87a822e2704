// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Recall assistant.

use thiserror::Error;

/// Why a network fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkFailure {
    /// DNS resolution of the host failed.
    HostUnresolved { host: String },
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// Connection reset, TLS failure, truncated body, and similar.
    Transport,
}

/// The primary error type used across all Recall crates.
#[derive(Debug, Error)]
pub enum RecallError {
    /// Configuration errors (invalid TOML, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A model id, session, or file that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Download transport failure.
    #[error("network error: {message}")]
    Network {
        message: String,
        failure: NetworkFailure,
    },

    /// The artifact set on disk is incomplete or an archive is corrupt.
    #[error("integrity error for {model_id}: {message}")]
    Integrity { model_id: String, message: String },

    /// A native backend could not be constructed.
    #[error("backend construction failed on {backend}: {message}")]
    BackendConstruction { backend: String, message: String },

    /// The backend was constructed but rejected the model weights.
    #[error("failed to load model: {message}")]
    BackendLoad {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Retrieval could not run. Logged by the retrieval layer, never returned to callers.
    #[error("retrieval degraded: {0}")]
    RetrievalDegraded(String),

    /// The engine has no loaded model or session.
    #[error("engine not ready: {0}")]
    EngineNotReady(String),

    /// Filesystem errors with the operation that caused them.
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RecallError {
    /// Shorthand for wrapping an `io::Error` with the operation that failed.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true if this error came from the network layer.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// A short, human-readable status line for display in UIs and the CLI.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network {
                failure: NetworkFailure::HostUnresolved { host },
                ..
            } => format!(
                "Cannot resolve {host}. Check your internet connection and DNS settings."
            ),
            Self::Network {
                failure: NetworkFailure::Status(code),
                ..
            } => format!("Download failed: HTTP {code}"),
            Self::Network { message, .. } => format!("Download failed: {message}"),
            Self::Integrity { model_id, message } => {
                format!("Model {model_id} is not usable: {message}")
            }
            Self::BackendConstruction { message, .. } => {
                format!("Failed to initialize AI engine: {message}")
            }
            Self::BackendLoad { message, .. } => format!("Failed to load model: {message}"),
            Self::EngineNotReady(message) => format!("Engine not ready: {message}"),
            other => other.to_string(),
        }
    }
}
