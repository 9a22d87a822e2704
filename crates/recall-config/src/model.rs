// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Recall assistant.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Recall configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecallConfig {
    /// Assistant identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Model catalog, download, and artifact locations.
    #[serde(default)]
    pub models: ModelsConfig,

    /// Inference engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Memory and retrieval settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Chat session behavior.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Assistant identity and behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Replaces the built-in system instruction replayed at the start of every session.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            system_prompt: None,
        }
    }
}

fn default_agent_name() -> String {
    "recall".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("recall").join("recall.db"))
        .unwrap_or_else(|| PathBuf::from("recall.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Model artifact configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    /// Root for internal model storage. Models live under `<data_dir>/models/<id>`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Optional removable/shared root checked first for sideloaded models.
    #[serde(default)]
    pub external_dir: Option<String>,

    /// Catalog id of the model the engine loads.
    #[serde(default = "default_selected_model")]
    pub selected_model: String,

    /// Mirror that replaces every catalog entry's download base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            external_dir: None,
            selected_model: default_selected_model(),
            base_url: None,
        }
    }
}

impl ModelsConfig {
    pub fn data_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("recall"))
        .unwrap_or_else(|| PathBuf::from(".recall"))
        .display()
        .to_string()
}

fn default_selected_model() -> String {
    "qwen2.5-0.5b-instruct-q4f16".to_string()
}

/// Which engine implementation the binary wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineVariant {
    /// Compiled-native backends with Vulkan/OpenCL/CPU fallback.
    #[default]
    Native,
    /// Single-file bundle executed by the bundled runtime on CPU.
    Bundled,
    /// Deterministic scripted engine.
    Mock,
}

/// Inference engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub variant: EngineVariant,

    /// Maximum number of prior messages replayed into a new session.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Pause before each backend construction attempt, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Pause after a failed backend construction, in milliseconds.
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,

    /// Upper bound on tokens produced per generation call.
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Intra-op threads used by the bundled ONNX runtime.
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            variant: EngineVariant::default(),
            history_turns: default_history_turns(),
            settle_delay_ms: default_settle_delay_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
            max_new_tokens: default_max_new_tokens(),
            intra_threads: default_intra_threads(),
        }
    }
}

fn default_history_turns() -> usize {
    20
}

fn default_settle_delay_ms() -> u64 {
    200
}

fn default_failure_backoff_ms() -> u64 {
    500
}

fn default_max_new_tokens() -> usize {
    512
}

fn default_intra_threads() -> usize {
    1
}

/// Memory system configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Enable retrieval-augmented prompts. When false, prompts go to the engine verbatim.
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,

    /// Minimum cosine similarity for a memory to be injected (0.0-1.0).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Maximum number of memories injected per prompt.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            similarity_threshold: default_similarity_threshold(),
            max_results: default_max_results(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_similarity_threshold() -> f32 {
    0.5
}

fn default_max_results() -> usize {
    3
}

/// Chat session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Placeholder title; sessions still carrying it get a generated title.
    #[serde(default = "default_title")]
    pub default_title: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_title: default_title(),
        }
    }
}

fn default_title() -> String {
    "New Conversation".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_variant_parses_lowercase() {
        let config: RecallConfig = toml::from_str("[engine]\nvariant = \"bundled\"\n").unwrap();
        assert_eq!(config.engine.variant, EngineVariant::Bundled);
    }

    #[test]
    fn unknown_engine_variant_rejected() {
        let result = toml::from_str::<RecallConfig>("[engine]\nvariant = \"gpu\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn retrieval_defaults() {
        let config = MemoryConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_results, 3);
        assert!((config.similarity_threshold - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn engine_defaults_follow_replay_and_backoff_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.history_turns, 20);
        assert_eq!(config.settle_delay_ms, 200);
        assert_eq!(config.failure_backoff_ms, 500);
    }
}
