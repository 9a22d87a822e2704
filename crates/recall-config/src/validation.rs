// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::RecallConfig;

/// Validate a deserialized configuration.
///
/// Collects every violation instead of stopping at the first.
pub fn validate_config(config: &RecallConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.models.data_dir.trim().is_empty() {
        fail("models.data_dir must not be empty".to_string());
    }

    if config.models.selected_model.trim().is_empty() {
        fail("models.selected_model must not be empty".to_string());
    }

    if let Some(url) = &config.models.base_url
        && !(url.starts_with("https://") || url.starts_with("http://"))
    {
        fail(format!("models.base_url `{url}` must be an http(s) URL"));
    }

    let threshold = config.memory.similarity_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        fail(format!(
            "memory.similarity_threshold must be within [0, 1], got {threshold}"
        ));
    }

    if config.memory.max_results == 0 {
        fail("memory.max_results must be at least 1".to_string());
    }

    if config.engine.history_turns == 0 {
        fail("engine.history_turns must be at least 1".to_string());
    }

    if config.engine.max_new_tokens == 0 {
        fail("engine.max_new_tokens must be at least 1".to_string());
    }

    if config.engine.intra_threads == 0 {
        fail("engine.intra_threads must be at least 1".to_string());
    }

    if config.chat.default_title.trim().is_empty() {
        fail("chat.default_title must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
