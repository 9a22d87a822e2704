// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `/etc/recall/recall.toml`, `~/.config/recall/recall.toml`,
//! `./recall.toml`, then `RECALL_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RecallConfig;

/// Config sections addressable from the environment.
const ENV_SECTIONS: &[&str] = &["agent", "storage", "models", "engine", "memory", "chat"];

pub(crate) const SYSTEM_CONFIG: &str = "/etc/recall/recall.toml";
pub(crate) const LOCAL_CONFIG: &str = "recall.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("recall").join("recall.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<RecallConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults.
///
/// No files or environment variables are consulted.
pub fn load_config_from_str(toml_content: &str) -> Result<RecallConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file plus env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RecallConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full merge chain before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Maps `RECALL_<SECTION>_<KEY>` onto `section.key`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `RECALL_MODELS_SELECTED_MODEL` lands on `models.selected_model`.
fn env_provider() -> Env {
    Env::prefixed("RECALL_").map(|key| {
        let raw = key.as_str().to_ascii_lowercase();
        ENV_SECTIONS
            .iter()
            .find_map(|section| {
                raw.strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or(raw.clone())
            .into()
    })
}
