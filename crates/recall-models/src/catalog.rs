// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static catalog of downloadable chat models.
//!
//! Adding a model means adding a descriptor here and listing it in
//! [`ALL_MODELS`].

use recall_core::Backend;
use serde::Serialize;

/// Release host for every catalog artifact.
pub const DEFAULT_BASE_URL: &str =
    "https://github.com/Black-J08/Recall-Models/releases/download/v1.0.0";

/// Capability tier, mapped to device RAM by the profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelTier {
    Lite,
    Standard,
    Pro,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Lite => write!(f, "Lite"),
            ModelTier::Standard => write!(f, "Standard"),
            ModelTier::Pro => write!(f, "Pro"),
        }
    }
}

/// An immutable description of one downloadable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    /// Stable key, also the directory name under the model root.
    pub id: &'static str,
    pub display_name: &'static str,
    pub tier: ModelTier,
    /// Quantization tag, e.g. `q4f16_1`.
    pub quantization: &'static str,
    /// Backend library identifier. Names the library archive.
    pub model_lib: &'static str,
    /// Names the weights archive.
    pub asset_prefix: &'static str,
    pub estimated_size_mb: u32,
    pub estimated_vram_mb: u32,
    pub estimated_ram_mb: u32,
    pub base_url: &'static str,
    pub preferred_backend: Backend,
    pub description: &'static str,
}

impl ModelDescriptor {
    /// Qwen 2.5 0.5B, 4-bit weights with fp16 activations (~400MB)
    pub const QWEN_0_5B_LITE: ModelDescriptor = ModelDescriptor {
        id: "qwen2.5-0.5b-instruct-q4f16",
        display_name: "Qwen 2.5 0.5B",
        tier: ModelTier::Lite,
        quantization: "q4f16_1",
        model_lib: "qwen2_q4f16_1",
        asset_prefix: "Qwen2.5-0.5B-Instruct-q4f16_1",
        estimated_size_mb: 400,
        estimated_vram_mb: 900,
        estimated_ram_mb: 1200,
        base_url: DEFAULT_BASE_URL,
        preferred_backend: Backend::Vulkan,
        description: "Fast and light. Runs on most phones with 3GB of RAM or more.",
    };

    /// Same weights as the Lite model, pinned to the CPU path.
    pub const QWEN_0_5B_CPU: ModelDescriptor = ModelDescriptor {
        id: "qwen2.5-0.5b-instruct-q4f16-cpu",
        display_name: "Qwen 2.5 0.5B (CPU)",
        tier: ModelTier::Lite,
        quantization: "q4f16_1",
        model_lib: "qwen2_q4f16_1_cpu",
        asset_prefix: "Qwen2.5-0.5B-Instruct-q4f16_1",
        estimated_size_mb: 400,
        estimated_vram_mb: 0,
        estimated_ram_mb: 1400,
        base_url: DEFAULT_BASE_URL,
        preferred_backend: Backend::Cpu,
        description: "CPU-only build for devices whose GPU drivers misbehave.",
    };

    /// Qwen 2.5 1.5B (~1.1GB)
    pub const QWEN_1_5B_STANDARD: ModelDescriptor = ModelDescriptor {
        id: "qwen2.5-1.5b-instruct-q4f16",
        display_name: "Qwen 2.5 1.5B",
        tier: ModelTier::Standard,
        quantization: "q4f16_1",
        model_lib: "qwen2_1_5b_q4f16_1",
        asset_prefix: "Qwen2.5-1.5B-Instruct-q4f16_1",
        estimated_size_mb: 1100,
        estimated_vram_mb: 1800,
        estimated_ram_mb: 2500,
        base_url: DEFAULT_BASE_URL,
        preferred_backend: Backend::Vulkan,
        description: "Balanced quality for phones with 6GB of RAM.",
    };

    /// Qwen 2.5 3B (~2.0GB)
    pub const QWEN_3B_PRO: ModelDescriptor = ModelDescriptor {
        id: "qwen2.5-3b-instruct-q4f16",
        display_name: "Qwen 2.5 3B",
        tier: ModelTier::Pro,
        quantization: "q4f16_1",
        model_lib: "qwen2_3b_q4f16_1",
        asset_prefix: "Qwen2.5-3B-Instruct-q4f16_1",
        estimated_size_mb: 2000,
        estimated_vram_mb: 3000,
        estimated_ram_mb: 4000,
        base_url: DEFAULT_BASE_URL,
        preferred_backend: Backend::Vulkan,
        description: "Best answers. Needs 8GB of RAM.",
    };

    /// True when the model must only ever run on the CPU backend.
    pub fn forces_cpu(&self) -> bool {
        self.preferred_backend == Backend::Cpu
    }

    /// URL of the weights archive, optionally on a mirror.
    pub fn weights_url(&self, base_override: Option<&str>) -> String {
        format!("{}/{}.zip", self.base(base_override), self.asset_prefix)
    }

    /// URL of the backend library archive, optionally on a mirror.
    pub fn library_url(&self, base_override: Option<&str>) -> String {
        format!("{}/{}.tar.gz", self.base(base_override), self.model_lib)
    }

    fn base<'a>(&'a self, base_override: Option<&'a str>) -> &'a str {
        base_override
            .unwrap_or(self.base_url)
            .trim_end_matches('/')
    }
}

/// Every model known to the assistant, smallest first.
pub const ALL_MODELS: &[ModelDescriptor] = &[
    ModelDescriptor::QWEN_0_5B_LITE,
    ModelDescriptor::QWEN_0_5B_CPU,
    ModelDescriptor::QWEN_1_5B_STANDARD,
    ModelDescriptor::QWEN_3B_PRO,
];

/// Look up a descriptor by id.
pub fn find(id: &str) -> Option<&'static ModelDescriptor> {
    ALL_MODELS.iter().find(|m| m.id == id)
}

/// The default Lite model.
pub fn default_model() -> &'static ModelDescriptor {
    &ALL_MODELS[0]
}

/// The recommended model for a tier. CPU-pinned variants are never recommended.
pub fn for_tier(tier: ModelTier) -> &'static ModelDescriptor {
    ALL_MODELS
        .iter()
        .find(|m| m.tier == tier && !m.forces_cpu())
        .unwrap_or(default_model())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = ALL_MODELS.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), ALL_MODELS.len());
    }

    #[test]
    fn artifact_urls_follow_naming() {
        let m = &ModelDescriptor::QWEN_0_5B_LITE;
        assert_eq!(
            m.weights_url(None),
            format!("{DEFAULT_BASE_URL}/Qwen2.5-0.5B-Instruct-q4f16_1.zip")
        );
        assert_eq!(
            m.library_url(Some("http://mirror.local/models/")),
            "http://mirror.local/models/qwen2_q4f16_1.tar.gz"
        );
    }

    #[test]
    fn cpu_variant_is_forced_cpu() {
        assert!(ModelDescriptor::QWEN_0_5B_CPU.forces_cpu());
        assert!(!ModelDescriptor::QWEN_0_5B_LITE.forces_cpu());
    }

    #[test]
    fn tiers_resolve_to_gpu_models() {
        assert_eq!(for_tier(ModelTier::Lite).id, "qwen2.5-0.5b-instruct-q4f16");
        assert_eq!(for_tier(ModelTier::Standard).id, "qwen2.5-1.5b-instruct-q4f16");
        assert_eq!(for_tier(ModelTier::Pro).id, "qwen2.5-3b-instruct-q4f16");
    }

    #[test]
    fn find_unknown_is_none() {
        assert!(find("gpt-9").is_none());
        assert!(find("qwen2.5-3b-instruct-q4f16").is_some());
    }
}
