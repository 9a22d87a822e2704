// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device profiling and model recommendation.

use serde::Serialize;
use sysinfo::System;
use tracing::info;

use crate::backend::BackendDetector;
use crate::catalog::{self, ModelDescriptor, ModelTier};

const GIB: u64 = 1024 * 1024 * 1024;

/// Snapshot of the device's inference-relevant hardware.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceProfile {
    pub total_ram_gb: u64,
    pub gpu_vendor_guess: String,
    pub os_version: String,
    pub recommended_model: &'static ModelDescriptor,
}

impl DeviceProfile {
    /// Assemble a profile from raw measurements.
    pub fn from_parts(total_ram_bytes: u64, renderer: Option<&str>, os_version: String) -> Self {
        let total_ram_gb = total_ram_bytes / GIB;
        Self {
            total_ram_gb,
            gpu_vendor_guess: guess_gpu_vendor(renderer),
            os_version,
            recommended_model: recommend(total_ram_gb),
        }
    }

    pub fn meets_minimum_specs(&self) -> bool {
        self.total_ram_gb >= 3
    }
}

/// Model tier for a device with `total_ram_gb` of RAM.
pub fn recommend(total_ram_gb: u64) -> &'static ModelDescriptor {
    let tier = match total_ram_gb {
        8.. => ModelTier::Pro,
        6..=7 => ModelTier::Standard,
        _ => ModelTier::Lite,
    };
    catalog::for_tier(tier)
}

/// Map a renderer or SoC hint to a human-readable vendor.
pub fn guess_gpu_vendor(hint: Option<&str>) -> String {
    let Some(hint) = hint else {
        return "Unknown".to_string();
    };
    let lower = hint.to_ascii_lowercase();
    let vendor = if lower.contains("qcom") || lower.contains("qualcomm") || lower.contains("adreno")
    {
        "Adreno (Qualcomm)"
    } else if lower.contains("mediatek") || lower.starts_with("mt") {
        "Mali (MediaTek)"
    } else if lower.contains("exynos") {
        "Mali (Samsung)"
    } else if lower.contains("mali") {
        "Mali"
    } else {
        "Unknown"
    };
    vendor.to_string()
}

/// Builds [`DeviceProfile`]s from the running system.
pub struct HardwareProfiler<'a> {
    detector: &'a BackendDetector,
}

impl<'a> HardwareProfiler<'a> {
    pub fn new(detector: &'a BackendDetector) -> Self {
        Self { detector }
    }

    pub fn profile(&self) -> DeviceProfile {
        let mut sys = System::new();
        sys.refresh_memory();
        let os_version = System::long_os_version()
            .or_else(System::os_version)
            .unwrap_or_else(|| "unknown".to_string());
        let renderer = self.detector.gpu_renderer();
        let profile = DeviceProfile::from_parts(sys.total_memory(), renderer.as_deref(), os_version);
        info!(
            ram_gb = profile.total_ram_gb,
            gpu = %profile.gpu_vendor_guess,
            recommended = profile.recommended_model.id,
            "device profiled"
        );
        profile
    }
}
