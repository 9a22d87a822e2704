// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic detection of usable compute backends.
//!
//! The answer is a hint. A backend reported here can still fail when the
//! runtime tries to construct it.

use std::path::Path;

use recall_core::Backend;
use tracing::debug;

/// Directories searched for Vulkan ICD manifests.
const VULKAN_ICD_DIRS: &[&str] = &[
    "/usr/share/vulkan/icd.d",
    "/etc/vulkan/icd.d",
    "/usr/local/share/vulkan/icd.d",
    "/vendor/lib64/hw",
];

/// Directory holding OpenCL ICD vendor files.
const OPENCL_VENDOR_DIR: &str = "/etc/OpenCL/vendors";

/// Sysfs nodes exposing the GPU model on Adreno and Mali devices.
const RENDERER_NODES: &[&str] = &[
    "/sys/class/kgsl/kgsl-3d0/gpu_model",
    "/sys/class/misc/mali0/device/gpuinfo",
];

/// Environment override for the GPU renderer string.
pub const RENDERER_ENV: &str = "RECALL_GPU_RENDERER";

/// Platform queries behind backend detection.
pub trait BackendProbe: Send + Sync {
    fn has_vulkan(&self) -> bool;

    fn has_opencl(&self) -> bool;

    /// GPU renderer string, when the platform exposes one.
    fn gpu_renderer(&self) -> Option<String>;
}

/// Probe that inspects the running system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl BackendProbe for SystemProbe {
    fn has_vulkan(&self) -> bool {
        for var in ["VK_ICD_FILENAMES", "VK_DRIVER_FILES"] {
            if let Ok(value) = std::env::var(var)
                && std::env::split_paths(&value).any(|p| p.exists())
            {
                return true;
            }
        }
        if cfg!(windows) {
            let system_root = std::env::var("SystemRoot").unwrap_or_else(|_| "C:\\Windows".into());
            return Path::new(&system_root)
                .join("System32")
                .join("vulkan-1.dll")
                .exists();
        }
        VULKAN_ICD_DIRS.iter().any(|dir| dir_has_entries(Path::new(dir)))
    }

    fn has_opencl(&self) -> bool {
        if let Some(renderer) = self.gpu_renderer()
            && renderer_supports_opencl(&renderer)
        {
            return true;
        }
        dir_has_entries(Path::new(OPENCL_VENDOR_DIR))
    }

    fn gpu_renderer(&self) -> Option<String> {
        if let Ok(value) = std::env::var(RENDERER_ENV)
            && !value.trim().is_empty()
        {
            return Some(value.trim().to_string());
        }
        if Path::new("/sys/class/misc/mali0").exists() {
            let detail = std::fs::read_to_string(RENDERER_NODES[1]).unwrap_or_default();
            return Some(format!("Mali {}", detail.trim()).trim().to_string());
        }
        std::fs::read_to_string(RENDERER_NODES[0])
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Adreno and Mali GPUs generally ship OpenCL drivers.
pub fn renderer_supports_opencl(renderer: &str) -> bool {
    let lower = renderer.to_ascii_lowercase();
    lower.contains("adreno") || lower.contains("mali")
}

fn dir_has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Produces the priority-ordered backend list.
pub struct BackendDetector {
    probe: Box<dyn BackendProbe>,
}

impl BackendDetector {
    pub fn new(probe: Box<dyn BackendProbe>) -> Self {
        Self { probe }
    }

    /// Detector over the running system.
    pub fn system() -> Self {
        Self::new(Box::new(SystemProbe))
    }

    /// Available backends, best first. `Cpu` is always present and last.
    pub fn detect_available_backends(&self) -> Vec<Backend> {
        let mut backends = Vec::with_capacity(3);
        if self.probe.has_vulkan() {
            debug!("Vulkan support detected");
            backends.push(Backend::Vulkan);
        }
        if self.probe.has_opencl() {
            debug!("OpenCL support detected");
            backends.push(Backend::OpenCl);
        }
        backends.push(Backend::Cpu);
        backends
    }

    pub fn gpu_renderer(&self) -> Option<String> {
        self.probe.gpu_renderer()
    }
}

impl Default for BackendDetector {
    fn default() -> Self {
        Self::system()
    }
}
