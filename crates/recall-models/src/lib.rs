// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model lifecycle for the Recall assistant.
//!
//! The static catalog, backend and hardware detection, the on-disk
//! artifact store with its two-stage download, and status tracking.

pub mod archive;
pub mod backend;
pub mod catalog;
pub mod download;
pub mod profile;
pub mod status;
pub mod store;

pub use backend::{BackendDetector, BackendProbe, SystemProbe};
pub use catalog::{ALL_MODELS, ModelDescriptor, ModelTier};
pub use download::{Downloader, HttpDownloader};
pub use profile::{DeviceProfile, HardwareProfiler};
pub use status::{ModelStatus, ModelStatusTracker};
pub use store::ArtifactStore;
