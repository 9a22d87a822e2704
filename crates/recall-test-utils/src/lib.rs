// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Recall integration tests.
//!
//! Mock adapters and fixtures for fast, deterministic tests that never
//! reach the network or a real inference runtime.
//!
//! # Components
//!
//! - [`MockDownloader`] - URL-keyed bodies with scripted transfer faults
//! - [`MockEmbedder`] - topic-axis embeddings with a failure switch
//! - [`ScriptedRuntime`] - fake native runtime and bundle loader
//! - [`TestHarness`] - orchestrator over temp storage and the mock engine

pub mod fixtures;
pub mod harness;
pub mod mock_downloader;
pub mod mock_embedder;
pub mod scripted_runtime;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_downloader::MockDownloader;
pub use mock_embedder::MockEmbedder;
pub use scripted_runtime::ScriptedRuntime;
