// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inference engines for the Recall assistant.
//!
//! Three [`InferenceEngine`](recall_core::InferenceEngine) variants share one
//! session protocol:
//!
//! - [`NativeEngine`] probes compute backends in priority order over a
//!   [`RuntimeFactory`] and remembers which ones failed.
//! - [`BundledEngine`] loads a single-file bundle on CPU.
//! - [`MockEngine`] is scripted and deterministic.
//!
//! [`OnnxRuntime`] is the shipped runtime for both real variants.

pub mod bundled;
pub mod chatml;
pub mod failed;
pub mod mock;
pub mod native;
pub mod onnx;
pub mod runtime;
pub mod session;
pub mod state;

pub use bundled::BundledEngine;
pub use failed::FailedBackends;
pub use mock::{MockEngine, MockReply};
pub use native::NativeEngine;
pub use onnx::OnnxRuntime;
pub use runtime::{BackendHandle, BundleLoader, ChatContext, LoadedModel, RuntimeFactory};
pub use session::{EngineOptions, SessionCore};
