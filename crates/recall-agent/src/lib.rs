// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat orchestration for the Recall assistant.
//!
//! [`SessionOrchestrator`] ties persistence, memory retrieval and the
//! inference engine together, publishing everything a chat view needs
//! through one [`ChatState`] watch channel.

pub mod orchestrator;
pub mod state;
pub mod title;

pub use orchestrator::{OrchestratorSettings, SessionOrchestrator};
pub use state::{ChatState, EngineStatus, PendingResponse};
