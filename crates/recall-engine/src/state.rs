// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::{Mutex, PoisonError};

use recall_core::{EngineState, HealthStatus};

/// Engine lifecycle state readable from synchronous code.
#[derive(Debug)]
pub struct StateCell(Mutex<EngineState>);

impl StateCell {
    pub fn new() -> Self {
        Self(Mutex::new(EngineState::Uninitialized))
    }

    pub fn get(&self) -> EngineState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, state: EngineState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn health(&self) -> HealthStatus {
        match self.get() {
            EngineState::Ready => HealthStatus::Healthy,
            EngineState::Failed => HealthStatus::Unhealthy("initialization failed".into()),
            EngineState::Initializing => HealthStatus::Degraded("initializing".into()),
            EngineState::Uninitialized => HealthStatus::Degraded("not initialized".into()),
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
