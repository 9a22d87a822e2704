// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-lifetime record of backends that failed construction.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use recall_core::Backend;

/// Shared set of backends never to retry in this process.
///
/// Create one at startup and hand clones to every engine.
#[derive(Debug, Clone, Default)]
pub struct FailedBackends {
    inner: Arc<Mutex<HashSet<Backend>>>,
}

impl FailedBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, backend: Backend) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(backend);
    }

    pub fn contains(&self, backend: Backend) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&backend)
    }

    /// Failed backends in priority order.
    pub fn snapshot(&self) -> Vec<Backend> {
        let mut all: Vec<Backend> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect();
        all.sort();
        all
    }
}
