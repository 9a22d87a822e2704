// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Table-scoped change notifications backing the storage subscriptions.

use tokio::sync::broadcast;

/// Tables whose writes are observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Sessions,
    Messages,
}

/// Broadcasts the table touched by each committed write.
///
/// Notifications are coarse: a subscriber learns that a table changed and
/// re-queries the rows it cares about.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Table>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Announce a write. Having no subscribers is fine.
    pub fn notify(&self, table: Table) {
        let _ = self.tx.send(table);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Table> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until `table` changes.
///
/// Returns `false` once the feed is gone. A lagged receiver counts as a change.
pub(crate) async fn wait_for(rx: &mut broadcast::Receiver<Table>, table: Table) -> bool {
    loop {
        match rx.recv().await {
            Ok(changed) if changed == table => return true,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => return true,
            Err(broadcast::error::RecvError::Closed) => return false,
        }
    }
}
