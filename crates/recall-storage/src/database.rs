// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements run on tokio-rusqlite's single background thread, which
//! serializes writes. Clones of [`Database`] share that thread.

use std::path::Path;

use recall_core::RecallError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// Handle to the Recall SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) a WAL-mode database and apply migrations.
    pub async fn open(path: &str) -> Result<Self, RecallError> {
        Self::open_with(path, true).await
    }

    /// Open with explicit journal mode selection.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, RecallError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| RecallError::io(format!("creating {}", parent.display()), e))?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| map_tr_err(tokio_rusqlite::Error::Error(e)))?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// In-memory database with the full schema, for tests.
    pub async fn open_in_memory() -> Result<Self, RecallError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| map_tr_err(tokio_rusqlite::Error::Error(e)))?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), RecallError> {
        self.conn
            .call(move |conn| -> Result<_, rusqlite::Error> {
                if wal_mode {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                    conn.pragma_update(None, "synchronous", "NORMAL")?;
                }
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.pragma_update(None, "busy_timeout", 5000)?;
                Ok(migrations::run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)?
    }

    /// The shared connection handle.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the main file is self-contained.
    pub async fn close(&self) -> Result<(), RecallError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Convert tokio-rusqlite errors into `RecallError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> RecallError {
    RecallError::Storage {
        source: Box::new(e),
    }
}
