// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{OnceCell, broadcast};
use tracing::debug;

use recall_config::model::StorageConfig;
use recall_core::{
    AdapterType, ChatMessage, ChatSession, HealthStatus, MessageStream, PluginAdapter,
    RecallError, SessionStream, StorageAdapter,
};

use crate::changes::{ChangeFeed, Table, wait_for};
use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened on [`StorageAdapter::initialize`]. Every write
/// announces its table on a [`ChangeFeed`] so the watch streams can re-query.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
    changes: ChangeFeed,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
            changes: ChangeFeed::new(),
        }
    }

    /// The underlying database, or an error if not initialized.
    pub fn database(&self) -> Result<&Database, RecallError> {
        self.db.get().ok_or_else(|| RecallError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// Subscribe to raw change notifications.
    pub fn changes(&self) -> broadcast::Receiver<Table> {
        self.changes.subscribe()
    }

    fn watch<T, F, Fut>(&self, table: Table, query: F) -> futures::stream::BoxStream<'static, Result<T, RecallError>>
    where
        T: Send + 'static,
        F: Fn(Database) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<T, RecallError>> + Send + 'static,
    {
        let db = match self.database() {
            Ok(db) => db.clone(),
            Err(e) => return futures::stream::once(async move { Err(e) }).boxed(),
        };
        // Subscribe before the first query so no write slips between them.
        let rx = self.changes.subscribe();
        futures::stream::unfold(
            (db, rx, query, true),
            move |(db, mut rx, query, first)| async move {
                if !first && !wait_for(&mut rx, table).await {
                    return None;
                }
                let item = query(db.clone()).await;
                Some((item, (db, rx, query, false)))
            },
        )
        .boxed()
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        let db = self.database()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        if let Some(db) = self.db.get() {
            db.close().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), RecallError> {
        let path = self.config.database_path.clone();
        let db = Database::open_with(&path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| RecallError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), RecallError> {
        self.database()?.close().await
    }

    // --- Session operations ---

    async fn list_sessions(&self) -> Result<Vec<ChatSession>, RecallError> {
        queries::sessions::list_sessions(self.database()?).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<ChatSession>, RecallError> {
        queries::sessions::get_session(self.database()?, id).await
    }

    async fn upsert_session(&self, session: &ChatSession) -> Result<(), RecallError> {
        queries::sessions::upsert_session(self.database()?, session).await?;
        self.changes.notify(Table::Sessions);
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<(), RecallError> {
        queries::sessions::delete_session(self.database()?, id).await?;
        self.changes.notify(Table::Sessions);
        self.changes.notify(Table::Messages);
        Ok(())
    }

    async fn update_session_title(&self, id: &str, title: &str) -> Result<(), RecallError> {
        queries::sessions::update_title(self.database()?, id, title).await?;
        self.changes.notify(Table::Sessions);
        Ok(())
    }

    async fn delete_empty_sessions(&self) -> Result<usize, RecallError> {
        let removed = queries::sessions::delete_empty_sessions(self.database()?).await?;
        if removed > 0 {
            debug!(removed, "pruned empty sessions");
            self.changes.notify(Table::Sessions);
        }
        Ok(removed)
    }

    // --- Message operations ---

    async fn upsert_message(&self, message: &ChatMessage) -> Result<(), RecallError> {
        queries::messages::upsert_message(self.database()?, message).await?;
        self.changes.notify(Table::Messages);
        self.changes.notify(Table::Sessions);
        Ok(())
    }

    async fn messages_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ChatMessage>, RecallError> {
        queries::messages::messages_for_session(self.database()?, session_id).await
    }

    // --- Subscriptions ---

    fn watch_sessions(&self) -> SessionStream {
        self.watch(Table::Sessions, |db| async move {
            queries::sessions::list_sessions(&db).await
        })
    }

    fn watch_messages(&self, session_id: &str) -> MessageStream {
        let session_id = session_id.to_string();
        self.watch(Table::Messages, move |db| {
            let session_id = session_id.clone();
            async move { queries::messages::messages_for_session(&db, &session_id).await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    async fn ready_storage() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        (storage, dir)
    }

    async fn next<T>(stream: &mut futures::stream::BoxStream<'static, Result<T, RecallError>>) -> T {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("stream stalled")
            .expect("stream ended")
            .unwrap()
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn operations_before_initialize_fail() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        assert!(storage.list_sessions().await.is_err());
        let mut watch = storage.watch_sessions();
        assert!(watch.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let (storage, _dir) = ready_storage().await;
        assert!(storage.initialize().await.is_err());
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn watch_sessions_emits_current_then_each_change() {
        let (storage, _dir) = ready_storage().await;
        let mut watch = storage.watch_sessions();
        assert!(next(&mut watch).await.is_empty());

        let session = ChatSession::new("New Conversation");
        storage.upsert_session(&session).await.unwrap();
        let listed = next(&mut watch).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, session.id);

        storage
            .update_session_title(&session.id, "Weekend plans")
            .await
            .unwrap();
        let renamed = next(&mut watch).await;
        assert_eq!(renamed[0].title, "Weekend plans");
    }

    #[tokio::test]
    async fn watch_messages_is_scoped_to_one_session() {
        let (storage, _dir) = ready_storage().await;
        let a = ChatSession::new("New Conversation");
        let b = ChatSession::new("New Conversation");
        storage.upsert_session(&a).await.unwrap();
        storage.upsert_session(&b).await.unwrap();

        let mut watch = storage.watch_messages(&a.id);
        assert!(next(&mut watch).await.is_empty());

        storage
            .upsert_message(&ChatMessage::user(&b.id, "elsewhere"))
            .await
            .unwrap();
        storage
            .upsert_message(&ChatMessage::user(&a.id, "hello"))
            .await
            .unwrap();

        // Each message write re-queries; only session a's rows appear.
        let mut latest = next(&mut watch).await;
        if latest.is_empty() {
            latest = next(&mut watch).await;
        }
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].text, "hello");
    }

    #[tokio::test]
    async fn message_write_reorders_session_list() {
        let (storage, _dir) = ready_storage().await;
        let mut older = ChatSession::new("New Conversation");
        older.last_modified = 1;
        let mut newer = ChatSession::new("New Conversation");
        newer.last_modified = 2;
        storage.upsert_session(&older).await.unwrap();
        storage.upsert_session(&newer).await.unwrap();

        storage
            .upsert_message(&ChatMessage::user(&older.id, "bump"))
            .await
            .unwrap();
        let sessions = storage.list_sessions().await.unwrap();
        assert_eq!(sessions[0].id, older.id);
    }

    #[tokio::test]
    async fn prune_reports_removed_count() {
        let (storage, _dir) = ready_storage().await;
        let kept = ChatSession::new("New Conversation");
        storage.upsert_session(&kept).await.unwrap();
        storage
            .upsert_session(&ChatSession::new("New Conversation"))
            .await
            .unwrap();
        storage
            .upsert_message(&ChatMessage::user(&kept.id, "hi"))
            .await
            .unwrap();

        assert_eq!(storage.delete_empty_sessions().await.unwrap(), 1);
        assert_eq!(storage.delete_empty_sessions().await.unwrap(), 0);
        let remaining = storage.list_sessions().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept.id);
    }
}
