// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed memory store with embeddings kept as f32 BLOBs.

use std::str::FromStr;

use async_trait::async_trait;
use recall_core::RecallError;
use recall_storage::{Database, map_tr_err};
use rusqlite::{OptionalExtension, params};

use crate::types::{MemoryContent, MemoryRecord, MemoryType, blob_to_vec, vec_to_blob};

const COLUMNS: &str = "id, memory_type, metadata_json, created_at, tags, is_favorite, embedding";

/// A record that has an embedding, as read by the retrieval scan.
#[derive(Debug, Clone)]
pub struct EmbeddedRecord {
    pub id: i64,
    pub memory_type: MemoryType,
    pub metadata_json: String,
    pub embedding: Vec<f32>,
}

/// Read side used by retrieval.
#[async_trait]
pub trait MemoryQuery: Send + Sync {
    /// Every record with a stored embedding.
    async fn embedded_records(&self) -> Result<Vec<EmbeddedRecord>, RecallError>;
}

/// A memory to be inserted.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: MemoryContent,
    pub created_at: i64,
    pub tags: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

impl NewMemory {
    pub fn new(content: MemoryContent) -> Self {
        Self {
            content,
            created_at: recall_core::types::now_millis(),
            tags: None,
            embedding: None,
        }
    }
}

fn parse_type(raw: String) -> rusqlite::Result<MemoryType> {
    MemoryType::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let embedding: Option<Vec<u8>> = row.get(6)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        memory_type: parse_type(row.get(1)?)?,
        metadata_json: row.get(2)?,
        created_at: row.get(3)?,
        tags: row.get(4)?,
        is_favorite: row.get::<_, i64>(5)? != 0,
        embedding: embedding.map(|b| blob_to_vec(&b)),
    })
}

/// Persistent store for memories, sharing the chat database.
#[derive(Clone)]
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a memory and return its row id.
    pub async fn insert(&self, memory: NewMemory) -> Result<i64, RecallError> {
        let memory_type = memory.content.memory_type().to_string();
        let metadata = memory
            .content
            .to_metadata_json()
            .map_err(|e| RecallError::Internal(format!("serializing memory metadata: {e}")))?;
        let blob = memory.embedding.as_deref().map(vec_to_blob);
        self.db
            .connection()
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.execute(
                    "INSERT INTO memories (memory_type, metadata_json, created_at, tags, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![memory_type, metadata, memory.created_at, memory.tags, blob],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn get(&self, id: i64) -> Result<Option<MemoryRecord>, RecallError> {
        self.db
            .connection()
            .call(move |conn| -> Result<_, rusqlite::Error> {
                conn.query_row(
                    &format!("SELECT {COLUMNS} FROM memories WHERE id = ?1"),
                    params![id],
                    row_to_record,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    /// All memories, newest first, optionally restricted to one type.
    pub async fn list(&self, memory_type: Option<MemoryType>) -> Result<Vec<MemoryRecord>, RecallError> {
        let filter = memory_type.map(|t| t.to_string());
        self.db
            .connection()
            .call(move |conn| -> Result<_, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM memories
                     WHERE ?1 IS NULL OR memory_type = ?1
                     ORDER BY created_at DESC, id DESC"
                ))?;
                let rows = stmt
                    .query_map(params![filter], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Returns true if a row was removed.
    pub async fn delete(&self, id: i64) -> Result<bool, RecallError> {
        self.db
            .connection()
            .call(move |conn| -> Result<_, rusqlite::Error> {
                Ok(conn.execute("DELETE FROM memories WHERE id = ?1", params![id])? > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn set_favorite(&self, id: i64, favorite: bool) -> Result<(), RecallError> {
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE memories SET is_favorite = ?1 WHERE id = ?2",
                    params![favorite as i64, id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    pub async fn set_embedding(&self, id: i64, embedding: &[f32]) -> Result<(), RecallError> {
        let blob = vec_to_blob(embedding);
        let updated = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "UPDATE memories SET embedding = ?1 WHERE id = ?2",
                    params![blob, id],
                )
            })
            .await
            .map_err(map_tr_err)?;
        if updated == 0 {
            return Err(RecallError::NotFound(format!("memory {id}")));
        }
        Ok(())
    }

    /// Records still waiting for an embedding, oldest first.
    pub async fn records_without_embedding(&self) -> Result<Vec<MemoryRecord>, RecallError> {
        self.db
            .connection()
            .call(|conn| -> Result<_, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM memories WHERE embedding IS NULL ORDER BY id ASC"
                ))?;
                let rows = stmt
                    .query_map([], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl MemoryQuery for MemoryStore {
    async fn embedded_records(&self) -> Result<Vec<EmbeddedRecord>, RecallError> {
        self.db
            .connection()
            .call(|conn| -> Result<_, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, memory_type, metadata_json, embedding FROM memories
                     WHERE embedding IS NOT NULL",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        let blob: Vec<u8> = row.get(3)?;
                        Ok(EmbeddedRecord {
                            id: row.get(0)?,
                            memory_type: parse_type(row.get(1)?)?,
                            metadata_json: row.get(2)?,
                            embedding: blob_to_vec(&blob),
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> MemoryStore {
        MemoryStore::new(Database::open_in_memory().await.unwrap())
    }

    fn text(content: &str) -> MemoryContent {
        MemoryContent::Text {
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn insert_get_and_delete() {
        let store = store().await;
        let mut memory = NewMemory::new(text("Paris is beautiful"));
        memory.tags = Some("travel".into());
        let id = store.insert(memory).await.unwrap();

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.memory_type, MemoryType::Text);
        assert_eq!(record.tags.as_deref(), Some("travel"));
        assert!(!record.is_favorite);
        assert_eq!(record.embedding, None);
        assert_eq!(record.content().unwrap(), text("Paris is beautiful"));

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_type_newest_first() {
        let store = store().await;
        let mut older = NewMemory::new(text("first"));
        older.created_at = 10;
        let mut newer = NewMemory::new(text("second"));
        newer.created_at = 20;
        let mut image = NewMemory::new(MemoryContent::Image {
            file_path: "/p.jpg".into(),
            caption: None,
        });
        image.created_at = 30;
        for m in [older, newer, image] {
            store.insert(m).await.unwrap();
        }

        let all = store.list(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].memory_type, MemoryType::Image);

        let texts = store.list(Some(MemoryType::Text)).await.unwrap();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0].created_at, 20);
    }

    #[tokio::test]
    async fn embeddings_move_between_scans() {
        let store = store().await;
        let mut with = NewMemory::new(text("has vector"));
        with.embedding = Some(vec![0.5, -0.25]);
        let with_id = store.insert(with).await.unwrap();
        let without_id = store.insert(NewMemory::new(text("pending"))).await.unwrap();

        let embedded = store.embedded_records().await.unwrap();
        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0].id, with_id);
        assert_eq!(embedded[0].embedding, vec![0.5, -0.25]);

        let pending = store.records_without_embedding().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, without_id);

        store.set_embedding(without_id, &[1.0, 0.0]).await.unwrap();
        assert!(store.records_without_embedding().await.unwrap().is_empty());
        assert_eq!(store.embedded_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn set_embedding_on_missing_row_is_not_found() {
        let store = store().await;
        let err = store.set_embedding(99, &[1.0]).await.unwrap_err();
        assert!(matches!(err, RecallError::NotFound(_)));
    }

    #[tokio::test]
    async fn favorites_toggle() {
        let store = store().await;
        let id = store.insert(NewMemory::new(text("keep"))).await.unwrap();
        store.set_favorite(id, true).await.unwrap();
        assert!(store.get(id).await.unwrap().unwrap().is_favorite);
    }
}
