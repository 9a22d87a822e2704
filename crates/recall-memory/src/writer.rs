// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory writes with best-effort embedding.

use std::sync::Arc;

use recall_core::{EmbeddingAdapter, RecallError};
use tracing::{info, warn};

use crate::store::{MemoryStore, NewMemory};
use crate::types::{MemoryContent, MemoryRecord};

pub struct MemoryWriter {
    store: MemoryStore,
    embedder: Arc<dyn EmbeddingAdapter>,
}

impl MemoryWriter {
    pub fn new(store: MemoryStore, embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self { store, embedder }
    }

    /// Store `content`, embedding its text when possible.
    ///
    /// An embedding failure is logged and the record is kept without a
    /// vector, to be filled by [`backfill_missing_embeddings`](Self::backfill_missing_embeddings).
    pub async fn remember(&self, content: MemoryContent) -> Result<MemoryRecord, RecallError> {
        let mut memory = NewMemory::new(content);
        if let Some(text) = memory.content.extracted_text() {
            match self.embedder.embed_one(text).await {
                Ok(vector) => memory.embedding = Some(vector),
                Err(e) => warn!(error = %e, "storing memory without embedding"),
            }
        }
        let id = self.store.insert(memory).await?;
        info!(memory_id = id, "memory stored");
        self.store
            .get(id)
            .await?
            .ok_or_else(|| RecallError::NotFound(format!("memory {id}")))
    }

    /// Embed every record that has text but no vector. Returns how many were filled.
    ///
    /// Stops at the first embedding failure, leaving later rows for the next run.
    pub async fn backfill_missing_embeddings(&self) -> Result<usize, RecallError> {
        let mut filled = 0;
        for record in self.store.records_without_embedding().await? {
            let Ok(content) = record.content() else {
                continue;
            };
            let Some(text) = content.extracted_text() else {
                continue;
            };
            let vector = match self.embedder.embed_one(text).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(memory_id = record.id, error = %e, "embedding backfill interrupted");
                    break;
                }
            };
            self.store.set_embedding(record.id, &vector).await?;
            filled += 1;
        }
        if filled > 0 {
            info!(filled, "embedding backfill complete");
        }
        Ok(filled)
    }
}
