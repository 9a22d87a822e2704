// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Brute-force cosine retrieval over stored memory embeddings.

use std::cmp::Ordering;
use std::sync::Arc;

use recall_core::{EmbeddingAdapter, RecallError};
use tracing::{debug, warn};

use crate::store::{EmbeddedRecord, MemoryQuery};
use crate::types::{MemoryContent, RetrievalMatch, cosine_similarity};

/// Finds memories semantically close to a query.
///
/// Every call scans all embedded records. There is no persistent index.
pub struct RetrievalIndex {
    records: Arc<dyn MemoryQuery>,
    embedder: Arc<dyn EmbeddingAdapter>,
}

impl RetrievalIndex {
    pub fn new(records: Arc<dyn MemoryQuery>, embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self { records, embedder }
    }

    /// Up to `limit` matches scoring at least `threshold`, most similar first.
    ///
    /// Failures degrade to an empty result and are logged.
    pub async fn find_relevant(&self, query: &str, limit: usize, threshold: f32) -> Vec<RetrievalMatch> {
        match self.search(query, limit, threshold).await {
            Ok(matches) => {
                debug!(count = matches.len(), "retrieval complete");
                matches
            }
            Err(e) => {
                let degraded = RecallError::RetrievalDegraded(e.to_string());
                warn!(error = %degraded, "memory retrieval skipped");
                Vec::new()
            }
        }
    }

    async fn search(&self, query: &str, limit: usize, threshold: f32) -> Result<Vec<RetrievalMatch>, RecallError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(query).await?;
        let records = self.records.embedded_records().await?;
        Ok(rank(&query_vec, records, limit, threshold))
    }
}

fn rank(query: &[f32], records: Vec<EmbeddedRecord>, limit: usize, threshold: f32) -> Vec<RetrievalMatch> {
    let mut matches: Vec<RetrievalMatch> = records
        .into_iter()
        .filter_map(|record| {
            if record.embedding.len() != query.len() {
                return None;
            }
            let score = cosine_similarity(query, &record.embedding);
            (score >= threshold).then(|| RetrievalMatch {
                record_id: record.id,
                text: match_text(&record),
                score,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    matches.truncate(limit);
    matches
}

/// Extracted text when the metadata parses, the raw JSON otherwise.
fn match_text(record: &EmbeddedRecord) -> String {
    MemoryContent::from_metadata(record.memory_type, &record.metadata_json)
        .ok()
        .and_then(|c| c.extracted_text().map(str::to_string))
        .unwrap_or_else(|| record.metadata_json.clone())
}
