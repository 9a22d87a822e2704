// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic topic embedder for retrieval tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use recall_core::types::{EmbeddingInput, EmbeddingOutput};
use recall_core::{AdapterType, EmbeddingAdapter, HealthStatus, PluginAdapter, RecallError};

/// Embeds text onto one axis per topic.
///
/// Each topic is a list of lowercase keywords. A text's vector counts the
/// keyword hits per topic, with a final "other" axis set when nothing hits,
/// and is L2-normalized. Texts on different topics are orthogonal.
pub struct MockEmbedder {
    topics: Vec<Vec<String>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(topics: &[&[&str]]) -> Self {
        Self {
            topics: topics
                .iter()
                .map(|words| words.iter().map(|w| w.to_lowercase()).collect())
                .collect(),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Vector length produced by this embedder.
    pub fn dimensions(&self) -> usize {
        self.topics.len() + 1
    }

    /// Make every following `embed` call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `embed` calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The vector this embedder assigns to `text`.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let mut vector: Vec<f32> = self
            .topics
            .iter()
            .map(|topic| words.iter().filter(|w| topic.contains(w)).count() as f32)
            .collect();
        let other = if vector.iter().all(|v| *v == 0.0) { 1.0 } else { 0.0 };
        vector.push(other);

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        vector.iter_mut().for_each(|v| *v /= norm);
        vector
    }
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RecallError::Internal("mock embedder offline".into()));
        }
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| self.vector_for(t)).collect(),
            dimensions: self.dimensions(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_orthogonal() {
        let embedder = MockEmbedder::new(&[&["paris", "france"], &["car", "parked"]]);
        assert_eq!(embedder.vector_for("Paris, France!"), vec![1.0, 0.0, 0.0]);
        assert_eq!(embedder.vector_for("I parked the car"), vec![0.0, 1.0, 0.0]);
        assert_eq!(embedder.vector_for("nothing here"), vec![0.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn failure_toggle() {
        let embedder = MockEmbedder::new(&[&["a"]]);
        embedder.set_failing(true);
        assert!(embedder.embed_one("a").await.is_err());
        embedder.set_failing(false);
        assert_eq!(embedder.embed_one("a").await.unwrap().len(), 2);
        assert_eq!(embedder.calls(), 2);
    }
}
