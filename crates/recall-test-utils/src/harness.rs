// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end chat scenarios.
//!
//! `TestHarness` wires a real [`SessionOrchestrator`] to temp SQLite
//! storage, the [`MockEngine`], and retrieval over a [`MockEmbedder`].

use std::sync::Arc;
use std::time::Duration;

use recall_agent::{ChatState, OrchestratorSettings, SessionOrchestrator};
use recall_config::model::StorageConfig;
use recall_core::{RecallError, StorageAdapter};
use recall_engine::MockEngine;
use recall_memory::{MemoryContent, MemoryStore, MemoryWriter, RetrievalIndex};
use recall_storage::SqliteStorage;

use crate::mock_embedder::MockEmbedder;

/// Topics of the default embedder.
pub const DEFAULT_TOPICS: &[&[&str]] = &[
    &["paris", "france", "capital", "city"],
    &["car", "parked", "parking", "garage"],
    &["dog", "pet", "walk"],
];

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    replies: Vec<String>,
    stateless_replies: Vec<String>,
    memories: Vec<String>,
    settings: OrchestratorSettings,
    initialize: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            replies: Vec::new(),
            stateless_replies: Vec::new(),
            memories: Vec::new(),
            settings: OrchestratorSettings::default(),
            initialize: true,
        }
    }

    /// Queue chat replies for the mock engine.
    pub fn with_replies(mut self, replies: &[&str]) -> Self {
        self.replies = replies.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Queue stateless replies, used by title generation.
    pub fn with_title_replies(mut self, replies: &[&str]) -> Self {
        self.stateless_replies = replies.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Store text memories, embedded, before the orchestrator starts.
    pub fn with_memories(mut self, texts: &[&str]) -> Self {
        self.memories = texts.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Leave the engine uninitialized after build.
    pub fn without_engine_init(mut self) -> Self {
        self.initialize = false;
        self
    }

    pub async fn build(self) -> Result<TestHarness, RecallError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| RecallError::io("creating temp dir", e))?;
        let storage = SqliteStorage::new(StorageConfig {
            database_path: temp_dir.path().join("recall.db").to_string_lossy().into_owned(),
            wal_mode: true,
        });
        storage.initialize().await?;
        let storage = Arc::new(storage);

        let engine = Arc::new(MockEngine::new("mock"));
        for reply in self.replies {
            engine.push_response(reply);
        }
        for reply in self.stateless_replies {
            engine.push_stateless_response(reply);
        }

        let embedder = Arc::new(MockEmbedder::new(DEFAULT_TOPICS));
        let memories = MemoryStore::new(storage.database()?.clone());
        let writer = MemoryWriter::new(memories.clone(), embedder.clone());
        for text in self.memories {
            writer.remember(MemoryContent::Text { content: text }).await?;
        }
        let retrieval = Arc::new(RetrievalIndex::new(
            Arc::new(memories.clone()),
            embedder.clone(),
        ));

        let orchestrator = SessionOrchestrator::new(
            storage.clone(),
            engine.clone(),
            Some(retrieval),
            self.settings,
        );
        if self.initialize {
            orchestrator.initialize_engine().await?;
        }

        Ok(TestHarness {
            engine,
            storage,
            memories,
            writer,
            embedder,
            orchestrator,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete chat stack over temp storage and mock adapters.
pub struct TestHarness {
    pub engine: Arc<MockEngine>,
    pub storage: Arc<SqliteStorage>,
    pub memories: MemoryStore,
    pub writer: MemoryWriter,
    pub embedder: Arc<MockEmbedder>,
    pub orchestrator: SessionOrchestrator,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Send `text`, wait for background work, and return the reply.
    pub async fn chat(&self, text: &str) -> Result<Option<String>, RecallError> {
        let reply = self.orchestrator.send_message(text).await?;
        self.orchestrator.wait_background().await;
        Ok(reply)
    }

    /// Wait up to five seconds for the chat state to satisfy `check`.
    pub async fn wait_for(&self, check: impl FnMut(&ChatState) -> bool) -> bool {
        let mut rx = self.orchestrator.subscribe();
        matches!(
            tokio::time::timeout(Duration::from_secs(5), rx.wait_for(check)).await,
            Ok(Ok(_))
        )
    }

    /// Title of the current session as stored.
    pub async fn current_title(&self) -> Result<Option<String>, RecallError> {
        let Some(id) = self.orchestrator.current_session_id() else {
            return Ok(None);
        };
        Ok(self.storage.get_session(&id).await?.map(|s| s.title))
    }
}
