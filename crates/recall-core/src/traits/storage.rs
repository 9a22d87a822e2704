// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for conversation persistence.

use async_trait::async_trait;
use futures_core::stream::BoxStream;

use crate::error::RecallError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChatMessage, ChatSession};

/// Subscription over the ordered message list of one session.
pub type MessageStream = BoxStream<'static, Result<Vec<ChatMessage>, RecallError>>;

/// Subscription over the session list, most recent first.
pub type SessionStream = BoxStream<'static, Result<Vec<ChatSession>, RecallError>>;

/// Persistence for sessions and messages.
///
/// Subscriptions emit the current rows immediately and again after every
/// committed write to the underlying table.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), RecallError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), RecallError>;

    // --- Sessions ---

    /// All sessions ordered by `last_modified` descending.
    async fn list_sessions(&self) -> Result<Vec<ChatSession>, RecallError>;

    async fn get_session(&self, id: &str) -> Result<Option<ChatSession>, RecallError>;

    /// Insert or replace.
    async fn upsert_session(&self, session: &ChatSession) -> Result<(), RecallError>;

    /// Deletes a session and, by cascade, its messages.
    async fn delete_session(&self, id: &str) -> Result<(), RecallError>;

    async fn update_session_title(&self, id: &str, title: &str) -> Result<(), RecallError>;

    /// Removes sessions with no messages, returning how many were deleted.
    async fn delete_empty_sessions(&self) -> Result<usize, RecallError>;

    // --- Messages ---

    /// Insert or replace. Bumps the owning session's `last_modified`.
    async fn upsert_message(&self, message: &ChatMessage) -> Result<(), RecallError>;

    /// Messages of a session ordered by timestamp ascending.
    async fn messages_for_session(&self, session_id: &str)
    -> Result<Vec<ChatMessage>, RecallError>;

    // --- Subscriptions ---

    fn watch_sessions(&self) -> SessionStream;

    fn watch_messages(&self, session_id: &str) -> MessageStream;
}
