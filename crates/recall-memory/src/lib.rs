// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term memory for the Recall assistant.
//!
//! Captured notes are stored next to the chat history, embedded locally
//! with all-MiniLM-L6-v2, and retrieved by cosine similarity to augment
//! prompts before generation.

pub mod context;
pub mod embedder;
pub mod model_manager;
pub mod provider;
pub mod retriever;
pub mod store;
pub mod types;
pub mod writer;

pub use context::augment_prompt;
pub use embedder::{EMBEDDING_DIM, OnnxEmbedder};
pub use model_manager::EmbeddingModelManager;
pub use provider::EmbeddingProvider;
pub use retriever::RetrievalIndex;
pub use store::{EmbeddedRecord, MemoryQuery, MemoryStore, NewMemory};
pub use types::{MemoryContent, MemoryRecord, MemoryType, RetrievalMatch};
pub use writer::MemoryWriter;
