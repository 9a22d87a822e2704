// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory store, writer and retrieval over a real schema.

use std::sync::Arc;

use recall_memory::{
    MemoryContent, MemoryStore, MemoryType, MemoryWriter, NewMemory, RetrievalIndex, augment_prompt,
};
use recall_storage::Database;
use recall_test_utils::MockEmbedder;

const TOPICS: &[&[&str]] = &[&["paris", "france", "capital"], &["car", "parked", "level"]];

async fn setup() -> (MemoryStore, Arc<MockEmbedder>) {
    let db = Database::open_in_memory().await.unwrap();
    (MemoryStore::new(db), Arc::new(MockEmbedder::new(TOPICS)))
}

fn text(content: &str) -> MemoryContent {
    MemoryContent::Text {
        content: content.into(),
    }
}

#[tokio::test]
async fn capital_question_finds_only_the_paris_memory() {
    let (store, embedder) = setup().await;
    let writer = MemoryWriter::new(store.clone(), embedder.clone());
    let paris = writer.remember(text("Paris is beautiful")).await.unwrap();
    writer.remember(text("I parked the car on level 3")).await.unwrap();
    let index = RetrievalIndex::new(Arc::new(store), embedder);

    let matches = index.find_relevant("capital of France", 3, 0.5).await;

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].record_id, paris.id);
    assert_eq!(matches[0].text, "Paris is beautiful");
    assert!(matches[0].score >= 0.5);

    let prompt = augment_prompt("capital of France", &matches);
    assert!(prompt.contains("Paris is beautiful"));
    assert!(prompt.ends_with("capital of France"));
}

#[tokio::test]
async fn unembedded_records_are_invisible_until_backfilled() {
    let (store, embedder) = setup().await;
    let writer = MemoryWriter::new(store.clone(), embedder.clone());
    let index = RetrievalIndex::new(Arc::new(store.clone()), embedder.clone());

    embedder.set_failing(true);
    let record = writer.remember(text("The capital of France is Paris")).await.unwrap();
    assert!(record.embedding.is_none());
    embedder.set_failing(false);
    assert!(index.find_relevant("France", 3, 0.5).await.is_empty());

    assert_eq!(writer.backfill_missing_embeddings().await.unwrap(), 1);
    assert!(store.records_without_embedding().await.unwrap().is_empty());
    assert_eq!(index.find_relevant("France", 3, 0.5).await.len(), 1);
    assert_eq!(writer.backfill_missing_embeddings().await.unwrap(), 0);
}

#[tokio::test]
async fn embedder_outage_degrades_to_no_matches() {
    let (store, embedder) = setup().await;
    MemoryWriter::new(store.clone(), embedder.clone())
        .remember(text("Paris in spring"))
        .await
        .unwrap();
    let index = RetrievalIndex::new(Arc::new(store), embedder.clone());

    embedder.set_failing(true);
    assert!(index.find_relevant("Paris", 3, 0.0).await.is_empty());
}

#[tokio::test]
async fn media_without_text_is_stored_but_never_retrieved() {
    let (store, embedder) = setup().await;
    let writer = MemoryWriter::new(store.clone(), embedder.clone());
    let image = writer
        .remember(MemoryContent::Image {
            file_path: "/sdcard/DCIM/eiffel.jpg".into(),
            caption: None,
        })
        .await
        .unwrap();
    assert_eq!(image.memory_type, MemoryType::Image);
    assert!(image.embedding.is_none());
    assert_eq!(embedder.calls(), 0);

    let mut captioned = NewMemory::new(MemoryContent::Image {
        file_path: "/sdcard/DCIM/louvre.jpg".into(),
        caption: Some("The Louvre in Paris".into()),
    });
    captioned.embedding = Some(embedder.vector_for("The Louvre in Paris"));
    store.insert(captioned).await.unwrap();

    let index = RetrievalIndex::new(Arc::new(store.clone()), embedder);
    let matches = index.find_relevant("Paris", 5, 0.5).await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].text, "The Louvre in Paris");
    assert_eq!(store.list(Some(MemoryType::Image)).await.unwrap().len(), 2);
}
