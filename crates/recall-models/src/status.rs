// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-model status derived from disk plus in-flight download state.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use recall_core::{ProgressFn, RecallError};

use crate::catalog::{ALL_MODELS, ModelDescriptor};
use crate::store::ArtifactStore;

/// What the user sees for one catalog model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    NotDownloaded,
    Downloading(f32),
    Downloaded { is_selected: bool },
    Error(String),
}

#[derive(Debug, Clone)]
enum Transient {
    Downloading(f32),
    Failed(String),
}

/// In-memory progress and error map. Never persisted.
#[derive(Default)]
pub struct ModelStatusTracker {
    transient: Mutex<HashMap<String, Transient>>,
}

impl ModelStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_map<R>(&self, f: impl FnOnce(&mut HashMap<String, Transient>) -> R) -> R {
        let mut map = self.transient.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut map)
    }

    pub fn set_progress(&self, id: &str, progress: f32) {
        self.with_map(|m| m.insert(id.to_string(), Transient::Downloading(progress)));
    }

    pub fn set_error(&self, id: &str, message: impl Into<String>) {
        self.with_map(|m| m.insert(id.to_string(), Transient::Failed(message.into())));
    }

    pub fn clear(&self, id: &str) {
        self.with_map(|m| m.remove(id));
    }

    /// Status of one model. An active download wins over disk state, and a
    /// complete install wins over a stale error.
    pub fn status(
        &self,
        store: &ArtifactStore,
        descriptor: &ModelDescriptor,
        selected_id: &str,
    ) -> ModelStatus {
        let transient = self.with_map(|m| m.get(descriptor.id).cloned());
        if let Some(Transient::Downloading(p)) = transient {
            return ModelStatus::Downloading(p);
        }
        if store.is_model_complete(descriptor.id) {
            return ModelStatus::Downloaded {
                is_selected: descriptor.id == selected_id,
            };
        }
        match transient {
            Some(Transient::Failed(message)) => ModelStatus::Error(message),
            _ => ModelStatus::NotDownloaded,
        }
    }

    /// Status of every catalog model, in catalog order.
    pub fn all(
        &self,
        store: &ArtifactStore,
        selected_id: &str,
    ) -> Vec<(&'static ModelDescriptor, ModelStatus)> {
        ALL_MODELS
            .iter()
            .map(|m| (m, self.status(store, m, selected_id)))
            .collect()
    }

    /// Run a download while mirroring its progress and outcome here.
    pub async fn track_download(
        &self,
        store: &ArtifactStore,
        id: &str,
        progress: ProgressFn<'_>,
    ) -> Result<(), RecallError> {
        self.set_progress(id, 0.0);
        let forward = |p: f32| {
            self.set_progress(id, p);
            progress(p);
        };
        match store.download(id, &forward).await {
            Ok(()) => {
                self.clear(id);
                Ok(())
            }
            Err(e) => {
                self.set_error(id, e.user_message());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::HttpDownloader;
    use crate::store::{CONFIG_FILE, LIBRARY_MARKER, WEIGHT_INDEX_FILE};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn store(root: &std::path::Path) -> ArtifactStore {
        ArtifactStore::new(
            root.to_path_buf(),
            None,
            Some("http://127.0.0.1:9".into()),
            Arc::new(HttpDownloader::new().unwrap()),
        )
    }

    #[test]
    fn derives_status_from_disk_and_map() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        let tracker = ModelStatusTracker::new();
        let lite = &ModelDescriptor::QWEN_0_5B_LITE;

        assert_eq!(tracker.status(&s, lite, lite.id), ModelStatus::NotDownloaded);

        tracker.set_progress(lite.id, 0.4);
        assert_eq!(tracker.status(&s, lite, lite.id), ModelStatus::Downloading(0.4));

        tracker.set_error(lite.id, "offline");
        assert_eq!(
            tracker.status(&s, lite, lite.id),
            ModelStatus::Error("offline".into())
        );

        let root = s.path_for(lite.id);
        std::fs::create_dir_all(&root).unwrap();
        for f in [CONFIG_FILE, WEIGHT_INDEX_FILE, "params_shard_0.bin", LIBRARY_MARKER] {
            std::fs::write(root.join(f), "x").unwrap();
        }
        assert_eq!(
            tracker.status(&s, lite, lite.id),
            ModelStatus::Downloaded { is_selected: true }
        );
        assert_eq!(
            tracker.status(&s, lite, "something-else"),
            ModelStatus::Downloaded { is_selected: false }
        );
    }

    #[tokio::test]
    async fn failed_download_is_recorded() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        let tracker = ModelStatusTracker::new();
        let id = ModelDescriptor::QWEN_0_5B_LITE.id;

        assert!(tracker.track_download(&s, id, &|_| {}).await.is_err());
        assert!(matches!(
            tracker.status(&s, &ModelDescriptor::QWEN_0_5B_LITE, id),
            ModelStatus::Error(_)
        ));
        assert_eq!(tracker.all(&s, id).len(), ALL_MODELS.len());
    }
}
