// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk model artifacts: root resolution, completeness, two-stage download.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use recall_config::model::ModelsConfig;
use recall_core::{ProgressFn, RecallError};
use tracing::{debug, info, warn};

use crate::archive::{self, ArchiveError};
use crate::catalog::{self, ModelDescriptor};
use crate::download::Downloader;

/// JSON config descriptor at the model root.
pub const CONFIG_FILE: &str = "model-config.json";
/// JSON weight index at the model root.
pub const WEIGHT_INDEX_FILE: &str = "weights-index.json";
pub const SHARD_PREFIX: &str = "params_shard_";
pub const SHARD_SUFFIX: &str = ".bin";
/// Written once the backend library has been installed.
pub const LIBRARY_MARKER: &str = ".lib-installed";
/// Directory, relative to the model root, holding installed libraries.
pub const LIBRARY_DIR: &str = "lib";

/// Upper bound of the weights stage's progress slice.
const WEIGHTS_END: f32 = 0.8;
/// Share of a stage's slice given to the transfer. The rest covers extraction.
const TRANSFER_SHARE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Weights,
    Library,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Weights => "weights",
            Stage::Library => "library",
        }
    }

    fn slice(self) -> (f32, f32) {
        match self {
            Stage::Weights => (0.0, WEIGHTS_END),
            Stage::Library => (WEIGHTS_END, 1.0),
        }
    }
}

/// Forwards only increasing progress values.
struct MonotonicProgress<'a> {
    sink: ProgressFn<'a>,
    high: Mutex<f32>,
}

impl<'a> MonotonicProgress<'a> {
    fn new(sink: ProgressFn<'a>) -> Self {
        Self {
            sink,
            high: Mutex::new(f32::NEG_INFINITY),
        }
    }

    fn report(&self, value: f32) {
        let value = value.clamp(0.0, 1.0);
        let mut high = self.high.lock().unwrap_or_else(PoisonError::into_inner);
        if value > *high {
            *high = value;
            (self.sink)(value);
        }
    }
}

/// Model artifact storage.
///
/// Models live under `<internal>/<id>` unless `<external>/<id>` already holds
/// a config file, in which case the sideloaded copy wins.
pub struct ArtifactStore {
    internal_root: PathBuf,
    external_root: Option<PathBuf>,
    base_url: Option<String>,
    downloader: Arc<dyn Downloader>,
    sideloaded: RwLock<HashSet<String>>,
}

impl ArtifactStore {
    pub fn new(
        internal_root: PathBuf,
        external_root: Option<PathBuf>,
        base_url: Option<String>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let store = Self {
            internal_root,
            external_root,
            base_url,
            downloader,
            sideloaded: RwLock::new(HashSet::new()),
        };
        store.rescan_external();
        store
    }

    /// Store rooted at `<data_dir>/models`.
    pub fn from_config(config: &ModelsConfig, downloader: Arc<dyn Downloader>) -> Self {
        Self::new(
            config.data_dir_path().join("models"),
            config.external_dir.as_ref().map(PathBuf::from),
            config.base_url.clone(),
            downloader,
        )
    }

    pub fn internal_root(&self) -> &Path {
        &self.internal_root
    }

    pub fn external_root(&self) -> Option<&Path> {
        self.external_root.as_deref()
    }

    /// Re-read which ids are sideloaded under the external root.
    pub fn rescan_external(&self) -> usize {
        let mut found = HashSet::new();
        if let Some(external) = &self.external_root
            && let Ok(entries) = std::fs::read_dir(external)
        {
            for entry in entries.flatten() {
                if entry.path().join(CONFIG_FILE).is_file()
                    && let Some(name) = entry.file_name().to_str()
                {
                    found.insert(name.to_string());
                }
            }
        }
        let count = found.len();
        if count > 0 {
            debug!(count, "sideloaded models found");
        }
        *self.sideloaded.write().unwrap_or_else(PoisonError::into_inner) = found;
        count
    }

    fn refresh(&self, id: &str) {
        let Some(external) = &self.external_root else {
            return;
        };
        let present = external.join(id).join(CONFIG_FILE).is_file();
        let mut set = self.sideloaded.write().unwrap_or_else(PoisonError::into_inner);
        if present {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
    }

    /// Resolved root for `id`. Pure: never touches the filesystem.
    pub fn path_for(&self, id: &str) -> PathBuf {
        let sideloaded = self
            .sideloaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id);
        match (&self.external_root, sideloaded) {
            (Some(external), true) => external.join(id),
            _ => self.internal_root.join(id),
        }
    }

    /// Config, index, at least one shard, and the library marker all present.
    pub fn is_model_complete(&self, id: &str) -> bool {
        if !is_plain_id(id) {
            return false;
        }
        self.refresh(id);
        let root = self.path_for(id);
        weights_present(&root) && library_present(&root)
    }

    /// Locate a single-file bundle in the model root by extension.
    pub fn find_bundle(&self, id: &str, extensions: &[&str]) -> Option<PathBuf> {
        if !is_plain_id(id) {
            return None;
        }
        self.refresh(id);
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(self.path_for(id))
            .ok()?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    /// Remove the model root. An absent root is not an error.
    pub async fn delete_model(&self, id: &str) -> Result<(), RecallError> {
        if !is_plain_id(id) {
            return Err(RecallError::NotFound(format!("invalid model id: {id}")));
        }
        self.refresh(id);
        let root = self.path_for(id);
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => info!(model_id = %id, path = %root.display(), "model deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RecallError::io(format!("deleting {}", root.display()), e)),
        }
        self.refresh(id);
        Ok(())
    }

    /// Fetch and install both artifact stages for a catalog model.
    ///
    /// Stages already satisfied on disk are skipped. Progress is monotonic
    /// and ends at 1.0 on success.
    pub async fn download(&self, id: &str, progress: ProgressFn<'_>) -> Result<(), RecallError> {
        let descriptor =
            catalog::find(id).ok_or_else(|| RecallError::NotFound(format!("model {id}")))?;
        self.refresh(id);
        let root = self.path_for(id);
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| RecallError::io(format!("creating {}", root.display()), e))?;

        let reporter = MonotonicProgress::new(progress);
        reporter.report(0.0);

        if weights_present(&root) {
            debug!(model_id = %id, "weights already installed");
            reporter.report(WEIGHTS_END);
        } else {
            let url = descriptor.weights_url(self.base_url.as_deref());
            self.run_stage(descriptor, Stage::Weights, &url, &root, &reporter)
                .await?;
        }

        if library_present(&root) {
            debug!(model_id = %id, "library already installed");
        } else {
            let url = descriptor.library_url(self.base_url.as_deref());
            self.run_stage(descriptor, Stage::Library, &url, &root, &reporter)
                .await?;
        }

        reporter.report(1.0);
        info!(model_id = %id, path = %root.display(), "model ready");
        Ok(())
    }

    async fn run_stage(
        &self,
        descriptor: &ModelDescriptor,
        stage: Stage,
        url: &str,
        root: &Path,
        reporter: &MonotonicProgress<'_>,
    ) -> Result<(), RecallError> {
        let archive_path = root.join(format!(".{}.download", stage.name()));
        let staging = root.join(format!(".staging-{}", stage.name()));
        let result = self
            .stage_inner(descriptor, stage, url, root, &archive_path, &staging, reporter)
            .await;
        if let Err(e) = &result {
            warn!(model_id = %descriptor.id, stage = stage.name(), error = %e, "stage failed");
            let _ = tokio::fs::remove_file(&archive_path).await;
            let _ = tokio::fs::remove_dir_all(&staging).await;
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn stage_inner(
        &self,
        descriptor: &ModelDescriptor,
        stage: Stage,
        url: &str,
        root: &Path,
        archive_path: &Path,
        staging: &Path,
        reporter: &MonotonicProgress<'_>,
    ) -> Result<(), RecallError> {
        let (start, end) = stage.slice();
        let width = end - start;
        let on_bytes = |p: f32| reporter.report(start + p.clamp(0.0, 1.0) * width * TRANSFER_SHARE);

        info!(model_id = %descriptor.id, stage = stage.name(), url, "downloading");
        self.downloader
            .fetch_to_file(url, archive_path, &on_bytes)
            .await?;

        let model_id = descriptor.id;
        let archive_path = archive_path.to_path_buf();
        let staging = staging.to_path_buf();
        let destination = match stage {
            Stage::Weights => root.to_path_buf(),
            Stage::Library => root.join(LIBRARY_DIR).join(descriptor.model_lib),
        };
        let root_owned = root.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(), ArchiveError> {
            if staging.exists() {
                std::fs::remove_dir_all(&staging)?;
            }
            let files = archive::extract(&archive_path, &staging)?;
            debug!(files, staging = %staging.display(), "archive extracted");
            if stage == Stage::Weights {
                archive::flatten_single_root(&staging, CONFIG_FILE)?;
            }
            archive::merge_into(&staging, &destination)?;
            std::fs::remove_dir_all(&staging)?;
            std::fs::remove_file(&archive_path)?;
            if stage == Stage::Library {
                std::fs::write(root_owned.join(LIBRARY_MARKER), model_id)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| RecallError::Internal(format!("extraction task failed: {e}")))?
        .map_err(|e| RecallError::Integrity {
            model_id: model_id.to_string(),
            message: e.to_string(),
        })?;

        if stage == Stage::Weights && !weights_present(root) {
            return Err(RecallError::Integrity {
                model_id: model_id.to_string(),
                message: format!(
                    "weights archive did not contain {CONFIG_FILE}, {WEIGHT_INDEX_FILE} and a shard"
                ),
            });
        }
        reporter.report(end);
        Ok(())
    }
}

/// Model ids are single path components.
fn is_plain_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

fn weights_present(root: &Path) -> bool {
    root.join(CONFIG_FILE).is_file() && root.join(WEIGHT_INDEX_FILE).is_file() && has_shard(root)
}

fn library_present(root: &Path) -> bool {
    root.join(LIBRARY_MARKER).is_file()
}

fn has_shard(root: &Path) -> bool {
    std::fs::read_dir(root)
        .map(|entries| {
            entries.flatten().any(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|n| n.starts_with(SHARD_PREFIX) && n.ends_with(SHARD_SUFFIX))
            })
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct NoNetwork;

    #[async_trait]
    impl Downloader for NoNetwork {
        async fn fetch_to_file(
            &self,
            url: &str,
            _target: &Path,
            _progress: ProgressFn<'_>,
        ) -> Result<u64, RecallError> {
            panic!("unexpected fetch of {url}");
        }

        async fn fetch_string(&self, url: &str) -> Result<String, RecallError> {
            panic!("unexpected fetch of {url}");
        }
    }

    fn store(internal: &Path, external: Option<&Path>) -> ArtifactStore {
        ArtifactStore::new(
            internal.to_path_buf(),
            external.map(Path::to_path_buf),
            None,
            Arc::new(NoNetwork),
        )
    }

    const FILES: [&str; 4] = [CONFIG_FILE, WEIGHT_INDEX_FILE, "params_shard_0.bin", LIBRARY_MARKER];

    fn populate(root: &Path, files: &[&str]) {
        std::fs::create_dir_all(root).unwrap();
        for f in files {
            std::fs::write(root.join(f), "x").unwrap();
        }
    }

    #[test]
    fn completeness_requires_every_artifact() {
        let id = "qwen2.5-0.5b-instruct-q4f16";
        for mask in 0u8..16 {
            let dir = tempdir().unwrap();
            let s = store(dir.path(), None);
            let present: Vec<&str> = FILES
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, f)| *f)
                .collect();
            populate(&s.path_for(id), &present);
            assert_eq!(s.is_model_complete(id), mask == 0b1111, "mask {mask:04b}");
        }
    }

    #[test]
    fn sideloaded_models_resolve_to_external_root() {
        let internal = tempdir().unwrap();
        let external = tempdir().unwrap();
        populate(&external.path().join("side-model"), &[CONFIG_FILE]);

        let s = store(internal.path(), Some(external.path()));
        assert_eq!(s.path_for("side-model"), external.path().join("side-model"));
        assert_eq!(s.path_for("other"), internal.path().join("other"));

        populate(&external.path().join("late"), &[CONFIG_FILE]);
        assert_eq!(s.path_for("late"), internal.path().join("late"));
        assert_eq!(s.rescan_external(), 2);
        assert_eq!(s.path_for("late"), external.path().join("late"));
    }

    #[test]
    fn path_for_does_not_create_directories() {
        let dir = tempdir().unwrap();
        let s = store(&dir.path().join("models"), None);
        let _ = s.path_for("qwen2.5-0.5b-instruct-q4f16");
        assert!(!dir.path().join("models").exists());
    }

    #[tokio::test]
    async fn unknown_model_is_not_found_and_disk_untouched() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("models");
        let s = store(&root, None);
        let err = s.download("no-such-model", &|_| {}).await.unwrap_err();
        assert!(matches!(err, RecallError::NotFound(_)));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn complete_model_download_is_a_no_op() {
        let dir = tempdir().unwrap();
        let id = "qwen2.5-0.5b-instruct-q4f16";
        let s = store(dir.path(), None);
        populate(&s.path_for(id), &FILES);

        let seen = Mutex::new(Vec::new());
        s.download(id, &|p| seen.lock().unwrap().push(p)).await.unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let id = "qwen2.5-0.5b-instruct-q4f16";
        let s = store(dir.path(), None);
        populate(&s.path_for(id), &FILES);

        s.delete_model(id).await.unwrap();
        assert!(!s.path_for(id).exists());
        s.delete_model(id).await.unwrap();
        assert!(s.delete_model("../escape").await.is_err());
    }

    #[test]
    fn find_bundle_matches_extension() {
        let dir = tempdir().unwrap();
        let s = store(dir.path(), None);
        populate(&s.path_for("bundle"), &["notes.txt", "qwen.task"]);
        let found = s.find_bundle("bundle", &["onnx", "task", "bin"]).unwrap();
        assert_eq!(found.file_name().unwrap(), "qwen.task");
        assert!(s.find_bundle("bundle", &["onnx"]).is_none());
        assert!(s.find_bundle("missing", &["onnx"]).is_none());
    }
}
