// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ONNX Runtime backend with greedy decoding over a ChatML token context.
//!
//! Only the CPU execution provider is compiled in. GPU backends fail
//! construction so the engine falls through to CPU.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use serde::Deserialize;
use tracing::{debug, info};

use recall_core::{Backend, RecallError};
use recall_models::store::{CONFIG_FILE, LIBRARY_DIR};

use crate::runtime::{
    BackendHandle, BundleLoader, ChatContext, LoadedModel, RuntimeFactory, TokenSink,
};

/// Fields read from `model-config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct OnnxModelConfig {
    /// Graph file relative to the model root.
    #[serde(default = "default_graph")]
    pub graph: String,
    /// Tokenizer file relative to the model root. Defaults to the library dir.
    #[serde(default)]
    pub tokenizer: Option<String>,
    #[serde(default)]
    pub eos_token_ids: Vec<u32>,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default)]
    pub uses_position_ids: bool,
}

fn default_graph() -> String {
    "model.onnx".to_string()
}

fn default_context_window() -> usize {
    4096
}

impl Default for OnnxModelConfig {
    fn default() -> Self {
        Self {
            graph: default_graph(),
            tokenizer: None,
            eos_token_ids: Vec::new(),
            context_window: default_context_window(),
            uses_position_ids: false,
        }
    }
}

impl OnnxModelConfig {
    pub fn read(path: &Path) -> Result<Self, RecallError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RecallError::io(format!("reading {}", path.display()), e))?;
        serde_json::from_str(&raw).map_err(|e| RecallError::BackendLoad {
            message: format!("invalid {}: {e}", path.display()),
            source: Some(Box::new(e)),
        })
    }

    fn tokenizer_path(&self, root: &Path, model_lib: &str) -> PathBuf {
        match &self.tokenizer {
            Some(rel) => root.join(rel),
            None => root.join(LIBRARY_DIR).join(model_lib).join("tokenizer.json"),
        }
    }
}

fn load_error(message: String) -> RecallError {
    RecallError::BackendLoad {
        message,
        source: None,
    }
}

/// Runtime factory and bundle loader backed by ONNX Runtime.
#[derive(Debug, Clone)]
pub struct OnnxRuntime {
    intra_threads: usize,
}

impl OnnxRuntime {
    pub fn new(intra_threads: usize) -> Self {
        Self {
            intra_threads: intra_threads.max(1),
        }
    }
}

impl RuntimeFactory for OnnxRuntime {
    fn construct(&self, backend: Backend) -> Result<Arc<dyn BackendHandle>, RecallError> {
        match backend {
            Backend::Cpu => Ok(Arc::new(OnnxBackend {
                intra_threads: self.intra_threads,
            })),
            other => Err(RecallError::BackendConstruction {
                backend: other.to_string(),
                message: format!("no {other} execution provider in this build"),
            }),
        }
    }
}

impl BundleLoader for OnnxRuntime {
    fn load_bundle(&self, path: &Path) -> Result<Arc<dyn LoadedModel>, RecallError> {
        let dir = path.parent().unwrap_or(Path::new("."));
        let config_path = dir.join(CONFIG_FILE);
        let config = if config_path.is_file() {
            OnnxModelConfig::read(&config_path)?
        } else {
            OnnxModelConfig::default()
        };
        let tokenizer_path = match &config.tokenizer {
            Some(rel) => dir.join(rel),
            None => dir.join("tokenizer.json"),
        };
        let model = OnnxModel::open(path, &tokenizer_path, &config, self.intra_threads)?;
        Ok(Arc::new(model))
    }
}

struct OnnxBackend {
    intra_threads: usize,
}

impl BackendHandle for OnnxBackend {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn load(&self, model_dir: &Path, model_lib: &str) -> Result<Arc<dyn LoadedModel>, RecallError> {
        let config = OnnxModelConfig::read(&model_dir.join(CONFIG_FILE))?;
        let graph = model_dir.join(&config.graph);
        let tokenizer = config.tokenizer_path(model_dir, model_lib);
        let model = OnnxModel::open(&graph, &tokenizer, &config, self.intra_threads)?;
        Ok(Arc::new(model))
    }
}

struct OnnxInner {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    eos: Vec<u32>,
    context_window: usize,
    uses_position_ids: bool,
}

// Safety: the Session is only reached through the Mutex, and the tokenizer
// is only used for encoding and decoding.
unsafe impl Send for OnnxInner {}
unsafe impl Sync for OnnxInner {}

/// A loaded decoder graph plus its tokenizer.
#[derive(Clone)]
pub struct OnnxModel {
    inner: Arc<OnnxInner>,
}

impl OnnxModel {
    pub fn open(
        graph: &Path,
        tokenizer_path: &Path,
        config: &OnnxModelConfig,
        intra_threads: usize,
    ) -> Result<Self, RecallError> {
        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            load_error(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .map_err(|e| load_error(format!("failed to create ONNX session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| load_error(format!("failed to set thread count: {e}")))?
            .commit_from_file(graph)
            .map_err(|e| load_error(format!("failed to load {}: {e}", graph.display())))?;

        let mut eos = config.eos_token_ids.clone();
        if eos.is_empty() {
            eos = ["<|im_end|>", "<|endoftext|>"]
                .iter()
                .filter_map(|t| tokenizer.token_to_id(t))
                .collect();
        }
        info!(graph = %graph.display(), eos = ?eos, "ONNX model loaded");

        Ok(Self {
            inner: Arc::new(OnnxInner {
                session: Mutex::new(session),
                tokenizer,
                eos,
                context_window: config.context_window.max(16),
                uses_position_ids: config.uses_position_ids,
            }),
        })
    }
}

impl OnnxInner {
    fn encode(&self, text: &str) -> Result<Vec<u32>, RecallError> {
        self.tokenizer
            .encode(text, false)
            .map(|enc| enc.get_ids().to_vec())
            .map_err(|e| RecallError::Internal(format!("tokenization failed: {e}")))
    }

    fn decode(&self, ids: &[u32]) -> Result<String, RecallError> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| RecallError::Internal(format!("detokenization failed: {e}")))
    }

    /// Logits of the last position for `tokens`.
    fn next_logits(&self, tokens: &[u32]) -> Result<Vec<f32>, RecallError> {
        let window = &tokens[tokens.len().saturating_sub(self.context_window)..];
        let len = window.len();
        let ids: Vec<i64> = window.iter().map(|&t| t as i64).collect();
        let infer = |e: &dyn std::fmt::Display| RecallError::Internal(format!("ONNX inference failed: {e}"));

        let ids = Array2::from_shape_vec((1, len), ids).map_err(|e| infer(&e))?;
        let mask = Array2::<i64>::ones((1, len));
        let positions =
            Array2::from_shape_vec((1, len), (0..len as i64).collect()).map_err(|e| infer(&e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RecallError::Internal(format!("failed to lock ONNX session: {e}")))?;
        let ids_tensor = TensorRef::from_array_view(&ids).map_err(|e| infer(&e))?;
        let mask_tensor = TensorRef::from_array_view(&mask).map_err(|e| infer(&e))?;

        let outputs = if self.uses_position_ids {
            let pos_tensor = TensorRef::from_array_view(&positions).map_err(|e| infer(&e))?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "position_ids" => pos_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])
        }
        .map_err(|e| infer(&e))?;

        // Logits: [1, seq_len, vocab]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| infer(&e))?;
        let vocab = shape[shape.len() - 1] as usize;
        if vocab == 0 || data.len() < vocab {
            return Err(RecallError::Internal("ONNX graph produced empty logits".into()));
        }
        Ok(data[data.len() - vocab..].to_vec())
    }

    /// Greedy decode from `tokens`, extending it with each generated id.
    fn run(&self, tokens: &mut Vec<u32>, max_new_tokens: usize, sink: TokenSink<'_>) -> Result<(), RecallError> {
        let mut generated: Vec<u32> = Vec::new();
        let mut deltas = DeltaTracker::default();
        for _ in 0..max_new_tokens {
            if tokens.is_empty() {
                break;
            }
            let logits = self.next_logits(tokens)?;
            let next = argmax(&logits);
            if self.eos.contains(&next) {
                break;
            }
            tokens.push(next);
            generated.push(next);

            if let Some(delta) = deltas.advance(self.decode(&generated)?)
                && !sink(&delta)
            {
                debug!(tokens = generated.len(), "generation cancelled by consumer");
                return Ok(());
            }
        }
        if !generated.is_empty()
            && let Some(rest) = deltas.flush(self.decode(&generated)?)
        {
            sink(&rest);
        }
        Ok(())
    }
}

/// Tracks how much decoded text has reached the consumer.
#[derive(Debug, Default)]
struct DeltaTracker {
    emitted: String,
}

impl DeltaTracker {
    /// Text added since the last emission. Held back while the decode ends
    /// in a replacement char, since a later token may complete the sequence.
    fn advance(&mut self, text: String) -> Option<String> {
        if text.ends_with('\u{FFFD}') {
            return None;
        }
        self.take(text)
    }

    /// Whatever is still unsent at the end of a turn.
    fn flush(&mut self, text: String) -> Option<String> {
        self.take(text)
    }

    fn take(&mut self, text: String) -> Option<String> {
        let delta = match text.strip_prefix(self.emitted.as_str()) {
            Some(delta) => delta.to_string(),
            // Decoder cleanup rewrote earlier text. Resync on the new decode
            // and send only what lies past the old length.
            None => text.get(self.emitted.len()..).unwrap_or_default().to_string(),
        };
        self.emitted = text;
        (!delta.is_empty()).then_some(delta)
    }
}

fn argmax(values: &[f32]) -> u32 {
    let mut best = 0usize;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best as u32
}

struct OnnxContext {
    inner: Arc<OnnxInner>,
    tokens: Vec<u32>,
}

impl ChatContext for OnnxContext {
    fn append(&mut self, text: &str) -> Result<(), RecallError> {
        let ids = self.inner.encode(text)?;
        self.tokens.extend(ids);
        Ok(())
    }

    fn generate(&mut self, max_new_tokens: usize, sink: TokenSink<'_>) -> Result<(), RecallError> {
        let inner = self.inner.clone();
        inner.run(&mut self.tokens, max_new_tokens, sink)
    }
}

impl LoadedModel for OnnxModel {
    fn new_context(&self) -> Result<Box<dyn ChatContext>, RecallError> {
        Ok(Box::new(OnnxContext {
            inner: self.inner.clone(),
            tokens: Vec::new(),
        }))
    }

    fn generate_stateless(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        sink: TokenSink<'_>,
    ) -> Result<(), RecallError> {
        let mut tokens = self.inner.encode(prompt)?;
        self.inner.run(&mut tokens, max_new_tokens, sink)
    }
}
