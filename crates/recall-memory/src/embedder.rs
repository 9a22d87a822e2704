// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local sentence embeddings with all-MiniLM-L6-v2 on ONNX Runtime.
//!
//! Vectors are 384 wide, mean-pooled over real tokens and L2-normalized,
//! so cosine similarity reduces to a dot product. Nothing leaves the device.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use recall_core::types::{EmbeddingInput, EmbeddingOutput};
use recall_core::{AdapterType, EmbeddingAdapter, HealthStatus, PluginAdapter, RecallError};

/// Output width of all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

fn load_error(message: String) -> RecallError {
    RecallError::BackendLoad {
        message,
        source: None,
    }
}

fn inference_error(e: &dyn std::fmt::Display) -> RecallError {
    RecallError::Internal(format!("embedding inference failed: {e}"))
}

/// Embedding adapter over a local ONNX sentence-transformer.
///
/// Inference runs on CPU. One text is encoded at a time, so the session
/// lock is the only contention point.
pub struct OnnxEmbedder {
    /// ONNX Runtime session. `Session::run` takes `&mut self`.
    session: Mutex<Session>,
    /// WordPiece tokenizer shipped next to the model.
    tokenizer: tokenizers::Tokenizer,
}

// Safety: the session is only reached through the Mutex, and the tokenizer
// is read-only after construction.
unsafe impl Send for OnnxEmbedder {}
unsafe impl Sync for OnnxEmbedder {}

impl OnnxEmbedder {
    /// Load the graph at `model_path` and the tokenizer at `tokenizer_path`.
    ///
    /// Both files come from the embedding model directory prepared by
    /// [`EmbeddingModelManager`](crate::EmbeddingModelManager). Failures map to
    /// `BackendLoad`.
    pub fn new(model_path: &Path, tokenizer_path: &Path, intra_threads: usize) -> Result<Self, RecallError> {
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
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| load_error(format!("failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| load_error(format!("failed to load {}: {e}", model_path.display())))?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Embed one text into a unit-length vector of [`EMBEDDING_DIM`] floats.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| RecallError::Internal(format!("tokenization failed: {e}")))?;

        let widen = |xs: &[u32]| xs.iter().map(|&x| x as i64).collect::<Vec<i64>>();
        let mask = widen(encoding.get_attention_mask());
        let len = mask.len();

        let ids = Array2::from_shape_vec((1, len), widen(encoding.get_ids()))
            .map_err(|e| inference_error(&e))?;
        let mask_array =
            Array2::from_shape_vec((1, len), mask.clone()).map_err(|e| inference_error(&e))?;
        let types = Array2::from_shape_vec((1, len), widen(encoding.get_type_ids()))
            .map_err(|e| inference_error(&e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RecallError::Internal(format!("failed to lock ONNX session: {e}")))?;
        let ids = TensorRef::from_array_view(&ids).map_err(|e| inference_error(&e))?;
        let mask_tensor = TensorRef::from_array_view(&mask_array).map_err(|e| inference_error(&e))?;
        let types = TensorRef::from_array_view(&types).map_err(|e| inference_error(&e))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask_tensor,
                "token_type_ids" => types
            ])
            .map_err(|e| inference_error(&e))?;

        // Last hidden state: [1, seq_len, hidden]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error(&e))?;
        let hidden = shape[shape.len() - 1] as usize;
        Ok(l2_normalize(mean_pool(data, &mask, hidden)))
    }
}

/// Mean of the token vectors whose mask is set.
fn mean_pool(embeddings: &[f32], mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0usize;
    for (token, _) in embeddings
        .chunks_exact(hidden)
        .zip(mask)
        .filter(|(_, m)| **m > 0)
    {
        for (acc, v) in sum.iter_mut().zip(token) {
            *acc += v;
        }
        count += 1;
    }
    if count > 0 {
        sum.iter_mut().for_each(|v| *v /= count as f32);
    }
    sum
}

/// Scale to unit length. Zero vectors come back unchanged.
fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter_mut().for_each(|v| *v /= norm);
    }
    vec
}

#[async_trait]
impl PluginAdapter for OnnxEmbedder {
    fn name(&self) -> &str {
        "onnx-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        Ok(match self.session.lock() {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(format!("session lock poisoned: {e}")),
        })
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        let embeddings = input
            .texts
            .iter()
            .map(|t| self.embed_text(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: EMBEDDING_DIM,
        })
    }
}
