// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types and vector helpers.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of captured memory. Stored as its uppercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryType {
    Text,
    Audio,
    Image,
    Video,
    Pdf,
    Screenshot,
}

/// Typed payload of a memory, serialized into `metadata_json`.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryContent {
    Text {
        content: String,
    },
    Audio {
        file_path: String,
        duration_ms: i64,
        transcription: Option<String>,
    },
    Image {
        file_path: String,
        caption: Option<String>,
    },
}

#[derive(Serialize, Deserialize)]
struct TextMetadata {
    content: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioMetadata {
    file_path: String,
    duration_ms: i64,
    #[serde(default)]
    transcription: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageMetadata {
    file_path: String,
    #[serde(default)]
    caption: Option<String>,
}

/// Why metadata could not be turned back into content.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("invalid metadata json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no content model for {0} memories")]
    Unsupported(MemoryType),
}

impl MemoryContent {
    pub fn memory_type(&self) -> MemoryType {
        match self {
            Self::Text { .. } => MemoryType::Text,
            Self::Audio { .. } => MemoryType::Audio,
            Self::Image { .. } => MemoryType::Image,
        }
    }

    pub fn to_metadata_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Text { content } => serde_json::to_string(&TextMetadata {
                content: content.clone(),
            }),
            Self::Audio {
                file_path,
                duration_ms,
                transcription,
            } => serde_json::to_string(&AudioMetadata {
                file_path: file_path.clone(),
                duration_ms: *duration_ms,
                transcription: transcription.clone(),
            }),
            Self::Image { file_path, caption } => serde_json::to_string(&ImageMetadata {
                file_path: file_path.clone(),
                caption: caption.clone(),
            }),
        }
    }

    pub fn from_metadata(memory_type: MemoryType, json: &str) -> Result<Self, MetadataError> {
        Ok(match memory_type {
            MemoryType::Text => {
                let m: TextMetadata = serde_json::from_str(json)?;
                Self::Text { content: m.content }
            }
            MemoryType::Audio => {
                let m: AudioMetadata = serde_json::from_str(json)?;
                Self::Audio {
                    file_path: m.file_path,
                    duration_ms: m.duration_ms,
                    transcription: m.transcription,
                }
            }
            MemoryType::Image => {
                let m: ImageMetadata = serde_json::from_str(json)?;
                Self::Image {
                    file_path: m.file_path,
                    caption: m.caption,
                }
            }
            other => return Err(MetadataError::Unsupported(other)),
        })
    }

    /// Text usable for embedding and prompts, if any.
    pub fn extracted_text(&self) -> Option<&str> {
        let text = match self {
            Self::Text { content } => Some(content.as_str()),
            Self::Audio { transcription, .. } => transcription.as_deref(),
            Self::Image { caption, .. } => caption.as_deref(),
        };
        text.filter(|t| !t.trim().is_empty())
    }
}

/// A stored memory row.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: i64,
    pub memory_type: MemoryType,
    pub metadata_json: String,
    /// Unix milliseconds.
    pub created_at: i64,
    pub tags: Option<String>,
    pub is_favorite: bool,
    pub embedding: Option<Vec<f32>>,
}

impl MemoryRecord {
    pub fn content(&self) -> Result<MemoryContent, MetadataError> {
        MemoryContent::from_metadata(self.memory_type, &self.metadata_json)
    }
}

/// A scored hit from similarity retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalMatch {
    pub record_id: i64,
    pub text: String,
    pub score: f32,
}

/// Convert f32 vector to little-endian bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian f32 BLOB. Trailing partial chunks are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity `dot / (|a|·|b|)`.
///
/// Returns 0.0 when the lengths differ or either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    } else {
        0.0
    }
}
