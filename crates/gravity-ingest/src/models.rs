use serde::{Deserialize, Serialize};

use gravity_core::config::ChunkingConfig;
use gravity_core::Timestamp;

use crate::error::IngestError;

/// A source document handed to the pipeline by an ingestion trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_system: String,
    pub uri: String,
    pub raw_text: String,
    pub updated_at: Timestamp,
}

/// Token indices `[start, end)` plus the byte range they cover in the
/// document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
    pub byte_start: usize,
    pub byte_end: usize,
}

/// Everything needed to cite or re-fetch a chunk without its document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_system: String,
    pub uri: String,
    /// Markdown heading breadcrumb, e.g. `Runbook > Rollback`.
    pub section_path: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document_id}:{version}:{level}:{ordinal}`
    pub id: String,
    pub document_id: String,
    pub parent_chunk_id: Option<String>,
    /// 0 is the whole-document digest; the deepest level holds leaves.
    pub level: u32,
    /// Position within its level, left to right.
    pub ordinal: usize,
    pub text: String,
    pub token_span: TokenSpan,
    pub metadata: ChunkMetadata,
}

/// One vector per (chunk, model) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub model_id: String,
}

/// Chunking parameters, sizes in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub leaf_size: usize,
    pub overlap: usize,
    pub max_depth: u32,
    pub fan_out: usize,
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.leaf_size == 0 {
            return Err(IngestError::Config("leaf_size must be at least 1".into()));
        }
        if self.overlap >= self.leaf_size {
            return Err(IngestError::Config(format!(
                "overlap ({}) must be smaller than leaf_size ({})",
                self.overlap, self.leaf_size
            )));
        }
        if self.max_depth == 0 {
            return Err(IngestError::Config("max_depth must be at least 1".into()));
        }
        if self.fan_out < 2 {
            return Err(IngestError::Config("fan_out must be at least 2".into()));
        }
        Ok(())
    }

    /// Stable textual form, part of the version fingerprint.
    pub(crate) fn fingerprint(&self) -> String {
        format!(
            "leaf={};overlap={};depth={};fan_out={}",
            self.leaf_size, self.overlap, self.max_depth, self.fan_out
        )
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::from(&ChunkingConfig::default())
    }
}

impl From<&ChunkingConfig> for ChunkConfig {
    fn from(c: &ChunkingConfig) -> Self {
        Self {
            leaf_size: c.leaf_size,
            overlap: c.overlap,
            max_depth: c.max_depth,
            fan_out: c.fan_out,
        }
    }
}
