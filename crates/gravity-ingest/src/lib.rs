//! Gravity Ingest crate - hierarchical chunking and the indexing contract.
//!
//! Documents are split into a tree of chunks (level 0 is the document
//! digest, the deepest level holds overlapping leaf passages), embedded,
//! and upserted into a vector collection. Leaf passages always reconstruct
//! the original text byte for byte.

pub mod chunk;
pub mod error;
pub mod models;
pub mod pipeline;

pub use chunk::{chunk, reconstruct_leaves};
pub use error::IngestError;
pub use models::{Chunk, ChunkConfig, ChunkMetadata, Document, Embedding, TokenSpan};
pub use pipeline::{IndexReport, IndexingPipeline};
