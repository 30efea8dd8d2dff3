//! Gravity Vector crate - similarity-search gateway and embedding contract.
//!
//! Provides named collections with a fixed dimension and distance metric,
//! idempotent upserts, conjunctive metadata filters, and a deterministic
//! mock embedder for tests.

pub mod embedding;
pub mod error;
pub mod filter;
pub mod store;

pub use embedding::{EmbeddingService, MockEmbedding};
pub use error::VectorError;
pub use filter::{Condition, MetadataFilter, Predicate};
pub use store::{CollectionInfo, DistanceMetric, MemoryVectorStore, SearchHit, VectorPoint, VectorStore};
