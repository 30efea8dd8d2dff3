use gravity_vector::VectorError;
use thiserror::Error;

/// Errors raised while chunking or indexing documents.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Invalid chunking configuration. Raised before any I/O.
    #[error("invalid chunking config: {0}")]
    Config(String),

    #[error("vector store error: {0}")]
    Vector(#[from] VectorError),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("unknown document: {0}")]
    UnknownDocument(String),

    #[error("catalog error: {0}")]
    Catalog(String),
}
