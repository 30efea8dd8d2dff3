//! Error types for the vector store gateway.

/// Errors from collection management, upserts and searches.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    #[error("dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid collection config: {0}")]
    Config(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_error_display() {
        let err = VectorError::CollectionNotFound("knowledge".to_string());
        assert_eq!(err.to_string(), "collection not found: knowledge");

        let err = VectorError::DimensionMismatch {
            expected: 384,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "dimension mismatch: collection expects 384, got 3"
        );

        let err = VectorError::Config("dimension must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "invalid collection config: dimension must be positive"
        );
    }
}
