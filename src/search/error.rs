//! Index and embedding error types.

use thiserror::Error;

use crate::core::image::ImageError;

/// Errors raised by an embedding model.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// The model itself cannot serve requests (not tied to one input)
    #[error("Embedding model unavailable: {0}")]
    Unavailable(String),

    /// The input could not be embedded
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Produced vector does not match the model dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Whether this failure should abort a whole index build
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, EmbeddingError::Unavailable(_))
    }
}

/// Errors raised by the index lifecycle and similarity search.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Persisted index exists but cannot be parsed into an index
    #[error("Corrupt index at {path}: {reason}")]
    CorruptIndex { path: String, reason: String },

    /// No vector survived the catalog join
    #[error("Empty Embeddings Index")]
    EmptyIndex,

    /// Embedding model or image source failed as a whole during a build
    #[error("Collaborator failure: {0}")]
    CollaboratorFailure(#[source] CollaboratorError),

    #[error("Query dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A build collaborator that stopped serving requests altogether
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("embedding model: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("image source: {0}")]
    Image(#[from] ImageError),
}

/// Why a single catalog item was left out of a build
#[derive(Debug, Error)]
pub enum ItemFailureReason {
    #[error("image: {0}")]
    Image(#[from] ImageError),

    #[error("embedding: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// A catalog item skipped during index building.
#[derive(Debug, Error)]
#[error("Failed product {id}: {reason}")]
pub struct ItemBuildFailure {
    pub id: String,
    #[source]
    pub reason: ItemFailureReason,
}

impl ItemBuildFailure {
    pub fn new(id: impl Into<String>, reason: impl Into<ItemFailureReason>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
