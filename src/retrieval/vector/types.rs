use serde::{Deserialize, Serialize};

/// A single nearest-neighbour result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Position of the stored vector, in build order
    pub position: usize,
    /// Euclidean distance to the query
    pub distance: f32,
}

/// Error types for vector index operations
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cannot build an index without vectors")]
    Empty,

    #[error("Cannot build an index of zero-dimensional vectors")]
    ZeroDimension,
}
