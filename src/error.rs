//! Error Types
//!
//! Typed failures for building, loading and querying embedding tables.

use thiserror::Error;

/// Errors that can occur while building or querying an embedding store.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// An entry's vector is inconsistent with the store (wrong length,
    /// empty, or carrying non-finite components).
    #[error("malformed entry '{token}': {reason}")]
    MalformedEntry {
        /// Token of the offending entry.
        token: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The source produced no entries and empty stores were disallowed.
    #[error("embedding source is empty")]
    EmptySource,

    /// The same token appeared twice under the reject policy.
    #[error("duplicate token: {0}")]
    DuplicateToken(String),

    /// Lookup of a token that is not in the store.
    #[error("unknown token: {0}")]
    UnknownToken(String),

    /// Query dimensionality disagrees with the store.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The store's dimensionality.
        expected: usize,
        /// The query's length.
        actual: usize,
    },

    /// Cosine distance is undefined because a vector has zero norm.
    #[error("zero-norm vector: {0}")]
    ZeroVector(String),

    /// Query vector holds a NaN or infinite component.
    #[error("invalid value at index {index}: {value}")]
    InvalidValue {
        /// Position of the bad component.
        index: usize,
        /// The bad component.
        value: f32,
    },

    /// A source line could not be parsed.
    #[error("parse error at line {line}: {reason}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        reason: String,
    },

    /// Underlying I/O failure while reading a source.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An async query was cancelled before it completed.
    #[error("query cancelled")]
    Cancelled,

    /// An async query exceeded its deadline.
    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The blocking task running a query panicked or was aborted.
    #[error("query task failed: {0}")]
    TaskFailed(String),
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;
