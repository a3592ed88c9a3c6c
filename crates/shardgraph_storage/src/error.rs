//! Error types for persistence operations.

use shardgraph_codec::CodecError;
use thiserror::Error;

/// Result type for persistence operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in a persistence backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A row does not match the collection's descriptor.
    #[error("schema violation in {set}: {message}")]
    SchemaViolation {
        /// Qualified collection name.
        set: String,
        /// What is wrong with the row.
        message: String,
    },

    /// An update could not be applied to the stored state.
    #[error("conflict in {set}: {message}")]
    Conflict {
        /// Qualified collection or relation name.
        set: String,
        /// Description of the conflict.
        message: String,
    },

    /// Stored data references a shard, collection or relation the caller
    /// did not declare.
    #[error("unknown set: {name}")]
    UnknownSet {
        /// Qualified name that could not be resolved.
        name: String,
    },

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Creates a schema violation error.
    pub fn schema_violation(set: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            set: set.into(),
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(set: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            set: set.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown set error.
    pub fn unknown_set(name: impl Into<String>) -> Self {
        Self::UnknownSet { name: name.into() }
    }
}
