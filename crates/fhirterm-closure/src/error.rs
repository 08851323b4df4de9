//! Error types for the closure crate.

use fhirterm_types::{ConceptId, TypesError};

/// Result type for closure operations.
pub type ClosureResult<T> = Result<T, ClosureError>;

/// Errors that can occur while building or reading a closure index.
#[derive(Debug, thiserror::Error)]
pub enum ClosureError {
    /// The reachability query against the edge relation failed.
    #[error("traversal failed for concept {concept_id}: {message}")]
    Traversal {
        /// Seed concept of the failed query.
        concept_id: ConceptId,
        /// Underlying failure.
        message: String,
    },

    /// A closure set could not be serialized.
    #[error("failed to encode closure of concept {concept_id}: {message}")]
    Encoding {
        /// Concept whose record was being encoded.
        concept_id: ConceptId,
        /// Reason the encoding was rejected.
        message: String,
    },

    /// A persisted closure blob could not be decoded.
    #[error("corrupt closure record for concept {concept_id}: {source}")]
    Decoding {
        /// Concept whose record is corrupt.
        concept_id: ConceptId,
        /// Codec error.
        #[source]
        source: TypesError,
    },

    /// SQLite error.
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Storage-layer error not covered by a more specific variant.
    #[error("store error: {0}")]
    Store(String),

    /// Invalid builder configuration.
    #[error("invalid closure configuration: {0}")]
    InvalidConfig(String),
}

impl ClosureError {
    /// Creates a traversal error for the given seed concept.
    pub fn traversal(concept_id: ConceptId, message: impl Into<String>) -> Self {
        Self::Traversal {
            concept_id,
            message: message.into(),
        }
    }

    /// Creates an encoding error for the given concept.
    pub fn encoding(concept_id: ConceptId, message: impl Into<String>) -> Self {
        Self::Encoding {
            concept_id,
            message: message.into(),
        }
    }

    /// Returns true if this error aborts a rebuild batch (traversal or encoding).
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::Traversal { .. } | Self::Encoding { .. })
    }
}
