//! Error types for shared fhirterm types.

use thiserror::Error;

/// Errors that can occur while decoding persisted concept sets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    /// Blob length is not a whole number of 8-byte concept ids.
    #[error("truncated concept blob: {len} bytes is not a multiple of 8")]
    TruncatedBlob {
        /// Length of the rejected blob.
        len: usize,
    },
}

/// Result type for fhirterm-types operations.
pub type TypesResult<T> = std::result::Result<T, TypesError>;
