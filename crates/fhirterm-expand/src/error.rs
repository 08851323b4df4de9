//! Error types for ValueSet expansion.

use std::time::Duration;

use fhirterm_closure::ClosureError;
use thiserror::Error;

/// Errors that can occur while compiling or expanding a ValueSet.
#[derive(Error, Debug)]
pub enum ExpandError {
    /// No code system is registered for the URL (strict mode only).
    #[error("Unknown code system: {0}")]
    UnknownCodeSystem(String),

    /// The code system has no evaluator for this property/operator pair.
    #[error("Unsupported filter in {system}: {property} {op}")]
    UnsupportedPredicate {
        /// Code system URL.
        system: String,
        /// Filter property.
        property: String,
        /// Filter operator code.
        op: String,
    },

    /// A filter referenced a code the system does not know.
    #[error("Unknown code {code} in {system}")]
    UnknownCode {
        /// Code system URL.
        system: String,
        /// The code as written in the filter.
        code: String,
    },

    /// A filter value could not be interpreted for its operator.
    #[error("Invalid value {value:?} for filter {property} {op}: {message}")]
    InvalidFilterValue {
        /// Filter property.
        property: String,
        /// Filter operator code.
        op: String,
        /// Offending value.
        value: String,
        /// Why the value was rejected.
        message: String,
    },

    /// Expansion exceeds the configured limit.
    #[error("Expansion too large: {count} exceeds limit {limit}")]
    ResultTooLarge {
        /// Number of codes found so far.
        count: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Expansion did not finish in time.
    #[error("Expansion timeout after {0:?}")]
    Timeout(Duration),

    /// The ValueSet source has no document with this id.
    #[error("ValueSet not found: {0}")]
    ValueSetNotFound(String),

    /// Error reading the closure index.
    #[error("Closure index error: {0}")]
    Closure(#[from] ClosureError),

    /// Malformed ValueSet JSON.
    #[error("Invalid ValueSet JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExpandError {
    /// Returns true if the error only invalidates the filter group it came from.
    ///
    /// Such errors make the group non-matching and are reported as issues
    /// instead of aborting the expansion.
    pub fn is_group_local(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedPredicate { .. } | Self::UnknownCode { .. } | Self::InvalidFilterValue { .. }
        )
    }
}

/// Result type for expansion operations.
pub type ExpandResult<T> = std::result::Result<T, ExpandError>;
