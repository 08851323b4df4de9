//! Configuration types for the closure builder.

use crate::error::{ClosureError, ClosureResult};

/// Number of concepts committed per transaction by default.
pub const DEFAULT_BATCH_SIZE: usize = 20_000;

/// Largest blob SQLite accepts by default.
pub const DEFAULT_MAX_BLOB_BYTES: usize = 1_000_000_000;

/// How reachability is computed during a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalStrategy {
    /// Ask the store for every concept (recursive query scoped to the batch transaction).
    #[default]
    StoreQuery,
    /// Load the edge relation once and traverse it in memory.
    InMemory,
}

/// Configuration for the closure builder.
///
/// # Example
///
/// ```rust
/// use fhirterm_closure::{ClosureConfig, TraversalStrategy};
///
/// let config = ClosureConfig::builder()
///     .with_batch_size(5_000)
///     .with_traversal(TraversalStrategy::InMemory)
///     .with_parallel(true)
///     .build();
///
/// assert_eq!(config.batch_size, 5_000);
/// ```
#[derive(Debug, Clone)]
pub struct ClosureConfig {
    /// Concepts written per atomic batch.
    pub batch_size: usize,
    /// Reachability strategy.
    pub traversal: TraversalStrategy,
    /// Compute records of a batch on rayon workers (requires `parallel` feature
    /// and [`TraversalStrategy::InMemory`]).
    pub parallel: bool,
    /// Largest encoded ancestor or descendant set, in bytes.
    pub max_blob_bytes: usize,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            traversal: TraversalStrategy::default(),
            parallel: false,
            max_blob_bytes: DEFAULT_MAX_BLOB_BYTES,
        }
    }
}

impl ClosureConfig {
    /// Creates a new builder for ClosureConfig.
    pub fn builder() -> ClosureConfigBuilder {
        ClosureConfigBuilder::default()
    }

    /// Checks the configuration for values the builder cannot run with.
    pub fn validate(&self) -> ClosureResult<()> {
        if self.batch_size == 0 {
            return Err(ClosureError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for ClosureConfig.
#[derive(Debug, Clone, Default)]
pub struct ClosureConfigBuilder {
    batch_size: Option<usize>,
    traversal: TraversalStrategy,
    parallel: bool,
    max_blob_bytes: Option<usize>,
}

impl ClosureConfigBuilder {
    /// Sets the number of concepts per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Sets the reachability strategy.
    pub fn with_traversal(mut self, traversal: TraversalStrategy) -> Self {
        self.traversal = traversal;
        self
    }

    /// Enables or disables parallel record computation.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the largest encoded set a record may carry.
    pub fn with_max_blob_bytes(mut self, max_blob_bytes: usize) -> Self {
        self.max_blob_bytes = Some(max_blob_bytes);
        self
    }

    /// Builds the ClosureConfig.
    pub fn build(self) -> ClosureConfig {
        ClosureConfig {
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            traversal: self.traversal,
            parallel: self.parallel,
            max_blob_bytes: self.max_blob_bytes.unwrap_or(DEFAULT_MAX_BLOB_BYTES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_config_default() {
        let config = ClosureConfig::default();
        assert_eq!(config.batch_size, 20_000);
        assert_eq!(config.traversal, TraversalStrategy::StoreQuery);
        assert!(!config.parallel);
        assert_eq!(config.max_blob_bytes, 1_000_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_closure_config_builder() {
        let config = ClosureConfig::builder()
            .with_batch_size(2)
            .with_traversal(TraversalStrategy::InMemory)
            .with_parallel(true)
            .with_max_blob_bytes(64)
            .build();

        assert_eq!(config.batch_size, 2);
        assert_eq!(config.max_blob_bytes, 64);
        assert_eq!(config.traversal, TraversalStrategy::InMemory);
        assert!(config.parallel);
    }

    #[test]
    fn test_zero_batch_size_is_invalid() {
        let config = ClosureConfig::builder().with_batch_size(0).build();
        assert!(matches!(
            config.validate(),
            Err(ClosureError::InvalidConfig(_))
        ));
    }
}
