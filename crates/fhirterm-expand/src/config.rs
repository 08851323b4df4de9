//! Configuration types for ValueSet expansion.

use std::time::Duration;

/// Configuration for the expansion evaluator.
///
/// # Example
///
/// ```rust
/// use fhirterm_expand::{CacheConfig, ExpansionConfig};
/// use std::time::Duration;
///
/// let config = ExpansionConfig::builder()
///     .with_strict(true)
///     .with_cache(CacheConfig::default())
///     .with_max_results(100_000)
///     .with_timeout(Duration::from_secs(30))
///     .build();
///
/// assert!(config.strict);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExpansionConfig {
    /// Fail on unknown code systems instead of expanding them to nothing.
    pub strict: bool,
    /// Maximum number of codes in an expansion (None = unlimited).
    pub max_results: Option<usize>,
    /// Expansion timeout (None = no timeout).
    pub timeout: Option<Duration>,
    /// Filter result cache (None = caching disabled).
    pub cache: Option<CacheConfig>,
}

impl ExpansionConfig {
    /// Creates a new builder for ExpansionConfig.
    pub fn builder() -> ExpansionConfigBuilder {
        ExpansionConfigBuilder::default()
    }
}

/// Builder for ExpansionConfig.
#[derive(Debug, Clone, Default)]
pub struct ExpansionConfigBuilder {
    strict: bool,
    max_results: Option<usize>,
    timeout: Option<Duration>,
    cache: Option<CacheConfig>,
}

impl ExpansionConfigBuilder {
    /// Enables or disables strict mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Sets the maximum number of codes.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Sets the expansion timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables filter result caching.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builds the ExpansionConfig.
    pub fn build(self) -> ExpansionConfig {
        ExpansionConfig {
            strict: self.strict,
            max_results: self.max_results,
            timeout: self.timeout,
            cache: self.cache,
        }
    }
}

/// Size of an LRU cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached entries.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}
