//! # fhirterm-closure
//!
//! Precomputed transitive closure of an "is-a" concept hierarchy.
//!
//! For every concept appearing in the is-a relation, the [`ClosureBuilder`]
//! computes the full ancestor set and the full descendant set, encodes both
//! with [`fhirterm_types::codec`], and writes them to a [`ClosureStore`] in
//! large batches, each committed atomically.
//!
//! ## Features
//!
//! - **`sqlite`** (default): [`SqliteStore`], an on-disk edge relation and
//!   closure index using recursive SQL traversal
//! - **`parallel`**: shard in-memory closure computation across rayon workers
//!
//! ## Quick Start
//!
//! ```ignore
//! use fhirterm_closure::{ClosureBuilder, ClosureConfig, SqliteStore};
//!
//! let store = SqliteStore::open("terminology.db")?;
//!
//! // Full rebuild: prior index is replaced once the last batch commits
//! let stats = ClosureBuilder::with_config(ClosureConfig::default()).rebuild(&store)?;
//! println!("{}", stats);
//!
//! // Read a consistent snapshot
//! let reader = store.reader()?;
//! if let Some(record) = reader.record(73211009)? {
//!     println!("{} descendants", record.descendants.len());
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! is-a edges ──► ClosureBuilder ──► BatchWriter (one transaction per batch)
//!                     │                  │
//!                     │                  └── staging index ──► finish_rebuild ──► live index
//!                     └── reachability: store query (WITH RECURSIVE) or IsAGraph (in memory)
//! ```

pub mod closure;
pub mod config;
pub mod error;
pub mod record;
pub mod store;

pub use closure::{ClosureBuilder, ClosureStats, IsAGraph};
pub use config::{ClosureConfig, ClosureConfigBuilder, TraversalStrategy};
pub use error::{ClosureError, ClosureResult};
pub use record::{ClosureRecord, Direction, EncodedRecord, IsAEdge, RebuildInfo};
pub use store::{BatchWriter, ClosureIndex, ClosureReader, ClosureStore, MemoryStore};

#[cfg(feature = "sqlite")]
pub use store::SqliteStore;

// Re-export from fhirterm-types for convenience
pub use fhirterm_types::{ConceptId, ConceptSet};
