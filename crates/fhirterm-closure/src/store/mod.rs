//! Storage seams for the closure index.
//!
//! The builder never talks to a database directly. It consumes a
//! [`ClosureStore`] (edge relation + transactional batch writes), and
//! expansion code reads through a [`ClosureIndex`] (consistent snapshots of the
//! live index).
//!
//! # Rebuild Protocol
//!
//! ```text
//! begin_rebuild()                  drop any leftover staging index
//! write_batch(f) × N               one transaction per batch; Err => rollback
//! finish_rebuild(count)            staging replaces live index atomically
//! ```
//!
//! Readers opened before `finish_rebuild` keep seeing the previous index;
//! readers opened after it see only the new one.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use fhirterm_types::{ConceptId, ConceptSet};
use sha2::{Digest, Sha256};

use crate::error::ClosureResult;
use crate::record::{ClosureRecord, Direction, EncodedRecord, IsAEdge, RebuildInfo};

/// Write side of the closure index, plus the edge relation it is built from.
pub trait ClosureStore {
    /// Every concept appearing as either endpoint of an edge, ascending.
    fn concept_ids(&self) -> ClosureResult<Vec<ConceptId>>;

    /// The complete edge relation.
    fn edges(&self) -> ClosureResult<Vec<IsAEdge>>;

    /// Number of edges in the relation.
    fn edge_count(&self) -> ClosureResult<usize>;

    /// Starts a full rebuild, discarding any staged records left by an
    /// earlier rebuild that never finished.
    fn begin_rebuild(&self) -> ClosureResult<()>;

    /// Runs `f` inside one transaction.
    ///
    /// Records written through the [`BatchWriter`] become durable only if `f`
    /// returns `Ok`; on `Err` none of them are kept and the error is returned.
    fn write_batch(
        &self,
        f: &mut dyn FnMut(&mut dyn BatchWriter) -> ClosureResult<()>,
    ) -> ClosureResult<()>;

    /// Replaces the live index with the staged records and bumps the generation.
    fn finish_rebuild(&self, concept_count: usize) -> ClosureResult<RebuildInfo>;
}

/// Operations available inside one batch transaction.
pub trait BatchWriter {
    /// All concepts reachable from `seed` in `direction`, excluding `seed`
    /// unless it lies on a cycle.
    fn reachable(&mut self, seed: ConceptId, direction: Direction) -> ClosureResult<ConceptSet>;

    /// Stages one record.
    fn put(&mut self, record: &EncodedRecord) -> ClosureResult<()>;
}

/// Read side of the closure index.
pub trait ClosureIndex: Send + Sync {
    /// Opens a reader bound to one consistent snapshot of the live index.
    fn reader(&self) -> ClosureResult<Box<dyn ClosureReader + '_>>;
}

/// A consistent, read-only view of the live closure index.
pub trait ClosureReader {
    /// Metadata of the snapshot; `None` if the index was never built.
    fn info(&self) -> Option<&RebuildInfo>;

    /// Persisted record of a concept, if indexed.
    fn encoded_record(&self, concept_id: ConceptId) -> ClosureResult<Option<EncodedRecord>>;

    /// All indexed concept ids, ascending.
    fn concept_ids(&self) -> ClosureResult<Vec<ConceptId>>;

    /// Generation of the snapshot (0 if never built).
    fn generation(&self) -> u64 {
        self.info().map(|info| info.generation).unwrap_or(0)
    }

    /// Decoded record of a concept, if indexed.
    fn record(&self, concept_id: ConceptId) -> ClosureResult<Option<ClosureRecord>> {
        self.encoded_record(concept_id)?
            .map(|encoded| encoded.decode())
            .transpose()
    }

    /// Returns true if the concept has a record.
    fn contains(&self, concept_id: ConceptId) -> ClosureResult<bool> {
        Ok(self.encoded_record(concept_id)?.is_some())
    }

    /// SHA-256 over every record in ascending concept order, hex encoded.
    ///
    /// Two indexes with bit-identical records have the same fingerprint.
    fn fingerprint(&self) -> ClosureResult<String> {
        let mut hasher = Sha256::new();
        for concept_id in self.concept_ids()? {
            if let Some(record) = self.encoded_record(concept_id)? {
                hasher.update(concept_id.to_le_bytes());
                hasher.update((record.ancestors.len() as u64).to_le_bytes());
                hasher.update(&record.ancestors);
                hasher.update((record.descendants.len() as u64).to_le_bytes());
                hasher.update(&record.descendants);
            }
        }
        let digest: [u8; 32] = hasher.finalize().into();
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}
