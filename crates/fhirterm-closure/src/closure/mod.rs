//! Batched rebuild of the closure index.
//!
//! A rebuild walks every concept of the is-a relation in ascending id order,
//! computes its ancestor and descendant sets, and writes the encoded record
//! through the store in fixed-size batches. Each batch is one transaction:
//! if any traversal or encoding in it fails the whole batch is rolled back,
//! the rebuild stops, and the live index stays as it was.
//!
//! # Example
//!
//! ```rust
//! use fhirterm_closure::{ClosureBuilder, ClosureConfig, IsAEdge, MemoryStore};
//!
//! let store = MemoryStore::with_edges([IsAEdge::new(2, 1), IsAEdge::new(3, 2)]);
//! let builder = ClosureBuilder::with_config(ClosureConfig::builder().with_batch_size(2).build());
//!
//! let stats = builder.rebuild(&store).unwrap();
//! assert_eq!(stats.concept_count, 3);
//! assert_eq!(stats.batches_committed, 2);
//! ```

mod graph;
mod stats;

pub use graph::IsAGraph;
pub use stats::ClosureStats;

use std::time::Instant;

use fhirterm_types::{codec, ConceptId};
use tracing::{debug, error, info, warn};

use crate::config::{ClosureConfig, TraversalStrategy};
use crate::error::{ClosureError, ClosureResult};
use crate::record::{ClosureRecord, Direction, EncodedRecord};
use crate::store::{BatchWriter, ClosureStore};

/// Rebuilds the closure index of a [`ClosureStore`].
#[derive(Debug, Clone, Default)]
pub struct ClosureBuilder {
    config: ClosureConfig,
}

impl ClosureBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder with the given configuration.
    pub fn with_config(config: ClosureConfig) -> Self {
        Self { config }
    }

    /// Returns the builder configuration.
    pub fn config(&self) -> &ClosureConfig {
        &self.config
    }

    /// Performs a full rebuild of the store's closure index.
    ///
    /// # Errors
    ///
    /// Returns the first traversal, encoding, or storage error. Batches
    /// committed before the failure stay staged but never become live.
    pub fn rebuild<S: ClosureStore + ?Sized>(&self, store: &S) -> ClosureResult<ClosureStats> {
        self.rebuild_with_progress(store, |_, _| {})
    }

    /// Performs a full rebuild, reporting progress after every committed batch.
    ///
    /// The callback receives (concepts_written, total_concepts).
    pub fn rebuild_with_progress<S, F>(
        &self,
        store: &S,
        mut progress: F,
    ) -> ClosureResult<ClosureStats>
    where
        S: ClosureStore + ?Sized,
        F: FnMut(usize, usize),
    {
        self.config.validate()?;
        let start = Instant::now();

        let concept_ids = store.concept_ids()?;
        let relationship_count = store.edge_count()?;
        let total = concept_ids.len();

        let graph = match self.config.traversal {
            TraversalStrategy::InMemory => Some(IsAGraph::from_edges(store.edges()?)),
            TraversalStrategy::StoreQuery => None,
        };

        if self.config.parallel && (graph.is_none() || !cfg!(feature = "parallel")) {
            warn!("parallel rebuild needs the `parallel` feature and in-memory traversal; running sequentially");
        }

        info!(
            concepts = total,
            relationships = relationship_count,
            batch_size = self.config.batch_size,
            traversal = ?self.config.traversal,
            "closure rebuild started"
        );

        store.begin_rebuild()?;

        let mut totals = Totals::default();
        let mut batches_committed = 0;
        let mut written = 0;

        for (index, chunk) in concept_ids.chunks(self.config.batch_size).enumerate() {
            let mut batch_totals = Totals::default();

            let result = store.write_batch(&mut |writer: &mut dyn BatchWriter| {
                batch_totals = Totals::default();
                let records = match &graph {
                    Some(graph) => self.compute_in_memory(graph, chunk),
                    None => compute_with_store(writer, chunk)?,
                };
                for record in &records {
                    let encoded = encode_record(record, self.config.max_blob_bytes)?;
                    batch_totals.add(record, &encoded);
                    writer.put(&encoded)?;
                }
                Ok(())
            });

            if let Err(e) = result {
                if e.is_batch_fatal() {
                    warn!(batch = index + 1, error = %e, "closure batch rolled back");
                } else {
                    error!(batch = index + 1, error = %e, "closure store failed during batch");
                }
                return Err(e);
            }

            totals.merge(&batch_totals);
            batches_committed += 1;
            written += chunk.len();
            info!(
                batch = index + 1,
                concepts = chunk.len(),
                written,
                total,
                "closure batch committed"
            );
            progress(written, total);
        }

        let info = store.finish_rebuild(total)?;

        let stats = ClosureStats {
            concept_count: total,
            relationship_count,
            batches_committed,
            generation: info.generation,
            avg_ancestors: totals.average(totals.ancestors),
            avg_descendants: totals.average(totals.descendants),
            max_ancestors: totals.max_ancestors,
            max_descendants: totals.max_descendants,
            encoded_bytes: totals.bytes,
            build_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            generation = stats.generation,
            concepts = stats.concept_count,
            batches = stats.batches_committed,
            elapsed_ms = stats.build_time_ms,
            "closure rebuild finished"
        );

        Ok(stats)
    }

    #[cfg(feature = "parallel")]
    fn compute_in_memory(&self, graph: &IsAGraph, chunk: &[ConceptId]) -> Vec<ClosureRecord> {
        use rayon::prelude::*;

        if self.config.parallel {
            chunk
                .par_iter()
                .map(|&concept_id| record_from_graph(graph, concept_id))
                .collect()
        } else {
            chunk
                .iter()
                .map(|&concept_id| record_from_graph(graph, concept_id))
                .collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn compute_in_memory(&self, graph: &IsAGraph, chunk: &[ConceptId]) -> Vec<ClosureRecord> {
        chunk
            .iter()
            .map(|&concept_id| record_from_graph(graph, concept_id))
            .collect()
    }
}

fn record_from_graph(graph: &IsAGraph, concept_id: ConceptId) -> ClosureRecord {
    ClosureRecord {
        concept_id,
        ancestors: graph.ancestors(concept_id),
        descendants: graph.descendants(concept_id),
    }
}

fn compute_with_store(
    writer: &mut dyn BatchWriter,
    chunk: &[ConceptId],
) -> ClosureResult<Vec<ClosureRecord>> {
    chunk
        .iter()
        .map(|&concept_id| {
            Ok(ClosureRecord {
                concept_id,
                ancestors: writer.reachable(concept_id, Direction::Ancestors)?,
                descendants: writer.reachable(concept_id, Direction::Descendants)?,
            })
        })
        .collect()
}

fn encode_record(record: &ClosureRecord, max_blob_bytes: usize) -> ClosureResult<EncodedRecord> {
    let encoded = record.encode();
    for (side, blob) in [("ancestor", &encoded.ancestors), ("descendant", &encoded.descendants)] {
        if blob.len() > max_blob_bytes {
            return Err(ClosureError::encoding(
                record.concept_id,
                format!("{} set of {} bytes exceeds blob limit", side, blob.len()),
            ));
        }
    }
    debug!(
        concept_id = record.concept_id,
        ancestors = record.ancestors.len(),
        descendants = record.descendants.len(),
        "closure record encoded"
    );
    Ok(encoded)
}

#[derive(Debug, Default)]
struct Totals {
    count: usize,
    ancestors: usize,
    descendants: usize,
    max_ancestors: usize,
    max_descendants: usize,
    bytes: usize,
}

impl Totals {
    fn add(&mut self, record: &ClosureRecord, encoded: &EncodedRecord) {
        self.count += 1;
        self.ancestors += record.ancestors.len();
        self.descendants += record.descendants.len();
        self.max_ancestors = self.max_ancestors.max(record.ancestors.len());
        self.max_descendants = self.max_descendants.max(record.descendants.len());
        self.bytes += encoded.byte_len();
    }

    fn merge(&mut self, other: &Totals) {
        self.count += other.count;
        self.ancestors += other.ancestors;
        self.descendants += other.descendants;
        self.max_ancestors = self.max_ancestors.max(other.max_ancestors);
        self.max_descendants = self.max_descendants.max(other.max_descendants);
        self.bytes += other.bytes;
    }

    fn average(&self, sum: usize) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            sum as f64 / self.count as f64
        }
    }
}
