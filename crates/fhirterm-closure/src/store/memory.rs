//! In-memory closure store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use fhirterm_types::{ConceptId, ConceptSet};
use parking_lot::{Mutex, RwLock};

use super::{BatchWriter, ClosureIndex, ClosureReader, ClosureStore};
use crate::closure::IsAGraph;
use crate::error::{ClosureError, ClosureResult};
use crate::record::{Direction, EncodedRecord, IsAEdge, RebuildInfo};

/// Edge relation and closure index held entirely in memory.
///
/// The live index is an immutable snapshot behind an `Arc`; a finished rebuild
/// swaps in a new snapshot, so open readers keep the one they started with.
///
/// # Example
///
/// ```rust
/// use fhirterm_closure::{ClosureBuilder, ClosureIndex, IsAEdge, MemoryStore};
///
/// let store = MemoryStore::with_edges([IsAEdge::new(200, 100), IsAEdge::new(300, 100)]);
/// ClosureBuilder::new().rebuild(&store).unwrap();
///
/// let reader = store.reader().unwrap();
/// let root = reader.record(100).unwrap().unwrap();
/// assert_eq!(root.descendants.to_sorted_vec(), vec![200, 300]);
/// ```
#[derive(Default)]
pub struct MemoryStore {
    edges: RwLock<Vec<IsAEdge>>,
    rebuild: Mutex<Option<RebuildState>>,
    live: RwLock<Arc<Snapshot>>,
    failing_concept: Mutex<Option<ConceptId>>,
}

struct RebuildState {
    graph: IsAGraph,
    staged: BTreeMap<ConceptId, EncodedRecord>,
}

#[derive(Default)]
struct Snapshot {
    info: Option<RebuildInfo>,
    records: BTreeMap<ConceptId, EncodedRecord>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given edge relation.
    pub fn with_edges<I: IntoIterator<Item = IsAEdge>>(edges: I) -> Self {
        let store = Self::new();
        store.insert_edges(edges);
        store
    }

    /// Appends edges to the relation. Takes effect at the next rebuild.
    pub fn insert_edges<I: IntoIterator<Item = IsAEdge>>(&self, edges: I) {
        self.edges.write().extend(edges);
    }

    /// Replaces the whole edge relation. Takes effect at the next rebuild.
    pub fn replace_edges<I: IntoIterator<Item = IsAEdge>>(&self, edges: I) {
        *self.edges.write() = edges.into_iter().collect();
    }

    /// Makes every traversal seeded at `concept_id` fail, or clears the fault with `None`.
    pub fn fail_traversal_for(&self, concept_id: Option<ConceptId>) {
        *self.failing_concept.lock() = concept_id;
    }

    /// Number of records staged by the rebuild in progress.
    pub fn staged_count(&self) -> usize {
        self.rebuild
            .lock()
            .as_ref()
            .map(|state| state.staged.len())
            .unwrap_or(0)
    }

    /// Number of records in the live index.
    pub fn live_count(&self) -> usize {
        self.live.read().records.len()
    }
}

impl ClosureStore for MemoryStore {
    fn concept_ids(&self) -> ClosureResult<Vec<ConceptId>> {
        let mut ids: Vec<ConceptId> = self
            .edges
            .read()
            .iter()
            .flat_map(|edge| [edge.source, edge.destination])
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn edges(&self) -> ClosureResult<Vec<IsAEdge>> {
        Ok(self.edges.read().clone())
    }

    fn edge_count(&self) -> ClosureResult<usize> {
        Ok(self.edges.read().len())
    }

    fn begin_rebuild(&self) -> ClosureResult<()> {
        let graph = IsAGraph::from_edges(self.edges.read().iter().copied());
        *self.rebuild.lock() = Some(RebuildState {
            graph,
            staged: BTreeMap::new(),
        });
        Ok(())
    }

    fn write_batch(
        &self,
        f: &mut dyn FnMut(&mut dyn BatchWriter) -> ClosureResult<()>,
    ) -> ClosureResult<()> {
        let failing_concept = *self.failing_concept.lock();
        let mut rebuild = self.rebuild.lock();
        let state = rebuild
            .as_mut()
            .ok_or_else(|| ClosureError::Store("no rebuild in progress".into()))?;

        let staged = {
            let mut batch = MemoryBatch {
                graph: &state.graph,
                staged: BTreeMap::new(),
                failing_concept,
            };
            f(&mut batch)?;
            batch.staged
        };

        state.staged.extend(staged);
        Ok(())
    }

    fn finish_rebuild(&self, concept_count: usize) -> ClosureResult<RebuildInfo> {
        let state = self
            .rebuild
            .lock()
            .take()
            .ok_or_else(|| ClosureError::Store("no rebuild in progress".into()))?;

        if state.staged.len() != concept_count {
            return Err(ClosureError::Store(format!(
                "staged {} records, expected {}",
                state.staged.len(),
                concept_count
            )));
        }

        let mut live = self.live.write();
        let info = RebuildInfo {
            generation: live.info.as_ref().map(|i| i.generation).unwrap_or(0) + 1,
            built_at: Utc::now(),
            concept_count,
        };
        *live = Arc::new(Snapshot {
            info: Some(info.clone()),
            records: state.staged,
        });
        Ok(info)
    }
}

impl ClosureIndex for MemoryStore {
    fn reader(&self) -> ClosureResult<Box<dyn ClosureReader + '_>> {
        Ok(Box::new(MemoryReader {
            snapshot: Arc::clone(&self.live.read()),
        }))
    }
}

struct MemoryBatch<'a> {
    graph: &'a IsAGraph,
    staged: BTreeMap<ConceptId, EncodedRecord>,
    failing_concept: Option<ConceptId>,
}

impl BatchWriter for MemoryBatch<'_> {
    fn reachable(&mut self, seed: ConceptId, direction: Direction) -> ClosureResult<ConceptSet> {
        if self.failing_concept == Some(seed) {
            return Err(ClosureError::traversal(seed, "injected traversal failure"));
        }
        Ok(self.graph.reachable(seed, direction))
    }

    fn put(&mut self, record: &EncodedRecord) -> ClosureResult<()> {
        self.staged.insert(record.concept_id, record.clone());
        Ok(())
    }
}

struct MemoryReader {
    snapshot: Arc<Snapshot>,
}

impl ClosureReader for MemoryReader {
    fn info(&self) -> Option<&RebuildInfo> {
        self.snapshot.info.as_ref()
    }

    fn encoded_record(&self, concept_id: ConceptId) -> ClosureResult<Option<EncodedRecord>> {
        Ok(self.snapshot.records.get(&concept_id).cloned())
    }

    fn contains(&self, concept_id: ConceptId) -> ClosureResult<bool> {
        Ok(self.snapshot.records.contains_key(&concept_id))
    }

    fn concept_ids(&self) -> ClosureResult<Vec<ConceptId>> {
        Ok(self.snapshot.records.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirterm_types::codec;

    fn record(concept_id: ConceptId) -> EncodedRecord {
        EncodedRecord {
            concept_id,
            ancestors: codec::encode(&ConceptSet::new()),
            descendants: codec::encode(&ConceptSet::new()),
        }
    }

    #[test]
    fn test_concept_ids_from_both_endpoints() {
        let store = MemoryStore::with_edges([IsAEdge::new(3, 1), IsAEdge::new(2, 1)]);
        assert_eq!(store.concept_ids().unwrap(), vec![1, 2, 3]);
        assert_eq!(store.edge_count().unwrap(), 2);
    }

    #[test]
    fn test_write_batch_requires_rebuild() {
        let store = MemoryStore::new();
        let result = store.write_batch(&mut |_| Ok(()));
        assert!(matches!(result, Err(ClosureError::Store(_))));
    }

    #[test]
    fn test_failed_batch_is_discarded() {
        let store = MemoryStore::new();
        store.begin_rebuild().unwrap();

        store
            .write_batch(&mut |w| w.put(&record(1)))
            .unwrap();
        let result = store.write_batch(&mut |w| {
            w.put(&record(2))?;
            Err(ClosureError::traversal(3, "boom"))
        });

        assert!(result.is_err());
        assert_eq!(store.staged_count(), 1);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_reader_keeps_its_snapshot() {
        let store = MemoryStore::new();
        store.begin_rebuild().unwrap();
        store.write_batch(&mut |w| w.put(&record(1))).unwrap();
        store.finish_rebuild(1).unwrap();

        let old_reader = store.reader().unwrap();
        assert_eq!(old_reader.generation(), 1);

        store.begin_rebuild().unwrap();
        store
            .write_batch(&mut |w| {
                w.put(&record(1))?;
                w.put(&record(2))
            })
            .unwrap();
        store.finish_rebuild(2).unwrap();

        assert_eq!(old_reader.concept_ids().unwrap(), vec![1]);
        let new_reader = store.reader().unwrap();
        assert_eq!(new_reader.generation(), 2);
        assert_eq!(new_reader.concept_ids().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_finish_rejects_incomplete_staging() {
        let store = MemoryStore::new();
        store.begin_rebuild().unwrap();
        store.write_batch(&mut |w| w.put(&record(1))).unwrap();
        assert!(store.finish_rebuild(2).is_err());
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_injected_traversal_failure() {
        let store = MemoryStore::with_edges([IsAEdge::new(2, 1)]);
        store.fail_traversal_for(Some(2));
        store.begin_rebuild().unwrap();

        let result = store.write_batch(&mut |w| w.reachable(2, Direction::Ancestors).map(|_| ()));
        assert!(matches!(
            result,
            Err(ClosureError::Traversal { concept_id: 2, .. })
        ));

        store.fail_traversal_for(None);
        store
            .write_batch(&mut |w| {
                assert_eq!(w.reachable(2, Direction::Ancestors)?.to_sorted_vec(), vec![1]);
                Ok(())
            })
            .unwrap();
    }
}
