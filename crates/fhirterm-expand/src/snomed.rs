//! SNOMED CT code system over a closure index.

use std::cell::OnceCell;
use std::sync::Arc;

use fhirterm_closure::{ClosureIndex, ClosureReader, ClosureRecord};
use fhirterm_types::{normalize_system_url, ConceptId, ConceptReference, ConceptSet};
use tracing::trace;

use crate::cache::{CacheStats, RecordCache};
use crate::compiler::CONCEPT_PROPERTY;
use crate::config::CacheConfig;
use crate::error::{ExpandError, ExpandResult};
use crate::traits::{CodeSystem, CodeSystemReader, FilterOperator, PropertyFilter, ResolvedCodes};

/// Canonical SNOMED CT system URL.
pub const SNOMED_URL: &str = "http://snomed.info/sct";

/// SNOMED CT answered from a precomputed closure index.
///
/// Filters on property `concept`:
///
/// | Operator | Result |
/// |----------|--------|
/// | `is-a` | the concept and its descendants |
/// | `descendent-of` | the descendants |
/// | `generalizes` | the concept and its ancestors |
/// | `=` | the concept |
/// | `is-not-a` | every indexed concept except the concept and its descendants |
/// | `in` | the listed concepts that are indexed |
/// | `not-in` | every indexed concept except the listed ones |
///
/// Each expansion reads one snapshot of the index, so a concurrent rebuild
/// is either fully visible or not at all.
///
/// # Example
///
/// ```rust
/// use fhirterm_closure::{ClosureBuilder, IsAEdge, MemoryStore};
/// use fhirterm_expand::{CodeSystem, PropertyFilter, SnomedCodeSystem};
///
/// let store = MemoryStore::with_edges([IsAEdge::new(46635009, 73211009)]);
/// ClosureBuilder::new().rebuild(&store).unwrap();
///
/// let snomed = SnomedCodeSystem::new(store);
/// let reader = snomed.open().unwrap();
/// let diabetes = reader
///     .evaluate(&PropertyFilter::new("concept", "is-a", "73211009"))
///     .unwrap();
/// assert_eq!(diabetes.to_sorted_vec(), vec![46635009, 73211009]);
/// ```
pub struct SnomedCodeSystem<I> {
    index: I,
    url: String,
    cache: Option<RecordCache>,
}

impl<I: ClosureIndex> SnomedCodeSystem<I> {
    /// Creates the code system under [`SNOMED_URL`], without a record cache.
    pub fn new(index: I) -> Self {
        Self {
            index,
            url: SNOMED_URL.to_string(),
            cache: None,
        }
    }

    /// Serves the index under another URL (e.g. an edition URL).
    pub fn with_url(mut self, url: impl AsRef<str>) -> Self {
        self.url = normalize_system_url(url.as_ref()).to_string();
        self
    }

    /// Caches decoded closure records across expansions.
    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(RecordCache::new(&config));
        self
    }

    /// The underlying closure index.
    pub fn index(&self) -> &I {
        &self.index
    }

    /// Record cache statistics, if caching is enabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(RecordCache::stats)
    }
}

impl<I: ClosureIndex> CodeSystem for SnomedCodeSystem<I> {
    fn url(&self) -> &str {
        &self.url
    }

    fn open(&self) -> ExpandResult<Box<dyn CodeSystemReader + '_>> {
        Ok(Box::new(SnomedReader {
            url: &self.url,
            reader: self.index.reader()?,
            cache: self.cache.as_ref(),
            all: OnceCell::new(),
        }))
    }
}

struct SnomedReader<'a> {
    url: &'a str,
    reader: Box<dyn ClosureReader + 'a>,
    cache: Option<&'a RecordCache>,
    all: OnceCell<ConceptSet>,
}

impl SnomedReader<'_> {
    fn record(&self, concept_id: ConceptId) -> ExpandResult<Option<Arc<ClosureRecord>>> {
        let generation = self.reader.generation();

        if let Some(record) = self.cache.and_then(|c| c.get(generation, concept_id)) {
            return Ok(Some(record));
        }

        let Some(record) = self.reader.record(concept_id)? else {
            return Ok(None);
        };
        let record = Arc::new(record);
        if let Some(cache) = self.cache {
            cache.put(generation, Arc::clone(&record));
        }
        Ok(Some(record))
    }

    /// Record of the concept a filter is anchored on.
    fn anchor(&self, filter: &PropertyFilter) -> ExpandResult<Arc<ClosureRecord>> {
        let concept_id = parse_concept_id(filter, filter.value.trim())?;
        self.record(concept_id)?
            .ok_or_else(|| ExpandError::UnknownCode {
                system: self.url.to_string(),
                code: filter.value.clone(),
            })
    }

    fn all_concepts(&self) -> ExpandResult<&ConceptSet> {
        if let Some(all) = self.all.get() {
            return Ok(all);
        }
        let all: ConceptSet = self.reader.concept_ids()?.into_iter().collect();
        Ok(self.all.get_or_init(|| all))
    }

    fn listed(&self, filter: &PropertyFilter) -> ExpandResult<ConceptSet> {
        filter
            .values()
            .map(|code| parse_concept_id(filter, code))
            .collect()
    }
}

impl CodeSystemReader for SnomedReader<'_> {
    fn resolve_codes(&self, concepts: &[ConceptReference]) -> ExpandResult<ResolvedCodes> {
        let mut resolved = ResolvedCodes::default();
        for concept in concepts {
            match concept.code.trim().parse::<ConceptId>() {
                Ok(id) if self.reader.contains(id)? => {
                    resolved.concepts.add(id);
                }
                _ => resolved.unknown.push(concept.code.clone()),
            }
        }
        Ok(resolved)
    }

    fn evaluate(&self, filter: &PropertyFilter) -> ExpandResult<ConceptSet> {
        if filter.property != CONCEPT_PROPERTY {
            return Err(filter.unsupported(self.url));
        }
        trace!(system = self.url, %filter, "evaluating filter");

        let result = match &filter.op {
            FilterOperator::IsA => self.anchor(filter)?.descendants_or_self(),
            FilterOperator::DescendentOf => self.anchor(filter)?.descendants.clone(),
            FilterOperator::Generalizes => self.anchor(filter)?.ancestors_or_self(),
            FilterOperator::Equals => {
                let record = self.anchor(filter)?;
                ConceptSet::from_slice(&[record.concept_id])
            }
            FilterOperator::IsNotA => {
                let excluded = self.anchor(filter)?.descendants_or_self();
                self.all_concepts()?.difference(&excluded)
            }
            FilterOperator::In => self.listed(filter)?.intersect(self.all_concepts()?),
            FilterOperator::NotIn => {
                let excluded = self.listed(filter)?;
                self.all_concepts()?.difference(&excluded)
            }
            _ => return Err(filter.unsupported(self.url)),
        };

        Ok(result)
    }

    fn code_for(&self, concept_id: ConceptId) -> Option<String> {
        Some(concept_id.to_string())
    }

    fn snapshot(&self) -> u64 {
        self.reader.generation()
    }
}

fn parse_concept_id(filter: &PropertyFilter, code: &str) -> ExpandResult<ConceptId> {
    code.parse::<ConceptId>()
        .map_err(|_| filter.invalid_value(format!("{:?} is not a SNOMED CT concept id", code)))
}
