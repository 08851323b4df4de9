//! ValueSet expansion engine.

use std::sync::Arc;
use std::time::Instant;

use fhirterm_types::{ConceptSet, ValueSet};
use tracing::{debug, warn};

use crate::cache::FilterCache;
use crate::compiler::{CompiledFilters, FilterCompiler, Predicate, PredicateGroup};
use crate::config::ExpansionConfig;
use crate::error::{ExpandError, ExpandResult};
use crate::registry::CodeSystemRegistry;
use crate::result::{ExpandedCode, ExpansionIssue, ExpansionResult};
use crate::source::ValueSetSource;
use crate::traits::{CodeSystemReader, PropertyFilter};

/// Expands ValueSets against the code systems of a registry.
///
/// For every system the ValueSet references:
///
/// 1. each include group yields the concepts matching all of its predicates;
/// 2. the include groups are unioned;
/// 3. the exclude groups are evaluated and unioned the same way;
/// 4. the system contributes include minus exclude.
///
/// Unknown systems contribute nothing (or fail in strict mode). A group with
/// a filter its system cannot evaluate matches nothing; the reason is kept in
/// [`ExpansionResult::issues`].
///
/// # Example
///
/// ```rust
/// use fhirterm_closure::{ClosureBuilder, IsAEdge, MemoryStore};
/// use fhirterm_expand::{CodeSystemRegistry, ExpansionEvaluator, SnomedCodeSystem};
/// use fhirterm_types::{Compose, ComposeRule, ValueSet};
///
/// let store = MemoryStore::with_edges([IsAEdge::new(200, 100), IsAEdge::new(300, 100)]);
/// ClosureBuilder::new().rebuild(&store).unwrap();
///
/// let mut registry = CodeSystemRegistry::new();
/// registry.register(SnomedCodeSystem::new(store));
///
/// let vs = ValueSet {
///     compose: Some(Compose {
///         include: vec![ComposeRule::for_system("http://snomed.info/sct")
///             .with_filter("concept", "descendent-of", "100")],
///         exclude: vec![ComposeRule::for_system("http://snomed.info/sct")
///             .with_concepts(["300"])],
///     }),
///     ..Default::default()
/// };
///
/// let result = ExpansionEvaluator::new(&registry).expand(&vs).unwrap();
/// let snomed = result.system("http://snomed.info/sct").unwrap();
/// assert_eq!(snomed.to_sorted_vec(), vec![200]);
/// ```
pub struct ExpansionEvaluator<'a> {
    /// Code systems by URL.
    registry: &'a CodeSystemRegistry,
    /// Evaluator configuration.
    config: ExpansionConfig,
    /// Attribute filter cache (optional).
    cache: Option<Arc<FilterCache>>,
}

impl<'a> ExpansionEvaluator<'a> {
    /// Creates an evaluator with default configuration.
    pub fn new(registry: &'a CodeSystemRegistry) -> Self {
        Self::with_config(registry, ExpansionConfig::default())
    }

    /// Creates an evaluator with custom configuration.
    pub fn with_config(registry: &'a CodeSystemRegistry, config: ExpansionConfig) -> Self {
        let cache = config
            .cache
            .as_ref()
            .map(|cache_config| Arc::new(FilterCache::new(cache_config)));
        Self {
            registry,
            config,
            cache,
        }
    }

    /// Returns a reference to the filter cache if enabled.
    pub fn cache(&self) -> Option<&FilterCache> {
        self.cache.as_deref()
    }

    /// Returns the evaluator configuration.
    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    /// Expands a ValueSet document.
    pub fn expand(&self, value_set: &ValueSet) -> ExpandResult<ExpansionResult> {
        let compiled = FilterCompiler::compile(value_set);
        self.expand_compiled(&compiled)
    }

    /// Looks up a ValueSet by id and expands it.
    ///
    /// # Errors
    ///
    /// Returns [`ExpandError::ValueSetNotFound`] if the source has no such id.
    pub fn expand_by_id(
        &self,
        source: &dyn ValueSetSource,
        id: &str,
    ) -> ExpandResult<ExpansionResult> {
        let value_set = source
            .find_value_set(id)?
            .ok_or_else(|| ExpandError::ValueSetNotFound(id.to_string()))?;
        debug!(id, "expanding value set");
        self.expand(&value_set)
    }

    /// Expands already compiled filters.
    pub fn expand_compiled(&self, compiled: &CompiledFilters) -> ExpandResult<ExpansionResult> {
        let start = Instant::now();
        let mut result = ExpansionResult::empty();
        let mut total = 0;

        for (system, filters) in compiled {
            self.check_timeout(start)?;

            let Some(code_system) = self.registry.get(system) else {
                if self.config.strict {
                    return Err(ExpandError::UnknownCodeSystem(system.clone()));
                }
                warn!(system = %system, "unknown code system, expanding to nothing");
                result.issues.push(ExpansionIssue::UnknownCodeSystem {
                    system: system.clone(),
                });
                result.systems.insert(system.clone(), ConceptSet::new());
                continue;
            };

            let reader = code_system.open()?;
            result.stats.systems_evaluated += 1;

            let included =
                self.evaluate_groups(system, reader.as_ref(), &filters.include, start, &mut result)?;
            let concepts = if included.is_empty() || filters.exclude.is_empty() {
                included
            } else {
                let excluded = self.evaluate_groups(
                    system,
                    reader.as_ref(),
                    &filters.exclude,
                    start,
                    &mut result,
                )?;
                included.difference(&excluded)
            };

            debug!(
                system = %system,
                include_groups = filters.include.len(),
                exclude_groups = filters.exclude.len(),
                concepts = concepts.len(),
                "system expanded"
            );

            total += concepts.len();
            if let Some(limit) = self.config.max_results {
                if total > limit {
                    return Err(ExpandError::ResultTooLarge {
                        count: total,
                        limit,
                    });
                }
            }

            result.codes.extend(concepts.iter().filter_map(|concept_id| {
                reader.code_for(concept_id).map(|code| ExpandedCode {
                    system: system.clone(),
                    code,
                })
            }));
            result.systems.insert(system.clone(), concepts);
        }

        result.codes.sort_unstable();
        result.stats.duration = start.elapsed();
        Ok(result)
    }

    /// Union of the concepts matching any group.
    fn evaluate_groups(
        &self,
        system: &str,
        reader: &dyn CodeSystemReader,
        groups: &[PredicateGroup],
        start: Instant,
        result: &mut ExpansionResult,
    ) -> ExpandResult<ConceptSet> {
        let mut matched = ConceptSet::new();

        for group in groups {
            self.check_timeout(start)?;
            result.stats.groups_evaluated += 1;

            match self.evaluate_group(system, reader, group, result) {
                Ok(concepts) => matched.absorb(&concepts),
                Err(e) => match ExpansionIssue::from_group_error(system, &e) {
                    Some(issue) => {
                        warn!(system, error = %e, "filter group matches nothing");
                        result.stats.groups_failed += 1;
                        result.issues.push(issue);
                    }
                    None => return Err(e),
                },
            }
        }

        Ok(matched)
    }

    /// Intersection of the concepts matching each predicate.
    fn evaluate_group(
        &self,
        system: &str,
        reader: &dyn CodeSystemReader,
        group: &PredicateGroup,
        result: &mut ExpansionResult,
    ) -> ExpandResult<ConceptSet> {
        let mut matched: Option<ConceptSet> = None;

        for predicate in group.iter() {
            let concepts = match predicate {
                Predicate::In { concepts } => {
                    let resolved = reader.resolve_codes(concepts)?;
                    for code in resolved.unknown {
                        debug!(system, code = %code, "skipping unknown code");
                        result.issues.push(ExpansionIssue::UnknownCode {
                            system: system.to_string(),
                            code,
                        });
                    }
                    resolved.concepts
                }
                Predicate::Property {
                    property,
                    op,
                    value,
                } => {
                    let filter = PropertyFilter::new(property.as_str(), op, value.as_str());
                    self.evaluate_filter(system, reader, &filter, result)?
                }
            };

            matched = Some(match matched {
                None => concepts,
                Some(previous) => previous.intersect(&concepts),
            });
        }

        Ok(matched.unwrap_or_default())
    }

    fn evaluate_filter(
        &self,
        system: &str,
        reader: &dyn CodeSystemReader,
        filter: &PropertyFilter,
        result: &mut ExpansionResult,
    ) -> ExpandResult<ConceptSet> {
        let Some(cache) = &self.cache else {
            return reader.evaluate(filter);
        };

        let snapshot = reader.snapshot();
        if let Some(cached) = cache.get(system, snapshot, filter) {
            result.stats.cache_hits += 1;
            return Ok(cached.as_ref().clone());
        }

        let concepts = reader.evaluate(filter)?;
        cache.put(system, snapshot, filter, Arc::new(concepts.clone()));
        Ok(concepts)
    }

    fn check_timeout(&self, start: Instant) -> ExpandResult<()> {
        match self.config.timeout {
            Some(timeout) if start.elapsed() >= timeout => Err(ExpandError::Timeout(timeout)),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for ExpansionEvaluator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpansionEvaluator")
            .field("registry", self.registry)
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}
