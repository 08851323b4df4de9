//! # fhirterm-expand
//!
//! FHIR ValueSet expansion over registered code systems.
//!
//! A ValueSet's `compose` section is compiled into per-system predicate
//! groups ([`FilterCompiler`]) and evaluated by the [`ExpansionEvaluator`]:
//! groups are ORed, predicates within a group are ANDed, and each system
//! contributes its includes minus its excludes.
//!
//! ## Code systems
//!
//! - [`SnomedCodeSystem`]: hierarchy filters (`is-a`, `descendent-of`,
//!   `generalizes`, ...) answered from a precomputed closure index
//! - [`PropertyTableCodeSystem`]: flat code systems (LOINC-style) filtered by
//!   property value
//! - anything implementing [`CodeSystem`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use fhirterm_closure::{ClosureBuilder, SqliteStore};
//! use fhirterm_expand::{
//!     CodeSystemRegistry, ExpansionConfig, ExpansionEvaluator, InMemoryValueSets,
//!     SnomedCodeSystem,
//! };
//!
//! let store = SqliteStore::open("terminology.db")?;
//! ClosureBuilder::new().rebuild(&store)?;
//!
//! let mut registry = CodeSystemRegistry::new();
//! registry.register(SnomedCodeSystem::new(store));
//!
//! let mut value_sets = InMemoryValueSets::new();
//! value_sets.load_json(&std::fs::read_to_string("diabetes.json")?)?;
//!
//! let evaluator = ExpansionEvaluator::with_config(&registry, ExpansionConfig::default());
//! let result = evaluator.expand_by_id(&value_sets, "diabetes")?;
//! for code in &result.codes {
//!     println!("{} {}", code.system, code.code);
//! }
//! ```
//!
//! ## Partial failures
//!
//! A filter a code system cannot evaluate (unsupported operator, malformed
//! value, unknown anchor concept) makes only its own group match nothing.
//! Each such condition is listed in [`ExpansionResult::issues`].

pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod property_table;
pub mod registry;
pub mod result;
pub mod snomed;
pub mod source;
pub mod traits;

pub use cache::{CacheStats, FilterCache, RecordCache};
pub use compiler::{
    CompiledFilterSet, CompiledFilters, FilterCompiler, Predicate, PredicateGroup,
    CONCEPT_PROPERTY, IN_OP,
};
pub use config::{CacheConfig, ExpansionConfig, ExpansionConfigBuilder};
pub use error::{ExpandError, ExpandResult};
pub use evaluator::ExpansionEvaluator;
pub use property_table::{PropertyRow, PropertyTableCodeSystem, CODE_PROPERTY, DISPLAY_PROPERTY};
pub use registry::CodeSystemRegistry;
pub use result::{ExpandedCode, ExpansionIssue, ExpansionResult, ExpansionStats};
pub use snomed::{SnomedCodeSystem, SNOMED_URL};
pub use source::{InMemoryValueSets, ValueSetSource};
pub use traits::{CodeSystem, CodeSystemReader, FilterOperator, PropertyFilter, ResolvedCodes};

// Re-export from fhirterm-types for convenience
pub use fhirterm_types::{ConceptId, ConceptSet, ValueSet};
