//! Code system capability interface.
//!
//! The evaluator knows nothing about how a terminology answers a filter. Each
//! code system implements [`CodeSystem`] and is registered under its URL in a
//! [`CodeSystemRegistry`](crate::CodeSystemRegistry).
//!
//! # Example: a fixed list of codes
//!
//! ```rust
//! use fhirterm_expand::{
//!     CodeSystem, CodeSystemReader, ExpandError, ExpandResult, PropertyFilter, ResolvedCodes,
//! };
//! use fhirterm_types::{ConceptId, ConceptReference, ConceptSet};
//!
//! struct Genders;
//!
//! const CODES: [&str; 4] = ["male", "female", "other", "unknown"];
//!
//! impl CodeSystem for Genders {
//!     fn url(&self) -> &str {
//!         "http://hl7.org/fhir/administrative-gender"
//!     }
//!
//!     fn open(&self) -> ExpandResult<Box<dyn CodeSystemReader + '_>> {
//!         Ok(Box::new(GendersReader))
//!     }
//! }
//!
//! struct GendersReader;
//!
//! impl CodeSystemReader for GendersReader {
//!     fn resolve_codes(&self, concepts: &[ConceptReference]) -> ExpandResult<ResolvedCodes> {
//!         let mut resolved = ResolvedCodes::default();
//!         for concept in concepts {
//!             match CODES.iter().position(|c| *c == concept.code) {
//!                 Some(i) => { resolved.concepts.add(i as ConceptId); }
//!                 None => resolved.unknown.push(concept.code.clone()),
//!             }
//!         }
//!         Ok(resolved)
//!     }
//!
//!     fn evaluate(&self, filter: &PropertyFilter) -> ExpandResult<ConceptSet> {
//!         Err(filter.unsupported("http://hl7.org/fhir/administrative-gender"))
//!     }
//!
//!     fn code_for(&self, concept_id: ConceptId) -> Option<String> {
//!         CODES.get(concept_id as usize).map(|c| c.to_string())
//!     }
//! }
//! ```

use std::fmt;

use fhirterm_types::{ConceptId, ConceptReference, ConceptSet};

use crate::error::{ExpandError, ExpandResult};

/// FHIR filter operator codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// `=`
    Equals,
    /// `is-a`: the concept and everything below it.
    IsA,
    /// `descendent-of`: everything below the concept.
    DescendentOf,
    /// `is-not-a`: everything except the concept and its descendants.
    IsNotA,
    /// `regex`
    Regex,
    /// `in`: comma-separated list.
    In,
    /// `not-in`: comma-separated list.
    NotIn,
    /// `generalizes`: the concept and everything above it.
    Generalizes,
    /// `exists`: value is `true` or `false`.
    Exists,
    /// Any other operator code.
    Other(String),
}

impl FilterOperator {
    /// Parses a FHIR operator code. Unknown codes are kept as [`FilterOperator::Other`].
    pub fn parse(code: &str) -> Self {
        match code {
            "=" => Self::Equals,
            "is-a" => Self::IsA,
            "descendent-of" => Self::DescendentOf,
            "is-not-a" => Self::IsNotA,
            "regex" => Self::Regex,
            "in" => Self::In,
            "not-in" => Self::NotIn,
            "generalizes" => Self::Generalizes,
            "exists" => Self::Exists,
            other => Self::Other(other.to_string()),
        }
    }

    /// The FHIR operator code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Equals => "=",
            Self::IsA => "is-a",
            Self::DescendentOf => "descendent-of",
            Self::IsNotA => "is-not-a",
            Self::Regex => "regex",
            Self::In => "in",
            Self::NotIn => "not-in",
            Self::Generalizes => "generalizes",
            Self::Exists => "exists",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attribute filter handed to a code system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyFilter {
    /// Property name.
    pub property: String,
    /// Parsed operator.
    pub op: FilterOperator,
    /// Filter value.
    pub value: String,
}

impl PropertyFilter {
    /// Creates a filter, parsing the operator code.
    pub fn new(property: impl Into<String>, op: &str, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            op: FilterOperator::parse(op),
            value: value.into(),
        }
    }

    /// Splits an `in` / `not-in` value on commas, trimming blanks.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.value
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// The error for a filter the system cannot evaluate.
    pub fn unsupported(&self, system: &str) -> ExpandError {
        ExpandError::UnsupportedPredicate {
            system: system.to_string(),
            property: self.property.clone(),
            op: self.op.to_string(),
        }
    }

    /// The error for a value the operator cannot accept.
    pub fn invalid_value(&self, message: impl Into<String>) -> ExpandError {
        ExpandError::InvalidFilterValue {
            property: self.property.clone(),
            op: self.op.to_string(),
            value: self.value.clone(),
            message: message.into(),
        }
    }
}

impl fmt::Display for PropertyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.op, self.value)
    }
}

/// Codes of an explicit concept list, split into known and unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCodes {
    /// Ids of the codes the system knows.
    pub concepts: ConceptSet,
    /// Codes the system does not know, in document order.
    pub unknown: Vec<String>,
}

/// A terminology that can take part in ValueSet expansion.
pub trait CodeSystem: Send + Sync {
    /// Canonical URL, without trailing `/`.
    fn url(&self) -> &str;

    /// Opens a reader over one consistent view of the terminology.
    fn open(&self) -> ExpandResult<Box<dyn CodeSystemReader + '_>>;
}

/// A consistent view of a code system for the duration of one expansion.
pub trait CodeSystemReader {
    /// Maps explicitly enumerated codes to concept ids.
    fn resolve_codes(&self, concepts: &[ConceptReference]) -> ExpandResult<ResolvedCodes>;

    /// All concepts satisfying an attribute filter.
    ///
    /// # Errors
    ///
    /// Returns [`ExpandError::UnsupportedPredicate`] for a property/operator
    /// pair the system does not evaluate, [`ExpandError::InvalidFilterValue`]
    /// for a malformed value, and [`ExpandError::UnknownCode`] when the filter
    /// is anchored on a code the system does not know.
    fn evaluate(&self, filter: &PropertyFilter) -> ExpandResult<ConceptSet>;

    /// The code of a concept id produced by this reader.
    fn code_for(&self, concept_id: ConceptId) -> Option<String>;

    /// Identifies the data version the reader sees; results of
    /// [`evaluate`](Self::evaluate) may be cached under it.
    fn snapshot(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_round_trip() {
        for code in [
            "=",
            "is-a",
            "descendent-of",
            "is-not-a",
            "regex",
            "in",
            "not-in",
            "generalizes",
            "exists",
            "child-of",
        ] {
            assert_eq!(FilterOperator::parse(code).as_str(), code);
        }
        assert_eq!(
            FilterOperator::parse("child-of"),
            FilterOperator::Other("child-of".into())
        );
    }

    #[test]
    fn test_filter_values_split() {
        let filter = PropertyFilter::new("concept", "in", "123, 456,,789 ");
        assert_eq!(filter.values().collect::<Vec<_>>(), vec!["123", "456", "789"]);
        assert_eq!(filter.op, FilterOperator::In);
    }

    #[test]
    fn test_filter_errors() {
        let filter = PropertyFilter::new("concept", "regex", "^7");
        assert!(matches!(
            filter.unsupported("http://snomed.info/sct"),
            ExpandError::UnsupportedPredicate { ref op, .. } if op == "regex"
        ));
        assert!(filter.invalid_value("bad").is_group_local());
        assert_eq!(filter.to_string(), "concept regex ^7");
    }
}
