//! Expansion result types.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use fhirterm_types::{normalize_system_url, ConceptId, ConceptSet};

use crate::error::ExpandError;

/// One code of an expansion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpandedCode {
    /// Normalized system URL.
    pub system: String,
    /// Code within the system.
    pub code: String,
}

/// A condition that made part of a ValueSet contribute nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionIssue {
    /// No code system is registered for the URL; it contributed an empty set.
    UnknownCodeSystem {
        /// Normalized system URL.
        system: String,
    },
    /// A filter the system cannot evaluate; its group matched nothing.
    UnsupportedPredicate {
        /// Normalized system URL.
        system: String,
        /// Filter property.
        property: String,
        /// Filter operator code.
        op: String,
    },
    /// A malformed filter value; its group matched nothing.
    InvalidFilter {
        /// Normalized system URL.
        system: String,
        /// Description of the problem.
        message: String,
    },
    /// A code the system does not know. In a concept list the code is
    /// skipped; as a filter anchor its group matched nothing.
    UnknownCode {
        /// Normalized system URL.
        system: String,
        /// The code as written.
        code: String,
    },
}

impl ExpansionIssue {
    /// Converts an error that only invalidates one group into an issue.
    ///
    /// Returns `None` for errors that must abort the expansion.
    pub fn from_group_error(system: &str, error: &ExpandError) -> Option<Self> {
        let issue = match error {
            ExpandError::UnsupportedPredicate { property, op, .. } => Self::UnsupportedPredicate {
                system: system.to_string(),
                property: property.clone(),
                op: op.clone(),
            },
            ExpandError::InvalidFilterValue { .. } => Self::InvalidFilter {
                system: system.to_string(),
                message: error.to_string(),
            },
            ExpandError::UnknownCode { code, .. } => Self::UnknownCode {
                system: system.to_string(),
                code: code.clone(),
            },
            _ => return None,
        };
        Some(issue)
    }

    /// System the issue belongs to.
    pub fn system(&self) -> &str {
        match self {
            Self::UnknownCodeSystem { system }
            | Self::UnsupportedPredicate { system, .. }
            | Self::InvalidFilter { system, .. }
            | Self::UnknownCode { system, .. } => system,
        }
    }
}

impl fmt::Display for ExpansionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCodeSystem { system } => write!(f, "unknown code system {}", system),
            Self::UnsupportedPredicate {
                system,
                property,
                op,
            } => write!(f, "unsupported filter {} {} in {}", property, op, system),
            Self::InvalidFilter { system, message } => write!(f, "{} in {}", message, system),
            Self::UnknownCode { system, code } => write!(f, "unknown code {} in {}", code, system),
        }
    }
}

/// Statistics from one expansion.
#[derive(Debug, Clone, Default)]
pub struct ExpansionStats {
    /// Total expansion duration.
    pub duration: Duration,
    /// Systems with a registered code system.
    pub systems_evaluated: usize,
    /// Include and exclude groups evaluated.
    pub groups_evaluated: usize,
    /// Groups treated as non-matching because of an issue.
    pub groups_failed: usize,
    /// Attribute filters answered from the filter cache.
    pub cache_hits: usize,
}

/// Result of a ValueSet expansion.
///
/// # Example
///
/// ```ignore
/// let result = evaluator.expand(&value_set)?;
///
/// println!("Expanded to {} codes", result.len());
/// for code in &result.codes {
///     println!("{} {}", code.system, code.code);
/// }
/// for issue in &result.issues {
///     eprintln!("warning: {}", issue);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExpansionResult {
    /// Concepts per normalized system URL.
    pub systems: BTreeMap<String, ConceptSet>,
    /// Every code, sorted by system then code.
    pub codes: Vec<ExpandedCode>,
    /// Conditions that reduced the result, in the order they occurred.
    pub issues: Vec<ExpansionIssue>,
    /// Execution statistics.
    pub stats: ExpansionStats,
}

impl ExpansionResult {
    /// Creates an empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total number of concepts across systems.
    pub fn len(&self) -> usize {
        self.systems.values().map(ConceptSet::len).sum()
    }

    /// Returns true if no system contributed a concept.
    pub fn is_empty(&self) -> bool {
        self.systems.values().all(ConceptSet::is_empty)
    }

    /// Concepts of one system; trailing `/` in `system` is ignored.
    pub fn system(&self, system: &str) -> Option<&ConceptSet> {
        self.systems.get(normalize_system_url(system))
    }

    /// Checks if a concept of a system is in the expansion.
    pub fn contains(&self, system: &str, concept_id: ConceptId) -> bool {
        self.system(system)
            .is_some_and(|set| set.contains(concept_id))
    }

    /// Union of the concept ids of every system.
    ///
    /// Ids are only unique within a system, so this is meaningful when the
    /// expansion covers one system or ids come from a shared namespace.
    pub fn concepts(&self) -> ConceptSet {
        let mut all = ConceptSet::new();
        for set in self.systems.values() {
            all.absorb(set);
        }
        all
    }

    /// Returns true if the expansion hit no issue.
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> ExpansionResult {
        let mut result = ExpansionResult::empty();
        result
            .systems
            .insert("http://snomed.info/sct".into(), ConceptSet::from_slice(&[200, 400]));
        result
            .systems
            .insert("http://loinc.org".into(), ConceptSet::from_slice(&[0]));
        result
    }

    #[test]
    fn test_len_and_contains() {
        let result = result();
        assert_eq!(result.len(), 3);
        assert!(!result.is_empty());
        assert!(result.contains("http://snomed.info/sct/", 200));
        assert!(!result.contains("http://snomed.info/sct", 0));
        assert!(!result.contains("http://example.org", 200));
        assert_eq!(result.concepts().to_sorted_vec(), vec![0, 200, 400]);
        assert!(result.is_complete());
    }

    #[test]
    fn test_empty_systems_are_empty() {
        let mut result = ExpansionResult::empty();
        result.systems.insert("http://loinc.org".into(), ConceptSet::new());
        assert!(result.is_empty());
        assert_eq!(result.len(), 0);
    }

    #[test]
    fn test_issue_from_group_error() {
        let err = ExpandError::UnknownCode {
            system: "http://snomed.info/sct".into(),
            code: "999".into(),
        };
        let issue = ExpansionIssue::from_group_error("http://snomed.info/sct", &err).unwrap();
        assert_eq!(issue.to_string(), "unknown code 999 in http://snomed.info/sct");
        assert_eq!(issue.system(), "http://snomed.info/sct");

        let fatal = ExpandError::ValueSetNotFound("x".into());
        assert!(ExpansionIssue::from_group_error("http://snomed.info/sct", &fatal).is_none());
    }
}
