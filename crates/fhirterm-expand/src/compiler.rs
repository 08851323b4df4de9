//! Compilation of ValueSet compose rules into per-system predicate groups.
//!
//! Every `compose.include` / `compose.exclude` entry becomes one
//! [`PredicateGroup`]: each attribute filter is one predicate, and an explicit
//! concept list adds one more `in` predicate. Predicates in a group are
//! AND-ed; groups on the same side of a system are OR-ed.
//!
//! Systems are keyed by their URL with trailing `/` removed, so
//! `http://loinc.org/` and `http://loinc.org` share one entry.

use std::collections::BTreeMap;

use fhirterm_types::{normalize_system_url, ComposeRule, ConceptReference, ValueSet};
use tracing::debug;

/// Property name of the predicate an explicit concept list compiles to.
pub const CONCEPT_PROPERTY: &str = "concept";

/// Operator code of the predicate an explicit concept list compiles to.
pub const IN_OP: &str = "in";

/// One atomic test within a predicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `property op value`, evaluated by the code system.
    Property {
        /// Property name.
        property: String,
        /// Operator code as written in the ValueSet.
        op: String,
        /// Filter value.
        value: String,
    },
    /// Membership in an explicit concept list.
    In {
        /// Enumerated concepts, in document order.
        concepts: Vec<ConceptReference>,
    },
}

impl Predicate {
    /// Creates a property predicate.
    pub fn property(
        property: impl Into<String>,
        op: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Property {
            property: property.into(),
            op: op.into(),
            value: value.into(),
        }
    }

    /// Creates an `in` predicate over the given codes.
    pub fn in_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::In {
            concepts: codes.into_iter().map(ConceptReference::new).collect(),
        }
    }

    /// Property the predicate tests.
    pub fn property_name(&self) -> &str {
        match self {
            Self::Property { property, .. } => property,
            Self::In { .. } => CONCEPT_PROPERTY,
        }
    }

    /// Operator code of the predicate.
    pub fn op(&self) -> &str {
        match self {
            Self::Property { op, .. } => op,
            Self::In { .. } => IN_OP,
        }
    }
}

/// Predicates that must all hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateGroup {
    /// The AND-ed predicates.
    pub predicates: Vec<Predicate>,
}

impl PredicateGroup {
    /// Creates a group from predicates.
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    /// Number of predicates.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Returns true if the group has no predicates.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Iterates over the predicates.
    pub fn iter(&self) -> std::slice::Iter<'_, Predicate> {
        self.predicates.iter()
    }
}

impl std::ops::Index<usize> for PredicateGroup {
    type Output = Predicate;

    fn index(&self, index: usize) -> &Predicate {
        &self.predicates[index]
    }
}

/// Include and exclude groups of one code system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledFilterSet {
    /// Groups whose matches are included, in encounter order.
    pub include: Vec<PredicateGroup>,
    /// Groups whose matches are excluded, in encounter order.
    pub exclude: Vec<PredicateGroup>,
}

impl CompiledFilterSet {
    /// Returns true if neither side has a group.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// Compiled filters keyed by normalized system URL.
pub type CompiledFilters = BTreeMap<String, CompiledFilterSet>;

#[derive(Clone, Copy)]
enum Side {
    Include,
    Exclude,
}

/// Turns ValueSet compose rules into [`CompiledFilters`].
///
/// # Example
///
/// ```rust
/// use fhirterm_expand::{FilterCompiler, Predicate};
/// use fhirterm_types::{Compose, ComposeRule, ValueSet};
///
/// let vs = ValueSet {
///     compose: Some(Compose {
///         include: vec![ComposeRule::for_system("http://snomed.info/sct/")
///             .with_filter("concept", "is-a", "73211009")],
///         exclude: vec![ComposeRule::for_system("http://snomed.info/sct")
///             .with_concepts(["44054006"])],
///     }),
///     ..Default::default()
/// };
///
/// let compiled = FilterCompiler::compile(&vs);
/// let snomed = &compiled["http://snomed.info/sct"];
/// assert_eq!(snomed.include[0][0], Predicate::property("concept", "is-a", "73211009"));
/// assert_eq!(snomed.exclude[0][0], Predicate::in_codes(["44054006"]));
/// ```
pub struct FilterCompiler;

impl FilterCompiler {
    /// Compiles the compose section of a ValueSet.
    ///
    /// A ValueSet without a compose section compiles to an empty map. An entry
    /// with neither filters nor concepts still creates its system entry but
    /// adds no group. Entries without a system are skipped.
    pub fn compile(value_set: &ValueSet) -> CompiledFilters {
        let mut compiled = CompiledFilters::new();

        if let Some(compose) = &value_set.compose {
            Self::compile_rules(&mut compiled, &compose.include, Side::Include);
            Self::compile_rules(&mut compiled, &compose.exclude, Side::Exclude);
        }

        compiled
    }

    fn compile_rules(compiled: &mut CompiledFilters, rules: &[ComposeRule], side: Side) {
        for rule in rules {
            let Some(system) = rule.system.as_deref() else {
                debug!("skipping compose rule without a system");
                continue;
            };

            let entry = compiled
                .entry(normalize_system_url(system).to_string())
                .or_default();

            if let Some(group) = Self::compile_rule(rule) {
                match side {
                    Side::Include => entry.include.push(group),
                    Side::Exclude => entry.exclude.push(group),
                }
            }
        }
    }

    fn compile_rule(rule: &ComposeRule) -> Option<PredicateGroup> {
        let mut predicates: Vec<Predicate> = rule
            .filters()
            .iter()
            .map(|f| Predicate::property(&f.property, &f.op, &f.value))
            .collect();

        if !rule.concepts().is_empty() {
            predicates.push(Predicate::In {
                concepts: rule.concepts().to_vec(),
            });
        }

        if predicates.is_empty() {
            None
        } else {
            Some(PredicateGroup::new(predicates))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhirterm_types::Compose;

    fn value_set(include: Vec<ComposeRule>, exclude: Vec<ComposeRule>) -> ValueSet {
        ValueSet {
            compose: Some(Compose { include, exclude }),
            ..Default::default()
        }
    }

    #[test]
    fn test_trailing_slash_systems_merge() {
        let vs = value_set(
            vec![
                ComposeRule::for_system("http://loinc.org/").with_filter("foo", "bar", "42"),
                ComposeRule::for_system("http://loinc.org").with_filter("foo", "bar", "46"),
            ],
            vec![ComposeRule::for_system("http://snomed.info/ct/").with_concepts(["123456", "7890"])],
        );

        let compiled = FilterCompiler::compile(&vs);
        assert_eq!(compiled.len(), 2);

        let loinc = &compiled["http://loinc.org"];
        assert_eq!(loinc.include.len(), 2);
        assert_eq!(loinc.include[0].len(), 1);
        assert_eq!(loinc.include[0][0], Predicate::property("foo", "bar", "42"));
        assert_eq!(loinc.include[1][0], Predicate::property("foo", "bar", "46"));
        assert!(loinc.exclude.is_empty());

        let snomed = &compiled["http://snomed.info/ct"];
        assert!(snomed.include.is_empty());
        assert_eq!(snomed.exclude.len(), 1);
        assert_eq!(snomed.exclude[0].len(), 1);
        assert_eq!(snomed.exclude[0][0].op(), "in");
        assert_eq!(snomed.exclude[0][0].property_name(), "concept");
        assert_eq!(snomed.exclude[0][0], Predicate::in_codes(["123456", "7890"]));
    }

    #[test]
    fn test_filters_and_concepts_share_a_group() {
        let vs = value_set(
            vec![ComposeRule::for_system("http://snomed.info/sct")
                .with_filter("concept", "is-a", "73211009")
                .with_filter("concept", "is-not-a", "44054006")
                .with_concepts(["46635009"])],
            vec![],
        );

        let compiled = FilterCompiler::compile(&vs);
        let group = &compiled["http://snomed.info/sct"].include[0];
        assert_eq!(group.len(), 3);
        assert_eq!(group[0].op(), "is-a");
        assert_eq!(group[1].op(), "is-not-a");
        assert_eq!(group[2], Predicate::in_codes(["46635009"]));
    }

    #[test]
    fn test_bare_rule_creates_entry_without_group() {
        let vs = value_set(vec![ComposeRule::for_system("http://loinc.org")], vec![]);
        let compiled = FilterCompiler::compile(&vs);
        assert!(compiled["http://loinc.org"].is_empty());
    }

    #[test]
    fn test_empty_lists_are_absent() {
        let mut rule = ComposeRule::for_system("http://loinc.org");
        rule.filter = Some(Vec::new());
        rule.concept = Some(Vec::new());
        let compiled = FilterCompiler::compile(&value_set(vec![rule], vec![]));
        assert!(compiled["http://loinc.org"].include.is_empty());
    }

    #[test]
    fn test_rule_without_system_skipped() {
        let rule = ComposeRule::default().with_concepts(["1"]);
        let compiled = FilterCompiler::compile(&value_set(vec![rule], vec![]));
        assert!(compiled.is_empty());
    }

    #[test]
    fn test_no_compose() {
        assert!(FilterCompiler::compile(&ValueSet::default()).is_empty());
    }

    #[test]
    fn test_exclude_groups_keep_order() {
        let vs = value_set(
            vec![],
            vec![
                ComposeRule::for_system("http://loinc.org").with_filter("CLASS", "=", "CHEM"),
                ComposeRule::for_system("http://loinc.org/").with_filter("CLASS", "=", "HEM/BC"),
            ],
        );
        let loinc = &FilterCompiler::compile(&vs)["http://loinc.org"];
        assert_eq!(loinc.exclude[0][0], Predicate::property("CLASS", "=", "CHEM"));
        assert_eq!(loinc.exclude[1][0], Predicate::property("CLASS", "=", "HEM/BC"));
    }
}
