//! FHIR ValueSet compose model.
//!
//! Only the parts of the resource needed to compute an expansion are modelled;
//! unknown JSON fields are ignored on deserialization.

use serde::{Deserialize, Serialize};

/// FHIR ValueSet resource.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSet {
    /// Always `"ValueSet"` for well-formed documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Logical id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Canonical URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Business identifier (DSTU2 style string identifier).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Computer-friendly name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Publisher name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Natural language description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Content logical definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<Compose>,
}

/// The `compose` element: include and exclude rules.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Compose {
    /// Rules whose matches are part of the expansion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<ComposeRule>,
    /// Rules whose matches are removed from the expansion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<ComposeRule>,
}

/// One include/exclude entry, scoped to a single code system.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeRule {
    /// Code system URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Code system version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Explicitly enumerated concepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<Vec<ConceptReference>>,
    /// Attribute filters, all of which must hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<ComposeFilter>>,
    /// Imported value sets (not evaluated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_set: Option<Vec<String>>,
}

impl ComposeRule {
    /// Creates an empty rule for the given system.
    pub fn for_system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..Self::default()
        }
    }

    /// Appends an attribute filter.
    pub fn with_filter(
        mut self,
        property: impl Into<String>,
        op: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.filter.get_or_insert_with(Vec::new).push(ComposeFilter {
            property: property.into(),
            op: op.into(),
            value: value.into(),
        });
        self
    }

    /// Appends explicitly enumerated concept codes.
    pub fn with_concepts<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let concepts = self.concept.get_or_insert_with(Vec::new);
        concepts.extend(codes.into_iter().map(ConceptReference::new));
        self
    }

    /// Attribute filters, empty when absent.
    pub fn filters(&self) -> &[ComposeFilter] {
        self.filter.as_deref().unwrap_or(&[])
    }

    /// Enumerated concepts, empty when absent.
    pub fn concepts(&self) -> &[ConceptReference] {
        self.concept.as_deref().unwrap_or(&[])
    }
}

/// An explicitly enumerated concept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ConceptReference {
    /// Code within the system.
    pub code: String,
    /// Display text, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl ConceptReference {
    /// Creates a reference with no display.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: None,
        }
    }
}

/// An attribute filter: `property op value`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ComposeFilter {
    /// Property name (e.g. `concept`, `display`, `CLASS`).
    pub property: String,
    /// Filter operator code (e.g. `is-a`, `=`, `regex`).
    pub op: String,
    /// Comparison value.
    pub value: String,
}

/// Normalizes a code system URL by trimming trailing path separators.
///
/// `http://loinc.org/` and `http://loinc.org` name the same system.
pub fn normalize_system_url(url: &str) -> &str {
    url.trim_end_matches('/')
}
