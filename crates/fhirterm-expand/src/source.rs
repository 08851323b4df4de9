//! Where ValueSet documents come from.

use std::collections::HashMap;

use fhirterm_types::ValueSet;
use tracing::warn;

use crate::error::ExpandResult;

/// Lookup of ValueSet documents by logical id.
pub trait ValueSetSource {
    /// The ValueSet with the given id, if the source has one.
    fn find_value_set(&self, id: &str) -> ExpandResult<Option<ValueSet>>;
}

/// ValueSets held in memory, loaded from FHIR JSON.
///
/// # Example
///
/// ```rust
/// use fhirterm_expand::{InMemoryValueSets, ValueSetSource};
///
/// let mut sources = InMemoryValueSets::new();
/// sources
///     .load_json(r#"{"resourceType": "ValueSet", "id": "lab-chem"}"#)
///     .unwrap();
///
/// assert!(sources.find_value_set("lab-chem").unwrap().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryValueSets {
    by_id: HashMap<String, ValueSet>,
}

impl InMemoryValueSets {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a ValueSet under its id. Returns false (and keeps nothing) if it has no id.
    pub fn insert(&mut self, value_set: ValueSet) -> bool {
        match value_set.id.clone() {
            Some(id) => {
                self.by_id.insert(id, value_set);
                true
            }
            None => {
                warn!(url = ?value_set.url, "ignoring ValueSet without id");
                false
            }
        }
    }

    /// Parses one ValueSet JSON document and adds it.
    pub fn load_json(&mut self, json: &str) -> ExpandResult<bool> {
        let value_set: ValueSet = serde_json::from_str(json)?;
        Ok(self.insert(value_set))
    }

    /// Number of ValueSets.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if no ValueSet is loaded.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl FromIterator<ValueSet> for InMemoryValueSets {
    fn from_iter<T: IntoIterator<Item = ValueSet>>(iter: T) -> Self {
        let mut sources = Self::new();
        for value_set in iter {
            sources.insert(value_set);
        }
        sources
    }
}

impl ValueSetSource for InMemoryValueSets {
    fn find_value_set(&self, id: &str) -> ExpandResult<Option<ValueSet>> {
        Ok(self.by_id.get(id).cloned())
    }
}
