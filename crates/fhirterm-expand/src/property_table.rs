//! Code systems described by flat per-code property rows (LOINC style).

use std::collections::{BTreeMap, HashMap};

use fhirterm_types::{normalize_system_url, ConceptId, ConceptReference, ConceptSet};
use regex::Regex;

use crate::error::ExpandResult;
use crate::traits::{CodeSystem, CodeSystemReader, FilterOperator, PropertyFilter, ResolvedCodes};

/// Property name that filters on a row's code.
pub const CODE_PROPERTY: &str = "code";

/// Property name that filters on a row's display text.
pub const DISPLAY_PROPERTY: &str = "display";

/// One code and its named properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyRow {
    /// The code.
    pub code: String,
    /// Display text.
    pub display: Option<String>,
    /// Named properties such as `CLASS` or `SCALE_TYP`.
    pub properties: BTreeMap<String, String>,
}

impl PropertyRow {
    /// Creates a row with no display and no properties.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    /// Sets the display text.
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Sets a named property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Value of a property; `code` and `display` address the built-in columns.
    pub fn get(&self, property: &str) -> Option<&str> {
        match property {
            CODE_PROPERTY => Some(&self.code),
            DISPLAY_PROPERTY => self.display.as_deref(),
            name => self.properties.get(name).map(String::as_str),
        }
    }
}

/// An immutable table of codes whose filters test row properties.
///
/// Concept ids are row positions. Supported operators, on any property:
///
/// | Operator | Matches rows where |
/// |----------|--------------------|
/// | `=` | the property equals the value |
/// | `in` | the property equals one of the comma-separated values |
/// | `not-in` | the property is absent or equals none of the values |
/// | `exists` | the property is present (`true`) or absent (`false`) |
/// | `regex` | the whole property value matches the pattern (which must parse on its own) |
///
/// # Example
///
/// ```rust
/// use fhirterm_expand::{CodeSystem, PropertyFilter, PropertyRow, PropertyTableCodeSystem};
///
/// let loinc = PropertyTableCodeSystem::new(
///     "http://loinc.org",
///     vec![
///         PropertyRow::new("2345-7").with_property("CLASS", "CHEM"),
///         PropertyRow::new("718-7").with_property("CLASS", "HEM/BC"),
///     ],
/// );
///
/// let reader = loinc.open().unwrap();
/// let chem = reader.evaluate(&PropertyFilter::new("CLASS", "=", "CHEM")).unwrap();
/// assert_eq!(chem.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PropertyTableCodeSystem {
    url: String,
    rows: Vec<PropertyRow>,
    by_code: HashMap<String, ConceptId>,
}

impl PropertyTableCodeSystem {
    /// Creates a code system from rows. A repeated code keeps its first row.
    pub fn new(url: impl AsRef<str>, rows: Vec<PropertyRow>) -> Self {
        let mut by_code = HashMap::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            by_code.entry(row.code.clone()).or_insert(index as ConceptId);
        }
        Self {
            url: normalize_system_url(url.as_ref()).to_string(),
            rows,
            by_code,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row of a code.
    pub fn row(&self, code: &str) -> Option<&PropertyRow> {
        self.by_code
            .get(code)
            .and_then(|&id| self.rows.get(id as usize))
    }

    fn select<F>(&self, property: &str, mut keep: F) -> ConceptSet
    where
        F: FnMut(Option<&str>) -> bool,
    {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| keep(row.get(property)))
            .map(|(index, _)| index as ConceptId)
            .collect()
    }
}

impl CodeSystem for PropertyTableCodeSystem {
    fn url(&self) -> &str {
        &self.url
    }

    fn open(&self) -> ExpandResult<Box<dyn CodeSystemReader + '_>> {
        Ok(Box::new(PropertyTableReader { table: self }))
    }
}

struct PropertyTableReader<'a> {
    table: &'a PropertyTableCodeSystem,
}

impl CodeSystemReader for PropertyTableReader<'_> {
    fn resolve_codes(&self, concepts: &[ConceptReference]) -> ExpandResult<ResolvedCodes> {
        let mut resolved = ResolvedCodes::default();
        for concept in concepts {
            match self.table.by_code.get(&concept.code) {
                Some(&id) => {
                    resolved.concepts.add(id);
                }
                None => resolved.unknown.push(concept.code.clone()),
            }
        }
        Ok(resolved)
    }

    fn evaluate(&self, filter: &PropertyFilter) -> ExpandResult<ConceptSet> {
        let property = filter.property.as_str();
        let value = filter.value.as_str();

        let matched = match &filter.op {
            FilterOperator::Equals => self.table.select(property, |v| v == Some(value)),
            FilterOperator::In => {
                let wanted: Vec<&str> = filter.values().collect();
                self.table
                    .select(property, |v| v.is_some_and(|v| wanted.contains(&v)))
            }
            FilterOperator::NotIn => {
                let unwanted: Vec<&str> = filter.values().collect();
                self.table
                    .select(property, |v| v.map_or(true, |v| !unwanted.contains(&v)))
            }
            FilterOperator::Exists => {
                let present = match value {
                    "true" => true,
                    "false" => false,
                    _ => return Err(filter.invalid_value("expected true or false")),
                };
                self.table.select(property, |v| v.is_some() == present)
            }
            FilterOperator::Regex => {
                // A pattern that only parses once wrapped would break out of the anchors
                Regex::new(value).map_err(|e| filter.invalid_value(e.to_string()))?;
                let pattern = Regex::new(&format!("^(?:{})$", value))
                    .map_err(|e| filter.invalid_value(e.to_string()))?;
                self.table
                    .select(property, |v| v.is_some_and(|v| pattern.is_match(v)))
            }
            _ => return Err(filter.unsupported(&self.table.url)),
        };

        Ok(matched)
    }

    fn code_for(&self, concept_id: ConceptId) -> Option<String> {
        self.table
            .rows
            .get(concept_id as usize)
            .map(|row| row.code.clone())
    }
}
