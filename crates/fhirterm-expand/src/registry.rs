//! Code systems available to an expansion, keyed by URL.

use std::collections::HashMap;
use std::sync::Arc;

use fhirterm_types::normalize_system_url;

use crate::traits::CodeSystem;

/// Registered code systems, looked up by normalized URL.
///
/// # Example
///
/// ```rust
/// use fhirterm_expand::{CodeSystemRegistry, PropertyRow, PropertyTableCodeSystem};
///
/// let mut registry = CodeSystemRegistry::new();
/// registry.register(PropertyTableCodeSystem::new(
///     "http://loinc.org",
///     vec![PropertyRow::new("2345-7").with_display("Glucose")],
/// ));
///
/// assert!(registry.get("http://loinc.org/").is_some());
/// ```
#[derive(Default, Clone)]
pub struct CodeSystemRegistry {
    systems: HashMap<String, Arc<dyn CodeSystem>>,
}

impl CodeSystemRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a code system under its own URL, replacing any previous one.
    pub fn register<C: CodeSystem + 'static>(&mut self, system: C) -> &mut Self {
        self.register_arc(Arc::new(system))
    }

    /// Registers a shared code system under its own URL.
    pub fn register_arc(&mut self, system: Arc<dyn CodeSystem>) -> &mut Self {
        let url = normalize_system_url(system.url()).to_string();
        self.systems.insert(url, system);
        self
    }

    /// Looks up a code system; trailing `/` in `url` is ignored.
    pub fn get(&self, url: &str) -> Option<&Arc<dyn CodeSystem>> {
        self.systems.get(normalize_system_url(url))
    }

    /// Returns true if a code system is registered for `url`.
    pub fn contains(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    /// Registered URLs, sorted.
    pub fn urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.systems.keys().map(String::as_str).collect();
        urls.sort_unstable();
        urls
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl std::fmt::Debug for CodeSystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeSystemRegistry")
            .field("systems", &self.urls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property_table::{PropertyRow, PropertyTableCodeSystem};

    #[test]
    fn test_lookup_normalizes_urls() {
        let mut registry = CodeSystemRegistry::new();
        registry.register(PropertyTableCodeSystem::new("http://loinc.org/", Vec::new()));

        assert_eq!(registry.urls(), vec!["http://loinc.org"]);
        assert!(registry.contains("http://loinc.org"));
        assert!(registry.contains("http://loinc.org//"));
        assert!(!registry.contains("http://snomed.info/sct"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = CodeSystemRegistry::new();
        registry
            .register(PropertyTableCodeSystem::new("http://loinc.org", Vec::new()))
            .register(PropertyTableCodeSystem::new(
                "http://loinc.org",
                vec![PropertyRow::new("1-8")],
            ));
        assert_eq!(registry.len(), 1);
    }
}
