//! Closure records and the is-a edges they are built from.

use chrono::{DateTime, Utc};
use fhirterm_types::{codec, ConceptId, ConceptSet};

use crate::error::{ClosureError, ClosureResult};

/// One is-a edge: `source` is-a `destination` (source is more specific).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IsAEdge {
    /// The more specific concept.
    pub source: ConceptId,
    /// The more general concept.
    pub destination: ConceptId,
}

impl IsAEdge {
    /// Creates an edge meaning `source` is-a `destination`.
    pub fn new(source: ConceptId, destination: ConceptId) -> Self {
        Self {
            source,
            destination,
        }
    }
}

/// Direction of a reachability traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Follow edges forward, from source to destination.
    Ancestors,
    /// Follow edges backward, from destination to source.
    Descendants,
}

/// The complete ancestor and descendant sets of one concept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureRecord {
    /// Concept the record belongs to.
    pub concept_id: ConceptId,
    /// Every concept reachable by following edges forward.
    pub ancestors: ConceptSet,
    /// Every concept reachable by following edges backward.
    pub descendants: ConceptSet,
}

impl ClosureRecord {
    /// Encodes both sides of the record.
    pub fn encode(&self) -> EncodedRecord {
        EncodedRecord {
            concept_id: self.concept_id,
            ancestors: codec::encode(&self.ancestors),
            descendants: codec::encode(&self.descendants),
        }
    }

    /// Returns the ancestors plus the concept itself.
    pub fn ancestors_or_self(&self) -> ConceptSet {
        let mut result = self.ancestors.clone();
        result.add(self.concept_id);
        result
    }

    /// Returns the descendants plus the concept itself.
    pub fn descendants_or_self(&self) -> ConceptSet {
        let mut result = self.descendants.clone();
        result.add(self.concept_id);
        result
    }
}

/// A closure record in its persisted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    /// Concept the record belongs to.
    pub concept_id: ConceptId,
    /// Encoded ancestor set.
    pub ancestors: Vec<u8>,
    /// Encoded descendant set.
    pub descendants: Vec<u8>,
}

impl EncodedRecord {
    /// Decodes both sides of the record.
    ///
    /// # Errors
    ///
    /// Returns [`ClosureError::Decoding`] if either blob is corrupt.
    pub fn decode(&self) -> ClosureResult<ClosureRecord> {
        let decode = |blob: &[u8]| {
            codec::decode(blob).map_err(|source| ClosureError::Decoding {
                concept_id: self.concept_id,
                source,
            })
        };

        Ok(ClosureRecord {
            concept_id: self.concept_id,
            ancestors: decode(&self.ancestors)?,
            descendants: decode(&self.descendants)?,
        })
    }

    /// Total encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        self.ancestors.len() + self.descendants.len()
    }
}

/// Metadata about the live closure index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildInfo {
    /// Incremented by every completed rebuild.
    pub generation: u64,
    /// When the rebuild completed.
    pub built_at: DateTime<Utc>,
    /// Number of records in the index.
    pub concept_count: usize,
}
