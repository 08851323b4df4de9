//! # fhirterm-types
//!
//! Shared types for indexing an "is-a" concept hierarchy and expanding
//! FHIR ValueSets against it.
//!
//! This crate provides:
//! - **ConceptSet**: an unordered integer set with union/intersect/difference
//! - **Codec**: the packed little-endian blob format used to persist closure sets
//! - **ValueSet model**: the `compose.include` / `compose.exclude` rules of a
//!   FHIR ValueSet document
//!
//! ## ConceptSet Usage
//!
//! ```rust
//! use fhirterm_types::ConceptSet;
//!
//! let findings: ConceptSet = [404684003, 73211009, 46635009].into_iter().collect();
//! let diabetes: ConceptSet = [73211009, 46635009, 44054006].into_iter().collect();
//!
//! let both = findings.intersect(&diabetes);
//! assert_eq!(both.len(), 2);
//! assert!(both.contains(46635009));
//! ```
//!
//! ## Codec Usage
//!
//! ```rust
//! use fhirterm_types::{codec, ConceptSet};
//!
//! let set: ConceptSet = [2, 3, 4].into_iter().collect();
//! let blob = codec::encode(&set);
//! assert_eq!(blob.len(), 24);
//! assert!(codec::decode(&blob).unwrap().equal(&set));
//! ```
//!
//! ## ValueSet Usage
//!
//! ```rust
//! use fhirterm_types::ValueSet;
//!
//! let vs: ValueSet = serde_json::from_str(r#"{
//!     "resourceType": "ValueSet",
//!     "id": "diabetes",
//!     "compose": {
//!         "include": [{
//!             "system": "http://snomed.info/sct",
//!             "filter": [{"property": "concept", "op": "is-a", "value": "73211009"}]
//!         }]
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(vs.compose.unwrap().include.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod codec;
mod concept_set;
mod error;
mod valueset;

pub use concept_set::{ConceptSet, Iter};
pub use error::{TypesError, TypesResult};
pub use valueset::{
    normalize_system_url, Compose, ComposeFilter, ComposeRule, ConceptReference, ValueSet,
};

/// Concept identifier (64-bit, unique within one code system's namespace).
pub type ConceptId = u64;
