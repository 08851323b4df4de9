//! Unordered integer sets of concept identifiers.

use hashbrown::HashSet;

use crate::ConceptId;

/// A set of concept identifiers with no ordering guarantee.
///
/// Membership, insertion and equality depend only on set content, never on
/// insertion order. Binary operations ([`union`](Self::union),
/// [`intersect`](Self::intersect), [`difference`](Self::difference)) return
/// a new set and leave both operands untouched.
///
/// # Example
///
/// ```rust
/// use fhirterm_types::ConceptSet;
///
/// let mut set = ConceptSet::new();
/// assert!(set.add(73211009));
/// assert!(!set.add(73211009)); // already present
///
/// let other = ConceptSet::from_slice(&[73211009, 46635009]);
/// assert_eq!(set.union(&other).len(), 2);
/// assert_eq!(other.difference(&set).len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConceptSet {
    members: HashSet<ConceptId>,
}

impl ConceptSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set with room for `capacity` members.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Creates a set from a slice, dropping duplicates.
    pub fn from_slice(ids: &[ConceptId]) -> Self {
        ids.iter().copied().collect()
    }

    /// Inserts a concept id.
    ///
    /// Returns `true` if the id was newly inserted, `false` if it was already present.
    #[inline]
    pub fn add(&mut self, id: ConceptId) -> bool {
        self.members.insert(id)
    }

    /// Returns true if the set contains `id`.
    #[inline]
    pub fn contains(&self, id: ConceptId) -> bool {
        self.members.contains(&id)
    }

    /// Removes a concept id.
    ///
    /// Returns `true` if the id was present before removal.
    #[inline]
    pub fn remove(&mut self, id: ConceptId) -> bool {
        self.members.remove(&id)
    }

    /// Returns the number of members.
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the set has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns a new set holding every member of `self` or `other`.
    pub fn union(&self, other: &ConceptSet) -> ConceptSet {
        let (larger, smaller) = if self.len() >= other.len() {
            (self, other)
        } else {
            (other, self)
        };

        let mut result = larger.clone();
        result.absorb(smaller);
        result
    }

    /// Returns a new set holding the members present in both sets.
    ///
    /// Iterates the smaller set and looks each concept up in the larger one.
    pub fn intersect(&self, other: &ConceptSet) -> ConceptSet {
        let (smaller, larger) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };

        let mut result = ConceptSet::with_capacity(smaller.len());
        for id in smaller.iter() {
            if larger.contains(id) {
                result.add(id);
            }
        }
        result
    }

    /// Returns a new set holding the members of `self` absent from `other`.
    pub fn difference(&self, other: &ConceptSet) -> ConceptSet {
        self.iter().filter(|&id| !other.contains(id)).collect()
    }

    /// Returns true if both sets hold exactly the same members.
    pub fn equal(&self, other: &ConceptSet) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|id| other.contains(id))
    }

    /// Adds every member of `other` to `self` in place.
    pub fn absorb(&mut self, other: &ConceptSet) {
        self.members.extend(other.members.iter().copied());
    }

    /// Removes every member of `other` from `self` in place.
    pub fn subtract(&mut self, other: &ConceptSet) {
        if other.is_empty() {
            return;
        }
        self.members.retain(|id| !other.contains(*id));
    }

    /// Enumerates members in no particular order.
    ///
    /// Each call starts a fresh enumeration; two enumerations of the same set
    /// are not guaranteed to yield the same order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.members.iter(),
        }
    }

    /// Returns the members as an ascending Vec.
    pub fn to_sorted_vec(&self) -> Vec<ConceptId> {
        let mut ids: Vec<ConceptId> = self.iter().collect();
        ids.sort_unstable();
        ids
    }
}

impl PartialEq for ConceptSet {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Eq for ConceptSet {}

impl FromIterator<ConceptId> for ConceptSet {
    fn from_iter<I: IntoIterator<Item = ConceptId>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

impl Extend<ConceptId> for ConceptSet {
    fn extend<I: IntoIterator<Item = ConceptId>>(&mut self, iter: I) {
        self.members.extend(iter);
    }
}

impl IntoIterator for ConceptSet {
    type Item = ConceptId;
    type IntoIter = hashbrown::hash_set::IntoIter<ConceptId>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_iter()
    }
}

impl<'a> IntoIterator for &'a ConceptSet {
    type Item = ConceptId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy, unordered enumeration of a [`ConceptSet`].
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    inner: hashbrown::hash_set::Iter<'a, ConceptId>,
}

impl Iterator for Iter<'_> {
    type Item = ConceptId;

    #[inline]
    fn next(&mut self) -> Option<ConceptId> {
        self.inner.next().copied()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}
