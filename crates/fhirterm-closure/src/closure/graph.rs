//! In-memory adjacency of the is-a relation.

use std::collections::HashMap;

use fhirterm_types::{ConceptId, ConceptSet};

use crate::record::{Direction, IsAEdge};

/// Direct parent/child adjacency built from an edge list.
///
/// Used when the whole relation fits in memory: reachability becomes a
/// traversal over hash maps instead of one store query per concept.
///
/// # Example
///
/// ```rust
/// use fhirterm_closure::{IsAEdge, IsAGraph};
///
/// // 1 is-a 2, 1 is-a 3, 2 is-a 4, 3 is-a 4
/// let graph = IsAGraph::from_edges([
///     IsAEdge::new(1, 2),
///     IsAEdge::new(1, 3),
///     IsAEdge::new(2, 4),
///     IsAEdge::new(3, 4),
/// ]);
///
/// assert_eq!(graph.ancestors(1).to_sorted_vec(), vec![2, 3, 4]);
/// assert_eq!(graph.descendants(4).to_sorted_vec(), vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct IsAGraph {
    /// Direct parents for each concept.
    parents: HashMap<ConceptId, Vec<ConceptId>>,
    /// Direct children for each concept.
    children: HashMap<ConceptId, Vec<ConceptId>>,
}

impl IsAGraph {
    /// Builds the adjacency from edges. Duplicate edges are kept once.
    pub fn from_edges<I: IntoIterator<Item = IsAEdge>>(edges: I) -> Self {
        let mut edges: Vec<IsAEdge> = edges.into_iter().collect();
        edges.sort_unstable();
        edges.dedup();

        let mut parents: HashMap<ConceptId, Vec<ConceptId>> = HashMap::new();
        let mut children: HashMap<ConceptId, Vec<ConceptId>> = HashMap::new();

        for edge in &edges {
            parents.entry(edge.source).or_default().push(edge.destination);
            children.entry(edge.destination).or_default().push(edge.source);
        }

        Self { parents, children }
    }

    /// Computes the closure of `seed` in one direction by fixpoint.
    ///
    /// Starts from the direct neighbours, then repeatedly adds the neighbours
    /// of the newest frontier until no new concept appears. Concepts reached
    /// through several paths are counted once.
    pub fn reachable(&self, seed: ConceptId, direction: Direction) -> ConceptSet {
        let adjacency = match direction {
            Direction::Ancestors => &self.parents,
            Direction::Descendants => &self.children,
        };

        let mut result = ConceptSet::new();
        let mut frontier: Vec<ConceptId> = Vec::new();

        if let Some(direct) = adjacency.get(&seed) {
            for &next in direct {
                if result.add(next) {
                    frontier.push(next);
                }
            }
        }

        while !frontier.is_empty() {
            let mut next_frontier = Vec::new();
            for current in frontier {
                if let Some(neighbours) = adjacency.get(&current) {
                    for &next in neighbours {
                        if result.add(next) {
                            next_frontier.push(next);
                        }
                    }
                }
            }
            frontier = next_frontier;
        }

        result
    }

    /// All ancestors of a concept.
    pub fn ancestors(&self, concept_id: ConceptId) -> ConceptSet {
        self.reachable(concept_id, Direction::Ancestors)
    }

    /// All descendants of a concept.
    pub fn descendants(&self, concept_id: ConceptId) -> ConceptSet {
        self.reachable(concept_id, Direction::Descendants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Creates a test hierarchy:
    /// ```text
    /// 100 (root)
    ///  |-- 200
    ///  |    |-- 400
    ///  |    |-- 500
    ///  |-- 300
    ///       |-- 600
    /// ```
    fn create_test_graph() -> IsAGraph {
        IsAGraph::from_edges([
            IsAEdge::new(200, 100),
            IsAEdge::new(300, 100),
            IsAEdge::new(400, 200),
            IsAEdge::new(500, 200),
            IsAEdge::new(600, 300),
        ])
    }

    #[test]
    fn test_ancestors() {
        let graph = create_test_graph();
        assert_eq!(graph.ancestors(400).to_sorted_vec(), vec![100, 200]);
        assert!(graph.ancestors(100).is_empty());
    }

    #[test]
    fn test_descendants() {
        let graph = create_test_graph();
        assert_eq!(
            graph.descendants(100).to_sorted_vec(),
            vec![200, 300, 400, 500, 600]
        );
        assert_eq!(graph.descendants(200).to_sorted_vec(), vec![400, 500]);
        assert!(graph.descendants(400).is_empty());
    }

    #[test]
    fn test_unknown_concept() {
        let graph = create_test_graph();
        assert!(graph.ancestors(999).is_empty());
        assert!(graph.descendants(999).is_empty());
    }

    #[test]
    fn test_diamond_inheritance() {
        // 1 is-a 2, 1 is-a 3, 2 is-a 4, 3 is-a 4
        let graph = IsAGraph::from_edges([
            IsAEdge::new(1, 2),
            IsAEdge::new(1, 3),
            IsAEdge::new(2, 4),
            IsAEdge::new(3, 4),
        ]);

        let ancestors = graph.ancestors(1);
        assert_eq!(ancestors.len(), 3);
        assert_eq!(ancestors.to_sorted_vec(), vec![2, 3, 4]);

        assert_eq!(graph.descendants(4).to_sorted_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_edges_counted_once() {
        let graph = IsAGraph::from_edges([IsAEdge::new(2, 1), IsAEdge::new(2, 1)]);
        assert_eq!(graph.children[&1], vec![2]);
        assert_eq!(graph.ancestors(2).to_sorted_vec(), vec![1]);
    }
}
