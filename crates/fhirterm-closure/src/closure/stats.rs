//! Statistics about closure rebuilds.

/// Statistics about one completed closure rebuild.
#[derive(Debug, Clone, Default)]
pub struct ClosureStats {
    /// Number of concepts written.
    pub concept_count: usize,
    /// Number of is-a edges in the relation.
    pub relationship_count: usize,
    /// Number of batches committed.
    pub batches_committed: usize,
    /// Generation of the index the rebuild produced.
    pub generation: u64,
    /// Average number of ancestors per concept.
    pub avg_ancestors: f64,
    /// Average number of descendants per concept.
    pub avg_descendants: f64,
    /// Largest ancestor set.
    pub max_ancestors: usize,
    /// Largest descendant set.
    pub max_descendants: usize,
    /// Total size of all encoded blobs in bytes.
    pub encoded_bytes: usize,
    /// Time taken by the rebuild in milliseconds.
    pub build_time_ms: u64,
}

impl ClosureStats {
    /// Returns the encoded index size in megabytes.
    pub fn encoded_mb(&self) -> f64 {
        self.encoded_bytes as f64 / (1024.0 * 1024.0)
    }
}

impl std::fmt::Display for ClosureStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Closure Rebuild Statistics:")?;
        writeln!(f, "  Generation:      {}", self.generation)?;
        writeln!(f, "  Concepts:        {}", self.concept_count)?;
        writeln!(f, "  IS-A relations:  {}", self.relationship_count)?;
        writeln!(f, "  Batches:         {}", self.batches_committed)?;
        writeln!(f, "  Avg ancestors:   {:.1}", self.avg_ancestors)?;
        writeln!(f, "  Avg descendants: {:.1}", self.avg_descendants)?;
        writeln!(f, "  Max ancestors:   {}", self.max_ancestors)?;
        writeln!(f, "  Max descendants: {}", self.max_descendants)?;
        writeln!(f, "  Build time:      {}ms", self.build_time_ms)?;
        writeln!(f, "  Encoded size:    {:.1} MB", self.encoded_mb())?;
        Ok(())
    }
}
