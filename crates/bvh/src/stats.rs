/// Snapshot of registry counters for debug overlays and logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub entries: usize,
    /// Distinct acceleration structures held by the entries.
    pub structures: usize,
    pub triangles: usize,
    /// Acceleration structures constructed.
    pub structures_built: u64,
    /// Builds that reused another surface's structure.
    pub structures_shared: u64,
    /// Build requests answered from an existing entry.
    pub cache_hits: u64,
    pub failed_builds: u64,
    /// Full cached-transform refreshes performed.
    pub refreshes: u64,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BVH: entries={} structures={} triangles={} built={} shared={} cache_hits={} failed={} refreshes={}",
            self.entries,
            self.structures,
            self.triangles,
            self.structures_built,
            self.structures_shared,
            self.cache_hits,
            self.failed_builds,
            self.refreshes
        )
    }
}
