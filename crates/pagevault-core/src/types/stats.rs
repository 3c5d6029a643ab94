//! Cache statistics

/// Counters for page cache outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Responses replayed from the store
    pub hits: u64,
    /// Responses rendered and stored
    pub misses: u64,
    /// Responses rendered and not stored
    pub bypasses: u64,
    /// Responses during which the store failed
    pub down: u64,
    /// Hits served from an expired entry
    pub stale_serves: u64,
    /// Entries written after a regeneration
    pub regenerations: u64,
    /// Failed store calls
    pub store_errors: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Every response that carried a status
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses + self.bypasses + self.down
    }

    /// Merge stats from another instance
    pub fn merge(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.bypasses += other.bypasses;
        self.down += other.down;
        self.stale_serves += other.stale_serves;
        self.regenerations += other.regenerations;
        self.store_errors += other.store_errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats() {
        let stats = CacheStats::default();
        assert_eq!(stats.total_requests(), 0);
        assert_eq!(stats.hit_ratio(), 0.0);
    }

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats {
            hits: 75,
            misses: 10,
            bypasses: 10,
            down: 5,
            ..Default::default()
        };
        assert_eq!(stats.total_requests(), 100);
        assert!((stats.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge() {
        let mut a = CacheStats {
            hits: 1,
            store_errors: 2,
            ..Default::default()
        };
        a.merge(&CacheStats {
            hits: 3,
            regenerations: 1,
            ..Default::default()
        });
        assert_eq!(a.hits, 4);
        assert_eq!(a.store_errors, 2);
        assert_eq!(a.regenerations, 1);
    }
}
