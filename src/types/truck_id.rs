//! Truck identifier newtype.
//!
//! Wraps an `Arc<str>` rather than `String` because truck IDs are cloned
//! across worker-queue boundaries, event payloads, and snapshot requests —
//! the concurrency model partitions work by this value (see `ingest`).

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TruckId(Arc<str>);

impl TruckId {
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable partition index for hash-based worker assignment.
    pub fn partition(&self, worker_count: usize) -> usize {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() as usize) % worker_count.max(1)
    }
}

impl fmt::Display for TruckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TruckId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for TruckId {
    fn from(s: String) -> Self {
        Self(Arc::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_stable() {
        let id = TruckId::from("truck-42");
        let a = id.partition(8);
        let b = id.partition(8);
        assert_eq!(a, b);
        assert!(a < 8);
    }

    #[test]
    fn partition_clamps_zero_workers() {
        let id = TruckId::from("truck-1");
        assert_eq!(id.partition(0), 0);
    }
}
