//! `PersistenceLayer` trait — pluggable storage backend.
//!
//! Abstracts estimator-snapshot, event, and reading-archive persistence so
//! different backends can be swapped without touching pipeline code:
//! - `InMemoryDAL`: in-memory store for testing and minimal deployments.
//! - Future: a durable KV/columnar backend for production fleets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EkfState, Event, Reading, TruckId};

/// A point-in-time snapshot of one truck's estimator state, persisted on
/// the `ckpt_interval_seconds` cadence so a restart can resume mid-tank
/// rather than reinitializing to half-full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorSnapshot {
    pub truck_id: TruckId,
    pub taken_at: DateTime<Utc>,
    pub ekf_state: EkfState,
}

/// Trait for pluggable persistence backends.
///
/// Implementations must be thread-safe (`Send + Sync`) for shared access
/// across async tasks.
pub trait PersistenceLayer: Send + Sync {
    /// Persist the latest estimator snapshot for a truck, overwriting any
    /// previous one — only the most recent snapshot per truck is kept.
    fn store_snapshot(&self, snapshot: &EstimatorSnapshot) -> Result<(), PersistenceError>;

    /// Fetch the most recent snapshot for a truck, if any.
    fn get_snapshot(&self, truck_id: &TruckId) -> Result<Option<EstimatorSnapshot>, PersistenceError>;

    /// Append an emitted event to the archive.
    fn store_event(&self, event: &Event) -> Result<(), PersistenceError>;

    /// List the most recent events for a truck (most recent first).
    fn list_events(&self, truck_id: &TruckId, limit: usize) -> Result<Vec<Event>, PersistenceError>;

    /// Append a raw reading to the archive, for replay/audit.
    fn store_reading(&self, reading: &Reading) -> Result<(), PersistenceError>;

    /// List the most recent archived readings for a truck (most recent first).
    fn list_readings(&self, truck_id: &TruckId, limit: usize) -> Result<Vec<Reading>, PersistenceError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not found")]
    NotFound,
}

/// In-memory persistence for testing and minimal deployments.
///
/// Thread-safe via `RwLock`. Not durable — data lost on restart.
pub struct InMemoryDAL {
    snapshots: std::sync::RwLock<std::collections::HashMap<TruckId, EstimatorSnapshot>>,
    events: std::sync::RwLock<Vec<Event>>,
    readings: std::sync::RwLock<Vec<Reading>>,
    max_events: usize,
    max_readings: usize,
}

impl InMemoryDAL {
    /// Create a new in-memory store with default limits.
    pub fn new() -> Self {
        Self {
            snapshots: std::sync::RwLock::new(std::collections::HashMap::new()),
            events: std::sync::RwLock::new(Vec::new()),
            readings: std::sync::RwLock::new(Vec::new()),
            max_events: 10_000,
            max_readings: 10_000,
        }
    }
}

impl Default for InMemoryDAL {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceLayer for InMemoryDAL {
    fn store_snapshot(&self, snapshot: &EstimatorSnapshot) -> Result<(), PersistenceError> {
        let mut store = self
            .snapshots
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        store.insert(snapshot.truck_id.clone(), snapshot.clone());
        Ok(())
    }

    fn get_snapshot(&self, truck_id: &TruckId) -> Result<Option<EstimatorSnapshot>, PersistenceError> {
        let store = self
            .snapshots
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(store.get(truck_id).cloned())
    }

    fn store_event(&self, event: &Event) -> Result<(), PersistenceError> {
        let mut store = self
            .events
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        store.push(event.clone());
        if store.len() > self.max_events {
            store.remove(0);
        }
        Ok(())
    }

    fn list_events(&self, truck_id: &TruckId, limit: usize) -> Result<Vec<Event>, PersistenceError> {
        let store = self
            .events
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(store
            .iter()
            .rev()
            .filter(|e| e.truck_id() == Some(truck_id))
            .take(limit)
            .cloned()
            .collect())
    }

    fn store_reading(&self, reading: &Reading) -> Result<(), PersistenceError> {
        let mut store = self
            .readings
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        store.push(reading.clone());
        if store.len() > self.max_readings {
            store.remove(0);
        }
        Ok(())
    }

    fn list_readings(&self, truck_id: &TruckId, limit: usize) -> Result<Vec<Reading>, PersistenceError> {
        let store = self
            .readings
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(store
            .iter()
            .rev()
            .filter(|r| &r.truck_id == truck_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TankSpec, TruckId};

    fn truck(id: &str) -> TruckId {
        TruckId::new(id)
    }

    fn make_snapshot(truck_id: TruckId) -> EstimatorSnapshot {
        EstimatorSnapshot {
            truck_id,
            taken_at: Utc::now(),
            ekf_state: EkfState::initial(TankSpec::cylinder(400.0).capacity_l, 1.0),
        }
    }

    #[test]
    fn store_and_retrieve_snapshot() {
        let dal = InMemoryDAL::new();
        let snap = make_snapshot(truck("truck-1"));
        dal.store_snapshot(&snap).unwrap();

        let retrieved = dal.get_snapshot(&truck("truck-1")).unwrap();
        assert!(retrieved.is_some());
    }

    #[test]
    fn snapshot_overwrites_previous_for_same_truck() {
        let dal = InMemoryDAL::new();
        dal.store_snapshot(&make_snapshot(truck("truck-1"))).unwrap();
        dal.store_snapshot(&make_snapshot(truck("truck-1"))).unwrap();
        // Only ever one snapshot kept per truck — not an accumulating log.
        let retrieved = dal.get_snapshot(&truck("truck-1")).unwrap();
        assert!(retrieved.is_some());
    }

    #[test]
    fn events_are_filtered_by_truck_and_ordered_newest_first() {
        let dal = InMemoryDAL::new();
        dal.store_event(&Event::DriverSessionStart {
            driver_id: "driver-a".to_string(),
            truck_id: truck("truck-1"),
        })
        .unwrap();
        dal.store_event(&Event::DriverSessionStart {
            driver_id: "driver-b".to_string(),
            truck_id: truck("truck-2"),
        })
        .unwrap();

        let events = dal.list_events(&truck("truck-1"), 10).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn trait_object_works_through_box() {
        let dal: Box<dyn PersistenceLayer> = Box::new(InMemoryDAL::new());
        assert_eq!(dal.backend_name(), "InMemory");
        dal.store_snapshot(&make_snapshot(truck("truck-1"))).unwrap();
        assert!(dal.get_snapshot(&truck("truck-1")).unwrap().is_some());
    }
}
