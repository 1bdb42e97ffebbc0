//! Query: lock-light read access to per-truck estimator state for API/CLI
//! consumers, kept entirely separate from the ingest write path.
//!
//! Grounded on the teacher's `arc-swap`-backed hot-reloadable `Config`
//! (`config::init`/`config::get`): the same copy-on-write discipline,
//! generalized from one global value to one value per truck — a reader
//! takes a cheap `Arc` clone and never blocks a concurrently publishing
//! ingest worker, nor does a slow reader ever hold up ingestion.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::services::prediction::{FuelPrediction, PredictionInputs, PredictionService};
use crate::storage::PersistenceLayer;
use crate::types::{
    fuel_thresholds, EkfState, IdleKalmanState, Reading, RefuelEvent, TankSpec, TruckActivityState,
    TruckId,
};

/// Atomic read of one truck's estimator state, published by its owning
/// ingest worker after every processed reading.
#[derive(Debug, Clone)]
pub struct TruckSnapshot {
    pub truck_id: TruckId,
    pub tank: TankSpec,
    pub ekf_state: EkfState,
    pub idle_state: IdleKalmanState,
    pub activity: TruckActivityState,
    pub last_refuel: Option<RefuelEvent>,
    pub last_reading_at: Option<DateTime<Utc>>,
    pub cycles_processed: u64,
    pub recent_mpg: f64,
    /// Published volume/fuel_pct per the fusion-confidence selection rule —
    /// the fused estimate when fusion has enough channel coverage to trust,
    /// the EKF's own estimate otherwise. Use these over `ekf_state` directly
    /// for anything surfaced to an operator or fed into a forecast.
    pub published_fuel_pct: f64,
    pub published_volume_l: f64,
}

impl TruckSnapshot {
    pub fn uncertainty_pct(&self) -> f64 {
        self.ekf_state.uncertainty_pct(self.tank.capacity_l)
    }

    /// Staleness is a read-time judgment against the configured threshold,
    /// not a fact tracked on the estimator itself — a truck whose last
    /// reading was ten minutes ago isn't "stale" until someone asks.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_reading_at {
            Some(at) => (now - at).num_minutes() >= fuel_thresholds::STALE_READING_MINUTES,
            None => true,
        }
    }
}

/// Shared table ingest workers publish into and query handlers read from.
/// `DashMap` shards the truck-keyed index (insert-heavy, one entry per
/// truck, created once); `ArcSwap` makes each individual publish wait-free
/// for readers.
#[derive(Default)]
pub struct SnapshotTable {
    inner: DashMap<TruckId, ArcSwap<TruckSnapshot>>,
}

impl SnapshotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: TruckSnapshot) {
        if let Some(slot) = self.inner.get(&snapshot.truck_id) {
            slot.store(Arc::new(snapshot));
            return;
        }
        let truck_id = snapshot.truck_id.clone();
        self.inner.insert(truck_id, ArcSwap::from_pointee(snapshot));
    }

    pub fn get(&self, truck_id: &TruckId) -> Option<Arc<TruckSnapshot>> {
        self.inner.get(truck_id).map(|slot| slot.load_full())
    }

    pub fn fleet(&self) -> Vec<Arc<TruckSnapshot>> {
        self.inner.iter().map(|entry| entry.value().load_full()).collect()
    }

    pub fn truck_count(&self) -> usize {
        self.inner.len()
    }
}

/// Read-side API composed over a `SnapshotTable` and a `PersistenceLayer`.
/// Handed to the HTTP/CLI layer independent of `IngestPool`.
pub struct QueryService {
    snapshots: Arc<SnapshotTable>,
    persistence: Arc<dyn PersistenceLayer>,
    prediction: PredictionService,
}

impl QueryService {
    pub fn new(snapshots: Arc<SnapshotTable>, persistence: Arc<dyn PersistenceLayer>) -> Self {
        Self {
            snapshots,
            persistence,
            prediction: PredictionService::default(),
        }
    }

    /// Short-horizon forecast from a truck's current EKF rate/volume and its
    /// rolling mpg, or `None` if the truck hasn't published a snapshot yet.
    pub fn predict(&self, truck_id: &TruckId) -> Option<FuelPrediction> {
        let snapshot = self.snapshots.get(truck_id)?;
        Some(self.prediction.predict(
            truck_id,
            PredictionInputs {
                current_volume_l: snapshot.published_volume_l,
                current_rate_lph: snapshot.ekf_state.rate_lph(),
                recent_mpg: snapshot.recent_mpg,
                now: Utc::now(),
            },
        ))
    }

    pub fn snapshot(&self, truck_id: &TruckId) -> Option<Arc<TruckSnapshot>> {
        self.snapshots.get(truck_id)
    }

    pub fn fleet_snapshot(&self) -> Vec<Arc<TruckSnapshot>> {
        self.snapshots.fleet()
    }

    /// Trucks whose last reading is older than `fuel_thresholds::STALE_READING_MINUTES`.
    pub fn stale_trucks(&self) -> Vec<Arc<TruckSnapshot>> {
        let now = Utc::now();
        self.snapshots
            .fleet()
            .into_iter()
            .filter(|s| s.is_stale(now))
            .collect()
    }

    /// Recent archived readings for a truck, most-recent-first, delegating
    /// to whatever `PersistenceLayer` backend is configured.
    pub fn history(&self, truck_id: &TruckId, limit: usize) -> Vec<Reading> {
        self.persistence.list_readings(truck_id, limit).unwrap_or_default()
    }

    pub fn fleet_size(&self) -> usize {
        self.snapshots.truck_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryDAL;
    use chrono::TimeZone;

    fn snapshot(truck_id: &str, last_reading_at: Option<DateTime<Utc>>) -> TruckSnapshot {
        let tank = TankSpec::cylinder(400.0);
        let ekf_state = EkfState::initial(tank.capacity_l, 1.0);
        let published_volume_l = ekf_state.volume_l();
        TruckSnapshot {
            truck_id: TruckId::new(truck_id),
            ekf_state,
            tank: tank.clone(),
            idle_state: IdleKalmanState::default(),
            activity: TruckActivityState::EngineOff,
            last_refuel: None,
            last_reading_at,
            cycles_processed: 1,
            recent_mpg: 6.0,
            published_fuel_pct: published_volume_l / tank.capacity_l * 100.0,
            published_volume_l,
        }
    }

    #[test]
    fn publish_then_get_roundtrips() {
        let table = SnapshotTable::new();
        table.publish(snapshot("t1", Some(Utc::now())));
        assert!(table.get(&TruckId::new("t1")).is_some());
        assert!(table.get(&TruckId::new("missing")).is_none());
    }

    #[test]
    fn republish_overwrites_without_growing_the_table() {
        let table = SnapshotTable::new();
        table.publish(snapshot("t1", Some(Utc::now())));
        table.publish(snapshot("t1", Some(Utc::now())));
        assert_eq!(table.truck_count(), 1);
    }

    #[test]
    fn fleet_returns_every_truck() {
        let table = SnapshotTable::new();
        table.publish(snapshot("t1", Some(Utc::now())));
        table.publish(snapshot("t2", Some(Utc::now())));
        assert_eq!(table.fleet().len(), 2);
    }

    #[test]
    fn never_seen_truck_is_stale() {
        let s = snapshot("t1", None);
        assert!(s.is_stale(Utc::now()));
    }

    #[test]
    fn recent_reading_is_not_stale() {
        let s = snapshot("t1", Some(Utc::now()));
        assert!(!s.is_stale(Utc::now()));
    }

    #[test]
    fn old_reading_is_stale() {
        let old = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let s = snapshot("t1", Some(old));
        assert!(s.is_stale(Utc::now()));
    }

    #[test]
    fn predict_returns_none_for_a_truck_with_no_snapshot() {
        let service = QueryService::new(Arc::new(SnapshotTable::new()), Arc::new(InMemoryDAL::new()));
        assert!(service.predict(&TruckId::new("missing")).is_none());
    }

    #[test]
    fn predict_forecasts_from_the_published_snapshot() {
        let table = Arc::new(SnapshotTable::new());
        table.publish(snapshot("t1", Some(Utc::now())));
        let service = QueryService::new(table, Arc::new(InMemoryDAL::new()));

        let prediction = service.predict(&TruckId::new("t1")).expect("snapshot exists");
        assert_eq!(prediction.truck_id, TruckId::new("t1"));
        assert!(prediction.predicted_range_miles >= 0.0);
    }

    #[test]
    fn query_service_delegates_history_to_persistence() {
        let dal: Arc<dyn PersistenceLayer> = Arc::new(InMemoryDAL::new());
        let truck_id = TruckId::new("t1");
        dal.store_reading(&Reading::new("t1", Utc::now())).unwrap();

        let service = QueryService::new(Arc::new(SnapshotTable::new()), dal);
        assert_eq!(service.history(&truck_id, 10).len(), 1);
    }
}
