//! Application composition root.
//!
//! Owns every collaborator explicitly — ingest pool, event bus,
//! persistence layer, query service — rather than reaching through module
//! globals. Only `config::get()`/`config::init()` remain a process-wide
//! singleton (the hot-reload contract requires it); everything downstream
//! of ingest is constructed here and threaded through.
//!
//! Grounded on the teacher's `main.rs`, which composes `AppState`,
//! `PipelineCoordinator`, and `ThresholdManager` into one bundle handed to
//! both the HTTP layer and the ingestion task — generalized here to the
//! ingest pool / event bus / persistence layer / query service bundle a
//! fuel pipeline needs instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::event_bus::EventBus;
use crate::ingest::{IngestPool, TankRegistry};
use crate::query::{QueryService, SnapshotTable};
use crate::storage::{InMemoryDAL, PersistenceLayer};
use crate::telemetry::{SourceError, TelemetrySource};
use crate::types::TruckId;

/// Everything the running system needs, wired up once at startup.
pub struct Application {
    ingest: IngestPool,
    query: Arc<QueryService>,
    event_bus: Arc<EventBus>,
    persistence: Arc<dyn PersistenceLayer>,
    cancel: CancellationToken,
    tasks: JoinSet<anyhow::Result<()>>,
}

impl Application {
    /// Build every collaborator and spawn the ingest worker pool onto an
    /// internal `JoinSet`. Does not start reading telemetry — call
    /// `run_source` once built, so tests can construct an `Application`
    /// without a live source.
    pub fn new(config: &Config) -> Self {
        Self::with_persistence(config, Arc::new(InMemoryDAL::new()))
    }

    /// As `new`, but with an explicit persistence backend — the seam a
    /// durable KV/columnar implementation plugs into.
    pub fn with_persistence(config: &Config, persistence: Arc<dyn PersistenceLayer>) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let tank_registry = Arc::new(TankRegistry::from_config(config));
        let snapshots = Arc::new(SnapshotTable::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let ingest = IngestPool::spawn(
            config,
            Arc::clone(&event_bus),
            Arc::clone(&persistence),
            tank_registry,
            Arc::clone(&snapshots),
            cancel.clone(),
            &mut tasks,
        );

        let query = Arc::new(QueryService::new(snapshots, Arc::clone(&persistence)));

        info!(backend = persistence.backend_name(), workers = ingest.worker_count(), "application started");

        Self {
            ingest,
            query,
            event_bus,
            persistence,
            cancel,
            tasks,
        }
    }

    pub fn query(&self) -> &Arc<QueryService> {
        &self.query
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn persistence(&self) -> &Arc<dyn PersistenceLayer> {
        &self.persistence
    }

    pub fn ingest(&self) -> &IngestPool {
        &self.ingest
    }

    /// Signal shutdown without waiting for workers to drain — pairs with a
    /// Ctrl-C handler racing against `run_source`. `shutdown` still needs
    /// to be called afterward to join the workers.
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }

    /// Drain `source` into the ingest pool until it's exhausted or shutdown
    /// is signalled. Returns the number of readings submitted.
    pub async fn run_source(&self, mut source: Box<dyn TelemetrySource>) -> anyhow::Result<u64> {
        let mut submitted = 0u64;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(submitted, "telemetry source reader stopped: shutdown signal");
                    return Ok(submitted);
                }
                batch = source.next_batch() => {
                    match batch {
                        Ok(readings) => {
                            for reading in readings {
                                self.ingest.submit(reading).await;
                                submitted += 1;
                            }
                        }
                        Err(SourceError::Exhausted) => {
                            info!(submitted, "telemetry source exhausted");
                            return Ok(submitted);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Operator command: discard a truck's EKF state and reinitialize, e.g.
    /// after a tank re-registration or detected unrecoverable drift.
    pub async fn reset_ekf(&self, truck_id: &TruckId, initial_efficiency: f64) {
        self.ingest.reset_ekf(truck_id, initial_efficiency).await;
    }

    pub async fn reset_idle_kalman(&self, truck_id: &TruckId) {
        self.ingest.reset_idle_kalman(truck_id).await;
    }

    pub async fn reset_driver_session(&self, truck_id: &TruckId) {
        self.ingest.reset_driver_session(truck_id).await;
    }

    /// Signal every ingest worker to checkpoint and stop, waiting up to
    /// `deadline` before aborting anything still running.
    pub async fn shutdown(mut self, deadline: Duration) {
        self.cancel.cancel();
        let drained = tokio::time::timeout(deadline, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(deadline_s = deadline.as_secs(), "graceful shutdown deadline exceeded, aborting remaining workers");
            self.tasks.abort_all();
        } else {
            info!("all ingest workers shut down cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{SyntheticScenario, SyntheticTelemetrySource};

    #[tokio::test]
    async fn run_source_drains_a_synthetic_scenario_and_publishes_a_snapshot() {
        let config = Config::default();
        let app = Application::new(&config);

        let truck_id = TruckId::new("truck-1");
        let source = Box::new(SyntheticTelemetrySource::new(
            SyntheticScenario::SaddleTankRefuel,
            truck_id.clone(),
            4,
        ));

        let submitted = app.run_source(source).await.unwrap();
        assert_eq!(submitted, 7);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(app.query().snapshot(&truck_id).is_some());

        app.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn reset_commands_are_reachable_through_the_application() {
        let config = Config::default();
        let app = Application::new(&config);

        let truck_id = TruckId::new("truck-1");
        let source = Box::new(SyntheticTelemetrySource::new(
            SyntheticScenario::HighwayCruise,
            truck_id.clone(),
            16,
        ));
        app.run_source(source).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        app.reset_ekf(&truck_id, 1.0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snap = app.query().snapshot(&truck_id).expect("snapshot exists");
        assert_eq!(snap.ekf_state.efficiency(), 1.0);

        app.shutdown(Duration::from_secs(1)).await;
    }
}
