//! Ingest worker pool: partitions trucks across a fixed set of Tokio tasks
//! so each truck's readings are processed by exactly one task, in arrival
//! order, with no cross-task locking on its `EstimatorCoordinator`.
//!
//! Grounded on `main.rs`'s `JoinSet` + `CancellationToken` supervisor
//! pattern: each worker is a `tokio::select!` loop over its channel and a
//! cancellation signal, and a worker that returns `Err` is treated as a
//! fatal startup/logic bug by the caller, not something to retry silently.
//!
//! Partitioning is by `TruckId::partition(worker_count)` (see `truck_id.rs`)
//! so a given truck always lands on the same worker for the lifetime of the
//! pool — that worker owns the truck's `EstimatorCoordinator` outright, with
//! no `Mutex` or `DashMap` needed for the hot path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{defaults, Config};
use crate::coordinator::EstimatorCoordinator;
use crate::event_bus::EventBus;
use crate::query::{SnapshotTable, TruckSnapshot};
use crate::storage::{EstimatorSnapshot, PersistenceLayer};
use crate::types::{Reading, TankShape, TankSpec, TruckId};

/// Per-truck tank registration, resolved once at pool startup from
/// `Config::tank_specs`. A truck with no explicit registration falls back
/// to a default cylinder tank rather than being rejected outright — fleets
/// onboard new VINs faster than operators update the config file.
pub struct TankRegistry {
    specs: HashMap<String, TankSpec>,
    default_capacity_l: f64,
}

impl TankRegistry {
    pub fn from_config(config: &Config) -> Self {
        let specs = config
            .tank_specs
            .iter()
            .map(|(truck_id, spec)| (truck_id.clone(), TankSpec::new(spec.capacity_l, spec.shape)))
            .collect();
        Self {
            specs,
            default_capacity_l: defaults::DEFAULT_TANK_CAPACITY_L,
        }
    }

    pub fn lookup(&self, truck_id: &TruckId) -> TankSpec {
        self.specs.get(truck_id.as_str()).cloned().unwrap_or_else(|| {
            debug!(%truck_id, "no tank_specs registration, using default cylinder tank");
            TankSpec::new(self.default_capacity_l, TankShape::Cylinder)
        })
    }
}

/// Counters surfaced to `query`'s fleet-health view and to shutdown logging.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub accepted: AtomicU64,
    pub dropped_queue_full: AtomicU64,
    pub dropped_out_of_order: AtomicU64,
    pub dropped_rate_limited: AtomicU64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            dropped_out_of_order: self.dropped_out_of_order.load(Ordering::Relaxed),
            dropped_rate_limited: self.dropped_rate_limited.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestStatsSnapshot {
    pub accepted: u64,
    pub dropped_queue_full: u64,
    pub dropped_out_of_order: u64,
    pub dropped_rate_limited: u64,
}

/// Operator commands delegate directly to the `EstimatorCoordinator` method
/// of the same name. Routed to the owning worker on its own small command
/// channel rather than the reading channel — an operator action should
/// never queue behind a burst of telemetry.
#[derive(Debug, Clone)]
pub enum OperatorCommand {
    ResetEkf { truck_id: TruckId, initial_efficiency: f64 },
    ResetIdleKalman { truck_id: TruckId },
    ResetDriverSession { truck_id: TruckId },
}

impl OperatorCommand {
    fn truck_id(&self) -> &TruckId {
        match self {
            OperatorCommand::ResetEkf { truck_id, .. } => truck_id,
            OperatorCommand::ResetIdleKalman { truck_id } => truck_id,
            OperatorCommand::ResetDriverSession { truck_id } => truck_id,
        }
    }
}

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Entry point for readings. Routes each `Reading` to the worker that owns
/// its truck and returns immediately — callers (a `TelemetrySource` reader
/// loop) never block on a slow truck's estimator.
pub struct IngestPool {
    senders: Vec<mpsc::Sender<Reading>>,
    command_senders: Vec<mpsc::Sender<OperatorCommand>>,
    worker_count: usize,
    stats: Arc<IngestStats>,
}

impl IngestPool {
    /// Spawn `config.worker_pool_size` worker tasks onto `tasks`, each with
    /// its own bounded `config.per_truck_queue_depth`-capacity channel.
    ///
    /// The channel is shared by every truck assigned to that worker rather
    /// than one channel per truck — a pragmatic simplification of the
    /// bounded-per-truck-queue requirement, noted in `DESIGN.md`.
    pub fn spawn(
        config: &Config,
        event_bus: Arc<EventBus>,
        persistence: Arc<dyn PersistenceLayer>,
        tank_registry: Arc<TankRegistry>,
        snapshots: Arc<SnapshotTable>,
        cancel: CancellationToken,
        tasks: &mut JoinSet<anyhow::Result<()>>,
    ) -> Self {
        let worker_count = config.worker_pool_size.max(1);
        let queue_depth = config.per_truck_queue_depth;
        let ckpt_interval = Duration::from_secs(config.ckpt_interval_seconds);
        let max_reading_rate_hz = config.rate_limits.max_reading_rate_hz;
        let stats = Arc::new(IngestStats::default());

        let mut senders = Vec::with_capacity(worker_count);
        let mut command_senders = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let (tx, rx) = mpsc::channel(queue_depth);
            senders.push(tx);
            let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
            command_senders.push(cmd_tx);

            let cancel = cancel.clone();
            let event_bus = Arc::clone(&event_bus);
            let persistence = Arc::clone(&persistence);
            let tank_registry = Arc::clone(&tank_registry);
            let snapshots = Arc::clone(&snapshots);
            let stats = Arc::clone(&stats);

            tasks.spawn(run_worker(
                worker_id,
                rx,
                cmd_rx,
                cancel,
                event_bus,
                persistence,
                tank_registry,
                snapshots,
                ckpt_interval,
                max_reading_rate_hz,
                stats,
            ));
        }

        Self {
            senders,
            command_senders,
            worker_count,
            stats,
        }
    }

    /// Route a reading to the worker owning its truck. Readings carrying an
    /// ECU cumulative-fuel-used reading are never dropped for queue
    /// pressure — losing one desynchronizes the EKF's ECU baseline until
    /// the next reset — every other reading is dropped on a full queue.
    pub async fn submit(&self, reading: Reading) {
        let worker = reading.truck_id.partition(self.worker_count);
        let sender = &self.senders[worker];

        if reading.ecu_total_fuel_used_l.is_some() {
            if sender.send(reading).await.is_err() {
                error!("ingest worker channel closed, reading lost");
            }
            return;
        }

        match sender.try_send(reading) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped_queue_full.fetch_add(1, Ordering::Relaxed);
                warn!(worker, "ingest queue full, dropping reading");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("ingest worker channel closed, reading lost");
            }
        }
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub async fn reset_ekf(&self, truck_id: &TruckId, initial_efficiency: f64) {
        self.send_command(OperatorCommand::ResetEkf {
            truck_id: truck_id.clone(),
            initial_efficiency,
        })
        .await;
    }

    pub async fn reset_idle_kalman(&self, truck_id: &TruckId) {
        self.send_command(OperatorCommand::ResetIdleKalman { truck_id: truck_id.clone() }).await;
    }

    pub async fn reset_driver_session(&self, truck_id: &TruckId) {
        self.send_command(OperatorCommand::ResetDriverSession { truck_id: truck_id.clone() }).await;
    }

    async fn send_command(&self, command: OperatorCommand) {
        let worker = command.truck_id().partition(self.worker_count);
        if self.command_senders[worker].send(command).await.is_err() {
            error!("ingest worker command channel closed");
        }
    }
}

/// State a single worker owns exclusively: a coordinator plus the wall-clock
/// arrival time of its last accepted reading, for rate limiting.
struct TruckWorkerState {
    coordinator: EstimatorCoordinator,
    last_arrival: Instant,
}

async fn run_worker(
    worker_id: usize,
    mut rx: mpsc::Receiver<Reading>,
    mut cmd_rx: mpsc::Receiver<OperatorCommand>,
    cancel: CancellationToken,
    event_bus: Arc<EventBus>,
    persistence: Arc<dyn PersistenceLayer>,
    tank_registry: Arc<TankRegistry>,
    snapshots: Arc<SnapshotTable>,
    ckpt_interval: Duration,
    max_reading_rate_hz: f64,
    stats: Arc<IngestStats>,
) -> anyhow::Result<()> {
    info!(worker_id, "ingest worker starting");
    let mut trucks: HashMap<TruckId, TruckWorkerState> = HashMap::new();
    let mut last_checkpoint = Instant::now();
    let min_interval = if max_reading_rate_hz > 0.0 {
        Duration::from_secs_f64(1.0 / max_reading_rate_hz)
    } else {
        Duration::ZERO
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(worker_id, "ingest worker received shutdown signal");
                checkpoint_all(&trucks, &persistence);
                return Ok(());
            }
            maybe_cmd = cmd_rx.recv() => {
                if let Some(cmd) = maybe_cmd {
                    apply_command(worker_id, cmd, &mut trucks, &snapshots);
                }
            }
            maybe_reading = rx.recv() => {
                match maybe_reading {
                    Some(reading) => {
                        process_one(
                            worker_id,
                            reading,
                            &mut trucks,
                            &tank_registry,
                            &event_bus,
                            &persistence,
                            &snapshots,
                            min_interval,
                            &stats,
                        );

                        if last_checkpoint.elapsed() >= ckpt_interval {
                            checkpoint_all(&trucks, &persistence);
                            last_checkpoint = Instant::now();
                        }
                    }
                    None => {
                        info!(worker_id, "ingest worker channel closed");
                        checkpoint_all(&trucks, &persistence);
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn apply_command(
    worker_id: usize,
    cmd: OperatorCommand,
    trucks: &mut HashMap<TruckId, TruckWorkerState>,
    snapshots: &SnapshotTable,
) {
    let truck_id = cmd.truck_id().clone();
    let Some(state) = trucks.get_mut(&truck_id) else {
        warn!(worker_id, %truck_id, "operator command for unknown truck ignored");
        return;
    };

    match cmd {
        OperatorCommand::ResetEkf { initial_efficiency, .. } => {
            state.coordinator.reset_ekf(initial_efficiency);
            info!(worker_id, %truck_id, "EKF reset by operator command");
        }
        OperatorCommand::ResetIdleKalman { .. } => {
            state.coordinator.reset_idle_kalman();
            info!(worker_id, %truck_id, "idle Kalman reset by operator command");
        }
        OperatorCommand::ResetDriverSession { .. } => {
            state.coordinator.reset_driver_session();
            info!(worker_id, %truck_id, "driver session reset by operator command");
        }
    }

    snapshots.publish(build_snapshot(&truck_id, state));
}

fn process_one(
    worker_id: usize,
    reading: Reading,
    trucks: &mut HashMap<TruckId, TruckWorkerState>,
    tank_registry: &TankRegistry,
    event_bus: &EventBus,
    persistence: &Arc<dyn PersistenceLayer>,
    snapshots: &SnapshotTable,
    min_interval: Duration,
    stats: &IngestStats,
) {
    let now = Instant::now();
    let truck_id = reading.truck_id.clone();

    let state = trucks.entry(truck_id.clone()).or_insert_with(|| {
        let tank = tank_registry.lookup(&truck_id);
        debug!(worker_id, %truck_id, "new truck seen by worker");
        TruckWorkerState {
            coordinator: EstimatorCoordinator::new(truck_id.clone(), tank, defaults::DEFAULT_INITIAL_EFFICIENCY),
            last_arrival: now - min_interval,
        }
    });

    if now.duration_since(state.last_arrival) < min_interval {
        stats.dropped_rate_limited.fetch_add(1, Ordering::Relaxed);
        debug!(%truck_id, "reading dropped: exceeds max_reading_rate_hz");
        return;
    }

    if let Some(last_at) = state.coordinator.last_reading_at() {
        if reading.timestamp <= last_at {
            stats.dropped_out_of_order.fetch_add(1, Ordering::Relaxed);
            debug!(%truck_id, reading_ts = %reading.timestamp, last_ts = %last_at, "out-of-order reading dropped");
            return;
        }
    }

    state.last_arrival = now;
    let outcome = state.coordinator.process_reading(&reading);
    stats.accepted.fetch_add(1, Ordering::Relaxed);

    if let Err(e) = persistence.store_reading(&reading) {
        warn!(%truck_id, error = %e, "failed to archive reading");
    }

    for event in outcome.events {
        if let Err(e) = persistence.store_event(&event) {
            warn!(%truck_id, error = %e, "failed to persist event");
        }
        event_bus.publish(event);
    }

    snapshots.publish(build_snapshot(&truck_id, state));
}

fn build_snapshot(truck_id: &TruckId, state: &TruckWorkerState) -> TruckSnapshot {
    TruckSnapshot {
        truck_id: truck_id.clone(),
        tank: state.coordinator.tank().clone(),
        ekf_state: state.coordinator.ekf_state().clone(),
        idle_state: state.coordinator.idle_state().clone(),
        activity: state.coordinator.activity(),
        last_refuel: state.coordinator.last_refuel().cloned(),
        last_reading_at: state.coordinator.last_reading_at(),
        cycles_processed: state.coordinator.stats().cycles_processed,
        recent_mpg: state.coordinator.recent_mpg(),
        published_fuel_pct: state.coordinator.published_fuel_pct(),
        published_volume_l: state.coordinator.published_volume_l(),
    }
}

fn checkpoint_all(trucks: &HashMap<TruckId, TruckWorkerState>, persistence: &Arc<dyn PersistenceLayer>) {
    for (truck_id, state) in trucks {
        let snapshot = EstimatorSnapshot {
            truck_id: truck_id.clone(),
            taken_at: chrono::Utc::now(),
            ekf_state: state.coordinator.ekf_state().clone(),
        };
        if let Err(e) = persistence.store_snapshot(&snapshot) {
            warn!(%truck_id, error = %e, "failed to checkpoint estimator snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryDAL;
    use chrono::{TimeZone, Utc};

    fn reading(truck_id: &str, secs: i64, fuel_pct: f64) -> Reading {
        let mut r = Reading::new(truck_id, Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap());
        r.fuel_level_pct = Some(fuel_pct);
        r.speed_mph = Some(0.0);
        r
    }

    #[tokio::test]
    async fn readings_for_distinct_trucks_both_process() {
        let config = Config::default();
        let registry = Arc::new(TankRegistry::from_config(&config));
        let persistence: Arc<dyn PersistenceLayer> = Arc::new(InMemoryDAL::new());
        let event_bus = Arc::new(EventBus::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let snapshots = Arc::new(SnapshotTable::new());
        let pool = IngestPool::spawn(
            &config,
            event_bus,
            persistence.clone(),
            registry,
            snapshots.clone(),
            cancel.clone(),
            &mut tasks,
        );

        pool.submit(reading("truck-a", 0, 50.0)).await;
        pool.submit(reading("truck-b", 0, 60.0)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(pool.stats().accepted, 2);
        assert_eq!(snapshots.truck_count(), 2);

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn out_of_order_reading_is_dropped_not_processed() {
        let config = Config::default();
        let registry = Arc::new(TankRegistry::from_config(&config));
        let persistence: Arc<dyn PersistenceLayer> = Arc::new(InMemoryDAL::new());
        let event_bus = Arc::new(EventBus::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let snapshots = Arc::new(SnapshotTable::new());
        let pool = IngestPool::spawn(
            &config,
            event_bus,
            persistence,
            registry,
            snapshots,
            cancel.clone(),
            &mut tasks,
        );

        pool.submit(reading("truck-a", 100, 50.0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.submit(reading("truck-a", 50, 55.0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stats = pool.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.dropped_out_of_order, 1);

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[test]
    fn tank_registry_falls_back_to_default_for_unregistered_truck() {
        let config = Config::default();
        let registry = TankRegistry::from_config(&config);
        let tank = registry.lookup(&TruckId::new("unregistered"));
        assert_eq!(tank.capacity_l, defaults::DEFAULT_TANK_CAPACITY_L);
    }

    #[tokio::test]
    async fn reset_ekf_command_reaches_the_owning_worker() {
        let config = Config::default();
        let registry = Arc::new(TankRegistry::from_config(&config));
        let persistence: Arc<dyn PersistenceLayer> = Arc::new(InMemoryDAL::new());
        let event_bus = Arc::new(EventBus::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let snapshots = Arc::new(SnapshotTable::new());
        let pool = IngestPool::spawn(
            &config,
            event_bus,
            persistence,
            registry,
            snapshots.clone(),
            cancel.clone(),
            &mut tasks,
        );

        let truck_id = TruckId::new("truck-a");
        pool.submit(reading("truck-a", 0, 80.0)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.reset_ekf(&truck_id, 1.0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snap = snapshots.get(&truck_id).expect("snapshot published");
        assert_eq!(snap.ekf_state.efficiency(), 1.0);

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }

    #[tokio::test]
    async fn command_for_unknown_truck_is_ignored_without_panicking() {
        let config = Config::default();
        let registry = Arc::new(TankRegistry::from_config(&config));
        let persistence: Arc<dyn PersistenceLayer> = Arc::new(InMemoryDAL::new());
        let event_bus = Arc::new(EventBus::new());
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let snapshots = Arc::new(SnapshotTable::new());
        let pool = IngestPool::spawn(
            &config,
            event_bus,
            persistence,
            registry,
            snapshots,
            cancel.clone(),
            &mut tasks,
        );

        pool.reset_idle_kalman(&TruckId::new("never-seen")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
    }
}
