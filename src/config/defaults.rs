//! Default constants for the top-level `Config` struct.
//!
//! Centralises magic numbers so they are overridable from one place instead
//! of scattered through `ingest`/`query`/`fusion`/`idle_kalman`.

/// Number of Tokio worker tasks partitioning trucks by `TruckId::partition`.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Bounded per-truck reading queue depth before drop-oldest kicks in.
pub const DEFAULT_PER_TRUCK_QUEUE_DEPTH: usize = 256;

/// Interval between coordinator-state checkpoint writes to the persistence
/// layer, seconds.
pub const DEFAULT_CKPT_INTERVAL_SECONDS: u64 = 60;

/// Deadline for in-flight readings to drain after a shutdown signal before
/// the worker pool force-stops, seconds.
pub const DEFAULT_GRACEFUL_SHUTDOWN_DEADLINE_SECONDS: u64 = 30;

/// Fixed-capacity ring buffer size per (truck, channel) in the fusion
/// engine, per spec's ring-buffer redesign note.
pub const DEFAULT_FUSION_RING_BUFFER_CAPACITY: usize = 20;

/// Innovation-history ring buffer size feeding the idle Kalman filter's
/// adaptive-R mechanism.
pub const DEFAULT_IDLE_INNOVATION_HISTORY_CAPACITY: usize = 100;

/// Maximum accepted reading rate per truck before readings are throttled,
/// in Hz. Readings arriving faster than this are dropped rather than
/// queued, since a telemetry source malfunctioning into a tight loop should
/// not be allowed to starve other trucks' queues.
pub const DEFAULT_MAX_READING_RATE_HZ: f64 = 5.0;

/// Rolling consumption/speed history capacity feeding anomaly-threshold
/// recomputation, per truck.
pub const DEFAULT_CONSUMPTION_HISTORY_CAPACITY: usize = 500;

/// Tank capacity assumed for a truck with no `tank_specs` registration,
/// liters. A mid-size Class 8 single-tank fill.
pub const DEFAULT_TANK_CAPACITY_L: f64 = 400.0;

/// Starting efficiency factor (consumption model multiplier) for a newly
/// seen truck before any drift has been observed.
pub const DEFAULT_INITIAL_EFFICIENCY: f64 = 1.0;

// serde `default = "..."` requires a function path, not a const.

pub fn default_worker_pool_size() -> usize {
    DEFAULT_WORKER_POOL_SIZE
}

pub fn default_per_truck_queue_depth() -> usize {
    DEFAULT_PER_TRUCK_QUEUE_DEPTH
}

pub fn default_ckpt_interval_seconds() -> u64 {
    DEFAULT_CKPT_INTERVAL_SECONDS
}

pub fn default_graceful_shutdown_deadline_seconds() -> u64 {
    DEFAULT_GRACEFUL_SHUTDOWN_DEADLINE_SECONDS
}
