//! Anomaly and alerting thresholds for the fuel estimation pipeline.

use serde::{Deserialize, Serialize};

/// Thresholds for fuel anomaly detection, theft/siphon flagging, and data
/// quality gating. Overridable via config (`[thresholds]` table) — these
/// are the defaults.
pub mod fuel_thresholds {
    /// Sudden fuel-level drop over a short window that cannot be explained
    /// by consumption, percent of tank capacity.
    pub const SUDDEN_DROP_PCT: f64 = 10.0;
    /// Window over which a sudden drop is evaluated, seconds.
    pub const SUDDEN_DROP_WINDOW_SECONDS: i64 = 300;
    /// Drain rate above this while stationary and engine off is a probable
    /// siphon event, liters/hour.
    pub const SIPHON_RATE_LPH: f64 = 20.0;

    /// EKF volume uncertainty above this percent of capacity triggers a
    /// low-confidence estimate flag.
    pub const UNCERTAINTY_WARNING_PCT: f64 = 8.0;
    pub const UNCERTAINTY_CRITICAL_PCT: f64 = 15.0;

    /// Sensor-vs-EKF disagreement beyond this percent of capacity, sustained
    /// over `SENSOR_DISAGREEMENT_WINDOW_SECONDS`, flags a sensor malfunction.
    pub const SENSOR_DISAGREEMENT_PCT: f64 = 12.0;
    pub const SENSOR_DISAGREEMENT_WINDOW_SECONDS: i64 = 600;

    /// Efficiency factor drift outside this range from 1.0 over a rolling
    /// week suggests a maintenance issue (fuel filter, injector wear).
    pub const EFFICIENCY_DRIFT_WARNING: f64 = 0.15;
    pub const EFFICIENCY_DRIFT_CRITICAL: f64 = 0.30;

    /// Idle burn rate above this, sustained, flags excessive-idle driver
    /// behavior (engine parameters suggest no load justifying the burn).
    pub const EXCESSIVE_IDLE_LPH: f64 = 3.5;
    pub const EXCESSIVE_IDLE_MIN_DURATION_SECONDS: i64 = 600;

    /// Harsh driving thresholds feeding the driver behavior score.
    pub const HARSH_ACCEL_MPH_PER_SEC: f64 = 6.0;
    pub const HARSH_BRAKE_MPH_PER_SEC: f64 = -8.0;
    pub const SPEEDING_THRESHOLD_MPH: f64 = 75.0;

    /// Cooldown between repeat alerts of the same kind for the same truck.
    pub const DEFAULT_COOLDOWN_SECONDS: u64 = 300;
    pub const CRITICAL_BYPASS_COOLDOWN: bool = true;

    /// A truck with no reading in this long is reported stale in fleet
    /// snapshots rather than silently showing its last estimate as current.
    pub const STALE_READING_MINUTES: i64 = 15;

    /// Fuel level at or below this percent raises a `low_fuel` alert.
    /// `fuel_level_pct = 0` is accepted as input and triggers this same path.
    pub const LOW_FUEL_PCT: f64 = 15.0;
    /// Fuel level at or below this percent escalates `low_fuel` to critical.
    pub const LOW_FUEL_CRITICAL_PCT: f64 = 5.0;
}

/// Ensemble weights for the anomaly-confidence blend (data-quality,
/// sensor-agreement, and physical-plausibility checks).
pub mod weights {
    pub const DATA_QUALITY: f64 = 0.30;
    pub const SENSOR_AGREEMENT: f64 = 0.40;
    pub const PHYSICAL_PLAUSIBILITY: f64 = 0.30;
}

/// Severity assessment for a detected anomaly or alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum RiskLevel {
    #[default]
    Low = 0,
    Elevated = 1,
    High = 2,
    Critical = 3,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Elevated => write!(f, "ELEVATED"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}
