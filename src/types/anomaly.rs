//! Fuel anomaly classification types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RiskLevel, TruckId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnomalyCategory {
    Siphoning,
    SensorMalfunction,
    SlowLeak,
    ConsumptionSpike,
    InconsistentRefuel,
    ExcessiveIdle,
}

impl AnomalyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyCategory::Siphoning => "siphoning",
            AnomalyCategory::SensorMalfunction => "sensor_malfunction",
            AnomalyCategory::SlowLeak => "slow_leak",
            AnomalyCategory::ConsumptionSpike => "consumption_spike",
            AnomalyCategory::InconsistentRefuel => "inconsistent_refuel",
            AnomalyCategory::ExcessiveIdle => "idle_excessive",
        }
    }
}

impl std::fmt::Display for AnomalyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-truck adaptive thresholds, derived from rolling consumption history
/// (percentiles, not a trained model — see `services::anomaly`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    pub consumption_mean_gph: f64,
    pub consumption_p95_gph: f64,
    pub consumption_std_gph: f64,
    pub idle_p90_gph: f64,
    pub highway_p95_gph: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            consumption_mean_gph: 2.0,
            consumption_p95_gph: 5.0,
            consumption_std_gph: 1.0,
            idle_p90_gph: 0.5,
            highway_p95_gph: 4.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub truck_id: TruckId,
    pub is_anomaly: bool,
    pub category: Option<AnomalyCategory>,
    pub confidence: f64,
    pub severity: RiskLevel,
    pub message: String,
    pub detected_at: DateTime<Utc>,
}
