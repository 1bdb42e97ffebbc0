//! Tagged event types published on the internal event bus.
//!
//! One variant per topic (spec's fuel/driver/anomaly/maintenance/sensor/
//! system event families), replacing the string-keyed dict payloads of the
//! system this pipeline is modeled on — the compiler now enforces that a
//! subscriber handles every event shape it claims to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RiskLevel, TruckId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    FuelLevelChange {
        truck_id: TruckId,
        fuel_pct: f64,
        consumption_gph: f64,
    },
    RefuelDetected {
        truck_id: TruckId,
        delta_pct: f64,
        fuel_pct_after: f64,
    },
    FuelAnomaly {
        truck_id: TruckId,
        anomaly_type: String,
        severity: RiskLevel,
        message: String,
        confidence: f64,
    },
    SiphoningDetected {
        truck_id: TruckId,
        rate_lph: f64,
    },
    FuelPrediction {
        truck_id: TruckId,
        predicted_empty_at: DateTime<Utc>,
        predicted_range_miles: f64,
    },

    DriverSessionStart {
        driver_id: String,
        truck_id: TruckId,
    },
    DriverSessionEnd {
        driver_id: String,
        truck_id: TruckId,
        score: f64,
    },
    AggressiveDriving {
        driver_id: String,
        truck_id: TruckId,
        score: f64,
    },
    EfficientDriving {
        driver_id: String,
        truck_id: TruckId,
        score: f64,
    },
    UnsafePattern {
        driver_id: String,
        truck_id: TruckId,
        pattern: String,
    },

    MaintenanceAlert {
        truck_id: TruckId,
        severity: RiskLevel,
        message: String,
    },
    EfficiencyDriftDetected {
        truck_id: TruckId,
        drift_fraction: f64,
    },

    SensorMalfunction {
        truck_id: TruckId,
        channel: String,
        message: String,
    },
    SensorHealthCheck {
        truck_id: TruckId,
        healthy: bool,
    },

    SystemError {
        component: String,
        message: String,
    },
    ConfigurationChange {
        key: String,
    },
}

impl Event {
    /// Topic name, mirroring the original system's Kafka topic strings —
    /// used for replay filtering and metrics labeling, not for dispatch
    /// (dispatch is exhaustive pattern matching on the variant).
    pub fn topic(&self) -> &'static str {
        match self {
            Event::FuelLevelChange { .. } => "fuel_level_change",
            Event::RefuelDetected { .. } => "refuel_detected",
            Event::FuelAnomaly { .. } => "fuel_anomaly",
            Event::SiphoningDetected { .. } => "siphoning_detected",
            Event::FuelPrediction { .. } => "fuel_prediction",
            Event::DriverSessionStart { .. } => "driver_session_start",
            Event::DriverSessionEnd { .. } => "driver_session_end",
            Event::AggressiveDriving { .. } => "aggressive_driving",
            Event::EfficientDriving { .. } => "efficient_driving",
            Event::UnsafePattern { .. } => "unsafe_pattern",
            Event::MaintenanceAlert { .. } => "maintenance_alert",
            Event::EfficiencyDriftDetected { .. } => "efficiency_drift_detected",
            Event::SensorMalfunction { .. } => "sensor_malfunction",
            Event::SensorHealthCheck { .. } => "sensor_health_check",
            Event::SystemError { .. } => "system_error",
            Event::ConfigurationChange { .. } => "configuration_change",
        }
    }

    pub fn truck_id(&self) -> Option<&TruckId> {
        match self {
            Event::FuelLevelChange { truck_id, .. }
            | Event::RefuelDetected { truck_id, .. }
            | Event::FuelAnomaly { truck_id, .. }
            | Event::SiphoningDetected { truck_id, .. }
            | Event::FuelPrediction { truck_id, .. }
            | Event::DriverSessionStart { truck_id, .. }
            | Event::DriverSessionEnd { truck_id, .. }
            | Event::AggressiveDriving { truck_id, .. }
            | Event::EfficientDriving { truck_id, .. }
            | Event::UnsafePattern { truck_id, .. }
            | Event::MaintenanceAlert { truck_id, .. }
            | Event::EfficiencyDriftDetected { truck_id, .. }
            | Event::SensorMalfunction { truck_id, .. }
            | Event::SensorHealthCheck { truck_id, .. } => Some(truck_id),
            Event::SystemError { .. } | Event::ConfigurationChange { .. } => None,
        }
    }
}

/// A logged event plus the wall-clock time it was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub event: Event,
    pub published_at: DateTime<Utc>,
}
