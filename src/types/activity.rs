//! Truck activity classification, auto-detected from telemetry.

use serde::{Deserialize, Serialize};

const DRIVING_SPEED_MPH: f64 = 5.0;
const ENGINE_ON_RPM: f64 = 200.0;

/// Operational state of a truck, classified from speed/RPM/geofence.
///
/// - **Driving**: speed > 5 mph.
/// - **ProductiveIdle**: stationary, engine running, inside a configured
///   productive geofence (e.g. a customer loading dock).
/// - **NonProductiveIdle**: stationary, engine running, not in a productive
///   geofence.
/// - **EngineOff**: `rpm == 0` (or absent) — takes priority over speed.
/// - **Offline**: no reading for longer than the configured stale window.
///   Never returned by `classify`; applied separately by a staleness sweep
///   over published snapshots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
pub enum TruckActivityState {
    Driving,
    ProductiveIdle,
    NonProductiveIdle,
    #[default]
    EngineOff,
    Offline,
}

impl TruckActivityState {
    pub fn short_code(&self) -> &'static str {
        match self {
            TruckActivityState::Driving => "DRIVE",
            TruckActivityState::ProductiveIdle => "P_IDLE",
            TruckActivityState::NonProductiveIdle => "NP_IDLE",
            TruckActivityState::EngineOff => "OFF",
            TruckActivityState::Offline => "OFFLINE",
        }
    }

    pub fn is_engine_running(&self) -> bool {
        matches!(self, Self::Driving | Self::ProductiveIdle | Self::NonProductiveIdle)
    }

    /// True for either idle flavor: stationary with the engine running.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::ProductiveIdle | Self::NonProductiveIdle)
    }
}

impl std::fmt::Display for TruckActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TruckActivityState::Driving => write!(f, "Driving"),
            TruckActivityState::ProductiveIdle => write!(f, "ProductiveIdle"),
            TruckActivityState::NonProductiveIdle => write!(f, "NonProductiveIdle"),
            TruckActivityState::EngineOff => write!(f, "EngineOff"),
            TruckActivityState::Offline => write!(f, "Offline"),
        }
    }
}

/// Classify the current activity state from the latest reading.
///
/// `rpm == 0` (or missing) wins over every other condition, matching the
/// state table's column order — a stopped engine is never "idle", it's off,
/// no matter how fast the truck last happened to be moving. `productive` is
/// the geofence-membership call; resolving it (matching a reading's
/// `geofence_id` against configured productive geofences) is the caller's
/// job, not this function's.
pub fn classify(speed_mph: Option<f64>, rpm: Option<f64>, productive: bool) -> TruckActivityState {
    let engine_on = rpm.map(|v| v > ENGINE_ON_RPM).unwrap_or(false);
    if !engine_on {
        return TruckActivityState::EngineOff;
    }

    let moving = speed_mph.map(|v| v > DRIVING_SPEED_MPH).unwrap_or(false);
    if moving {
        TruckActivityState::Driving
    } else if productive {
        TruckActivityState::ProductiveIdle
    } else {
        TruckActivityState::NonProductiveIdle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_with_engine_on_is_driving() {
        assert_eq!(classify(Some(30.0), Some(1500.0), true), TruckActivityState::Driving);
    }

    #[test]
    fn stationary_engine_on_in_productive_geofence_is_productive_idle() {
        assert_eq!(classify(Some(0.0), Some(700.0), true), TruckActivityState::ProductiveIdle);
    }

    #[test]
    fn stationary_engine_on_outside_geofence_is_non_productive_idle() {
        assert_eq!(classify(Some(0.0), Some(700.0), false), TruckActivityState::NonProductiveIdle);
    }

    #[test]
    fn rpm_zero_is_engine_off_even_while_moving() {
        assert_eq!(classify(Some(30.0), Some(0.0), false), TruckActivityState::EngineOff);
    }

    #[test]
    fn missing_rpm_defaults_to_engine_off() {
        assert_eq!(classify(Some(30.0), None, false), TruckActivityState::EngineOff);
    }

    #[test]
    fn missing_channels_default_to_engine_off() {
        assert_eq!(classify(None, None, false), TruckActivityState::EngineOff);
    }
}
