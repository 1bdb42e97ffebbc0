//! Raw telemetry reading — one packet of sensor channels for one truck.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TruckId;

/// A single telemetry packet. Every sensor channel is optional — a reading
/// with only `fuel_level_pct` set is as valid as one with all channels
/// populated. Absence must never be treated as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub truck_id: TruckId,
    pub timestamp: DateTime<Utc>,

    /// Fuel sender level, percent of tank capacity. Range [0, 100].
    pub fuel_level_pct: Option<f64>,
    /// ECU cumulative fuel consumed, liters. Monotonically non-decreasing
    /// except across an ECU reset, which the fusion/EKF layers detect.
    pub ecu_total_fuel_used_l: Option<f64>,
    /// ECU instantaneous fuel rate, gallons/hour. Range [0, 50].
    pub ecu_fuel_rate_gph: Option<f64>,
    /// ECU cumulative idle fuel burned, gallons.
    pub ecu_total_idle_fuel_gal: Option<f64>,
    /// Vehicle speed, mph. Range [0, 120].
    pub speed_mph: Option<f64>,
    /// Engine RPM. Range [0, 3000].
    pub rpm: Option<f64>,
    /// Engine load, percent. Range [0, 100].
    pub engine_load_pct: Option<f64>,
    pub altitude_ft: Option<f64>,
    pub ambient_temp_f: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Geofence tag the telemetry gateway stamped this reading with, if the
    /// truck is currently inside one. Matched against
    /// `Config.activity_classification.productive_geofences` to split idle
    /// time; absence is not inside any geofence.
    pub geofence_id: Option<String>,
}

impl Reading {
    pub fn new(truck_id: impl Into<TruckId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            truck_id: truck_id.into(),
            timestamp,
            fuel_level_pct: None,
            ecu_total_fuel_used_l: None,
            ecu_fuel_rate_gph: None,
            ecu_total_idle_fuel_gal: None,
            speed_mph: None,
            rpm: None,
            engine_load_pct: None,
            altitude_ft: None,
            ambient_temp_f: None,
            latitude: None,
            longitude: None,
            geofence_id: None,
        }
    }

    /// True if the truck is not moving (used by activity classification
    /// and idle-consumption estimation).
    pub fn is_stationary(&self) -> bool {
        self.speed_mph.map(|v| v < 1.0).unwrap_or(false)
    }

    /// True if the engine is running based on RPM.
    pub fn engine_running(&self) -> bool {
        self.rpm.map(|v| v > 200.0).unwrap_or(false)
    }

    /// Range/sanity check for a channel, independent of fusion history.
    /// Returns `false` for values clearly outside physical bounds.
    pub fn channel_in_range(&self) -> ChannelValidity {
        ChannelValidity {
            fuel_level_pct: in_range(self.fuel_level_pct, 0.0, 100.0),
            ecu_fuel_rate_gph: in_range(self.ecu_fuel_rate_gph, 0.0, 50.0),
            speed_mph: in_range(self.speed_mph, 0.0, 120.0),
            rpm: in_range(self.rpm, 0.0, 3000.0),
            engine_load_pct: in_range(self.engine_load_pct, 0.0, 100.0),
        }
    }
}

fn in_range(v: Option<f64>, lo: f64, hi: f64) -> bool {
    match v {
        Some(x) => x.is_finite() && x >= lo && x <= hi,
        None => true, // absence is not a range violation
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelValidity {
    pub fuel_level_pct: bool,
    pub ecu_fuel_rate_gph: bool,
    pub speed_mph: bool,
    pub rpm: bool,
    pub engine_load_pct: bool,
}

impl ChannelValidity {
    pub fn all_valid(&self) -> bool {
        self.fuel_level_pct
            && self.ecu_fuel_rate_gph
            && self.speed_mph
            && self.rpm
            && self.engine_load_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading() -> Reading {
        Reading::new("truck-1", Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    #[test]
    fn missing_channels_are_not_range_violations() {
        let r = reading();
        assert!(r.channel_in_range().all_valid());
    }

    #[test]
    fn out_of_range_fuel_level_flagged() {
        let mut r = reading();
        r.fuel_level_pct = Some(150.0);
        assert!(!r.channel_in_range().fuel_level_pct);
    }

    #[test]
    fn nan_is_invalid() {
        let mut r = reading();
        r.rpm = Some(f64::NAN);
        assert!(!r.channel_in_range().rpm);
    }

    #[test]
    fn stationary_and_engine_running() {
        let mut r = reading();
        r.speed_mph = Some(0.2);
        r.rpm = Some(650.0);
        assert!(r.is_stationary());
        assert!(r.engine_running());
    }
}
