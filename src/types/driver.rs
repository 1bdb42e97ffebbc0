//! Driver session and behavior-scoring types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TruckId;

/// An in-progress driving session, accumulated sample-by-sample by the
/// coordinator and finalized by `services::driver_behavior` on session end
/// (engine-off after having been driving).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSession {
    pub driver_id: String,
    pub truck_id: TruckId,
    pub started_at: DateTime<Utc>,
    pub speed_samples_mph: Vec<f64>,
    pub rpm_samples: Vec<f64>,
    pub consumption_samples_gph: Vec<f64>,
    pub idle_pct_samples: Vec<f64>,
    pub distance_miles: f64,
    pub fuel_used_liters: f64,
}

impl DriverSession {
    pub fn new(driver_id: impl Into<String>, truck_id: TruckId, started_at: DateTime<Utc>) -> Self {
        Self {
            driver_id: driver_id.into(),
            truck_id,
            started_at,
            speed_samples_mph: Vec::new(),
            rpm_samples: Vec::new(),
            consumption_samples_gph: Vec::new(),
            idle_pct_samples: Vec::new(),
            distance_miles: 0.0,
            fuel_used_liters: 0.0,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.consumption_samples_gph.len()
    }
}

/// Scored result of a completed driving session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverScore {
    pub driver_id: String,
    pub truck_id: TruckId,
    pub session_started_at: DateTime<Utc>,
    pub duration_minutes: f64,
    pub distance_miles: f64,
    pub fuel_used_liters: f64,
    pub average_speed_mph: f64,
    pub speed_variance_mph2: f64,
    pub avg_idle_pct: f64,
    pub fuel_efficiency_score: u8,
    pub aggressiveness_score: u8,
    pub safety_score: u8,
    pub overall_rating_stars: u8,
    pub comments: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Lifetime aggregate profile for one driver, updated after each session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverProfile {
    pub driver_id: String,
    pub total_sessions: u64,
    pub total_distance_miles: f64,
    pub total_fuel_used_liters: f64,
    pub avg_efficiency_score: f64,
    pub avg_aggressiveness_score: f64,
    pub avg_safety_score: f64,
    pub avg_rating_stars: f64,
}
