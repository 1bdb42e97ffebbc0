//! Idle Kalman filter state: scalar idle consumption estimate.

use serde::{Deserialize, Serialize};

/// Which channel(s) most recently contributed to an idle estimate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IdleSource {
    FuelRate,
    EcuCounter,
    FuelDelta,
    RpmModel,
    MultiSensor,
    Fallback,
}

impl std::fmt::Display for IdleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IdleSource::FuelRate => "fuel_rate",
            IdleSource::EcuCounter => "ecu_counter",
            IdleSource::FuelDelta => "fuel_delta",
            IdleSource::RpmModel => "rpm_model",
            IdleSource::MultiSensor => "multi_sensor",
            IdleSource::Fallback => "fallback",
        };
        write!(f, "{s}")
    }
}

/// Scalar Kalman state for per-truck idle gallons-per-hour estimation, plus
/// the adaptive-R innovation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleKalmanState {
    pub idle_gph: f64,
    pub uncertainty: f64,
    pub samples_count: u64,
    /// Recent innovations (measurement - estimate), most recent last.
    /// Bounded by config `idle_innovation_history_len` (default 100).
    pub innovation_history: std::collections::VecDeque<f64>,
}

impl Default for IdleKalmanState {
    fn default() -> Self {
        Self {
            idle_gph: 0.8,
            uncertainty: 0.5,
            samples_count: 0,
            innovation_history: std::collections::VecDeque::with_capacity(16),
        }
    }
}

impl IdleKalmanState {
    pub fn record_innovation(&mut self, innovation: f64, capacity: usize) {
        if self.innovation_history.len() >= capacity.max(1) {
            self.innovation_history.pop_front();
        }
        self.innovation_history.push_back(innovation);
    }
}
