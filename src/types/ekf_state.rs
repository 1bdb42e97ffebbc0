//! Fuel EKF state: 3-state vector plus covariance.

use serde::{Deserialize, Serialize};

pub const EKF_RATE_MIN_LPH: f64 = 0.5;
pub const EKF_RATE_MAX_LPH: f64 = 30.0;
pub const EKF_EFFICIENCY_MIN: f64 = 0.5;
pub const EKF_EFFICIENCY_MAX: f64 = 2.0;

/// `x = [volume_L, rate_Lph, efficiency_factor]`, `P` its 3x3 covariance.
///
/// Invariants: `0 <= volume_L <= capacity_L`, `0.5 <= rate_Lph <= 30`,
/// `0.5 <= efficiency_factor <= 2.0`. `predict`/`update` in `ekf` enforce
/// these by clamping after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EkfState {
    pub x: [f64; 3],
    pub p: [[f64; 3]; 3],
    /// Last ECU cumulative total seen, for delta computation. `None` until
    /// the first ECU reading arrives.
    pub last_ecu_total_l: Option<f64>,
}

impl EkfState {
    pub fn initial(capacity_l: f64, initial_efficiency: f64) -> Self {
        Self {
            x: [capacity_l * 0.5, 5.0, initial_efficiency],
            p: [
                [100.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 0.01],
            ],
            last_ecu_total_l: None,
        }
    }

    pub fn volume_l(&self) -> f64 {
        self.x[0]
    }

    pub fn rate_lph(&self) -> f64 {
        self.x[1]
    }

    pub fn efficiency(&self) -> f64 {
        self.x[2]
    }

    pub fn uncertainty_pct(&self, capacity_l: f64) -> f64 {
        if capacity_l <= 0.0 {
            return 0.0;
        }
        self.p[0][0].max(0.0).sqrt() / capacity_l * 100.0
    }

    pub fn has_nan_or_inf(&self) -> bool {
        self.x.iter().any(|v| !v.is_finite())
            || self.p.iter().flatten().any(|v| !v.is_finite())
    }

    pub(crate) fn clamp_to_invariants(&mut self, capacity_l: f64) {
        self.x[0] = self.x[0].clamp(0.0, capacity_l);
        self.x[1] = self.x[1].clamp(EKF_RATE_MIN_LPH, EKF_RATE_MAX_LPH);
        self.x[2] = self.x[2].clamp(EKF_EFFICIENCY_MIN, EKF_EFFICIENCY_MAX);
    }
}
