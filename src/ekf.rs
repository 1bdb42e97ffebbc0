//! Extended Kalman Filter for per-truck fuel volume / rate / efficiency.
//!
//! State `x = [volume_L, rate_Lph, efficiency_factor]`. Nonlinear state
//! transition models consumption as a function of idle burn, aerodynamic
//! drag, engine load, grade, and ambient temperature; the tank's sender
//! response (`tank_model`) supplies the nonlinear measurement model for the
//! fuel-level sensor channel.

use tracing::{debug, warn};

use crate::tank_model;
use crate::types::{EkfState, TankSpec};

const Q: [f64; 3] = [0.1, 0.5, 0.001];
const R_FUEL_SENSOR: f64 = 25.0;
const R_ECU: f64 = 0.01;
const R_FUEL_RATE: f64 = 1.0;

const BASE_IDLE_LPH: f64 = 1.2;
const AERO_COEF: f64 = 3e-4;
const RATE_BLEND_ALPHA: f64 = 0.3;
const EFFICIENCY_SMOOTH_ALPHA: f64 = 0.05;
const FUEL_RATE_MISMATCH_THRESHOLD_LPH: f64 = 5.0;
const FUEL_RATE_BLEND_ALPHA: f64 = 0.1;
const GAL_PER_L: f64 = 0.264172;
const L_PER_GAL: f64 = 3.78541;
const MAX_VALID_ECU_DELTA_L: f64 = 50.0;

/// Extended Kalman fuel estimator for a single truck.
pub struct FuelEkf {
    truck_id: String,
    tank: TankSpec,
}

#[derive(Debug, Clone, Copy)]
pub struct DrivingConditions {
    pub speed_mph: f64,
    pub engine_load_pct: f64,
    pub grade_pct: f64,
    pub ambient_temp_f: f64,
}

impl Default for DrivingConditions {
    fn default() -> Self {
        Self {
            speed_mph: 0.0,
            engine_load_pct: 50.0,
            grade_pct: 0.0,
            ambient_temp_f: 70.0,
        }
    }
}

/// Outcome of a fuel-rate update: whether the ECU's instantaneous rate
/// disagreed badly enough with our estimate to warrant a sensor-malfunction
/// flag upstream (the coordinator decides whether to actually raise one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateAgreement {
    Consistent,
    Mismatched,
}

impl FuelEkf {
    pub fn new(truck_id: impl Into<String>, tank: TankSpec) -> Self {
        Self {
            truck_id: truck_id.into(),
            tank,
        }
    }

    pub fn initial_state(&self, initial_efficiency: f64) -> EkfState {
        EkfState::initial(self.tank.capacity_l, initial_efficiency)
    }

    /// Predict forward `dt_hours`. No-op for `dt_hours <= 0` (out-of-order
    /// or duplicate reading).
    pub fn predict(&self, state: &mut EkfState, dt_hours: f64, conditions: DrivingConditions) {
        if dt_hours <= 0.0 {
            return;
        }

        let (fuel, rate, efficiency) = (state.x[0], state.x[1], state.x[2]);

        let aero_factor = AERO_COEF * conditions.speed_mph.powi(2);
        let load_factor = 1.0 + (conditions.engine_load_pct - 50.0) / 100.0;
        let grade_factor = 1.0 + conditions.grade_pct * 0.05;
        let temp_factor = 1.0 + (70.0 - conditions.ambient_temp_f).max(0.0) / 100.0;

        let mut predicted_rate =
            BASE_IDLE_LPH + aero_factor * load_factor * grade_factor * temp_factor;
        predicted_rate *= efficiency;
        predicted_rate = predicted_rate.clamp(0.5, 30.0);

        let new_fuel = (fuel - rate * dt_hours).clamp(0.0, self.tank.capacity_l);
        let new_rate = RATE_BLEND_ALPHA * predicted_rate + (1.0 - RATE_BLEND_ALPHA) * rate;

        state.x = [new_fuel, new_rate, efficiency];

        // F = [[1, -dt, 0], [0, 0.7, 0], [0, 0, 1]]
        let f = [[1.0, -dt_hours, 0.0], [0.0, 0.7, 0.0], [0.0, 0.0, 1.0]];
        state.p = add_diag(matmul(matmul(f, state.p), transpose(f)), Q);

        state.clamp_to_invariants(self.tank.capacity_l);

        debug!(
            truck_id = %self.truck_id,
            fuel_l = new_fuel,
            rate_lph = new_rate,
            speed_mph = conditions.speed_mph,
            "ekf predict"
        );
    }

    /// Update from the fuel-level sensor channel (already fused if multiple
    /// physical senders exist — the fusion engine hands the EKF one number).
    pub fn update_fuel_sensor(&self, state: &mut EkfState, sensor_pct: f64) {
        let z_pred = self.tank.sensor_pct_from_volume(state.x[0]);
        let h0 = self.tank.d_sensor_pct_d_volume(state.x[0]);
        let h = [h0, 0.0, 0.0];

        let y = sensor_pct - z_pred;
        let s = h[0] * state.p[0][0] * h[0]
            + h[0] * state.p[0][1] * h[1]
            + h[0] * state.p[0][2] * h[2]
            + h[1] * state.p[1][0] * h[0]
            + h[1] * state.p[1][1] * h[1]
            + h[1] * state.p[1][2] * h[2]
            + h[2] * state.p[2][0] * h[0]
            + h[2] * state.p[2][1] * h[1]
            + h[2] * state.p[2][2] * h[2]
            + R_FUEL_SENSOR;

        if s <= 0.0 {
            return;
        }

        // K = P H^T / S, a 3x1 column
        let k = [
            (state.p[0][0] * h[0] + state.p[0][1] * h[1] + state.p[0][2] * h[2]) / s,
            (state.p[1][0] * h[0] + state.p[1][1] * h[1] + state.p[1][2] * h[2]) / s,
            (state.p[2][0] * h[0] + state.p[2][1] * h[1] + state.p[2][2] * h[2]) / s,
        ];

        for i in 0..3 {
            state.x[i] += k[i] * y;
        }

        // P = (I - K H) P
        let mut kh = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                kh[i][j] = k[i] * h[j];
            }
        }
        let i_minus_kh = sub(identity(), kh);
        state.p = matmul(i_minus_kh, state.p);

        state.clamp_to_invariants(self.tank.capacity_l);

        debug!(
            truck_id = %self.truck_id,
            sensor_pct,
            predicted_pct = z_pred,
            innovation = y,
            "ekf fuel sensor update"
        );
    }

    /// Update from the ECU's cumulative fuel-used counter. The most
    /// trustworthy observation: halves the volume covariance and nudges the
    /// efficiency factor toward the ratio of actual-to-predicted burn.
    pub fn update_ecu_fuel_used(&self, state: &mut EkfState, ecu_total_l: f64, prev_fuel_l: f64) {
        let last = match state.last_ecu_total_l {
            Some(v) => v,
            None => {
                state.last_ecu_total_l = Some(ecu_total_l);
                return;
            }
        };

        let delta_ecu = ecu_total_l - last;
        if !(0.0..=MAX_VALID_ECU_DELTA_L).contains(&delta_ecu) {
            warn!(
                truck_id = %self.truck_id,
                delta_ecu, last, ecu_total_l,
                "invalid ECU delta, ignoring"
            );
            return;
        }

        if delta_ecu > 0.0 {
            state.p[0][0] *= 0.5;

            let predicted_consumption = prev_fuel_l - state.x[0];
            if predicted_consumption > 0.0 {
                let efficiency_update = delta_ecu / predicted_consumption;
                state.x[2] = (1.0 - EFFICIENCY_SMOOTH_ALPHA) * state.x[2]
                    + EFFICIENCY_SMOOTH_ALPHA * efficiency_update;
                state.x[2] = state.x[2].clamp(0.5, 2.0);
            }

            state.last_ecu_total_l = Some(ecu_total_l);

            debug!(
                truck_id = %self.truck_id,
                delta_ecu_l = delta_ecu,
                efficiency = state.x[2],
                "ekf ECU update"
            );
        }
    }

    /// Update from the ECU's instantaneous fuel-rate channel. A large
    /// mismatch nudges the rate estimate gently rather than trusting the
    /// instantaneous reading outright.
    pub fn update_fuel_rate(&self, state: &mut EkfState, fuel_rate_gph: f64) -> RateAgreement {
        let fuel_rate_lph = fuel_rate_gph * L_PER_GAL;
        let diff = (fuel_rate_lph - state.x[1]).abs();

        if diff > FUEL_RATE_MISMATCH_THRESHOLD_LPH {
            warn!(
                truck_id = %self.truck_id,
                ecu_gph = fuel_rate_gph,
                estimated_gph = state.x[1] * GAL_PER_L,
                "ekf fuel rate mismatch"
            );
            state.x[1] = (1.0 - FUEL_RATE_BLEND_ALPHA) * state.x[1]
                + FUEL_RATE_BLEND_ALPHA * fuel_rate_lph;
            state.clamp_to_invariants(self.tank.capacity_l);
            RateAgreement::Mismatched
        } else {
            RateAgreement::Consistent
        }
    }

    pub fn diagnostics(&self, state: &EkfState) -> EkfDiagnostics {
        EkfDiagnostics {
            volume_l: state.x[0],
            rate_gph: state.x[1] * GAL_PER_L,
            efficiency: state.x[2],
            uncertainty_pct: state.uncertainty_pct(self.tank.capacity_l),
            covariance_diagonal: [state.p[0][0], state.p[1][1], state.p[2][2]],
        }
    }

    pub fn capacity_l(&self) -> f64 {
        self.tank.capacity_l
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EkfDiagnostics {
    pub volume_l: f64,
    pub rate_gph: f64,
    pub efficiency: f64,
    pub uncertainty_pct: f64,
    pub covariance_diagonal: [f64; 3],
}

fn matmul(a: [[f64; 3]; 3], b: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            let mut sum = 0.0;
            for k in 0..3 {
                sum += a[i][k] * b[k][j];
            }
            out[i][j] = sum;
        }
    }
    out
}

fn transpose(a: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[j][i] = a[i][j];
        }
    }
    out
}

fn add_diag(mut a: [[f64; 3]; 3], diag: [f64; 3]) -> [[f64; 3]; 3] {
    for i in 0..3 {
        a[i][i] += diag[i];
    }
    a
}

fn sub(a: [[f64; 3]; 3], b: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[i][j] - b[i][j];
        }
    }
    out
}

fn identity() -> [[f64; 3]; 3] {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TankSpec;

    fn ekf() -> (FuelEkf, EkfState) {
        let tank = TankSpec::saddle(400.0);
        let ekf = FuelEkf::new("truck-1", tank);
        let state = ekf.initial_state(1.0);
        (ekf, state)
    }

    #[test]
    fn predict_decreases_volume_over_time() {
        let (ekf, mut state) = ekf();
        let before = state.x[0];
        ekf.predict(&mut state, 1.0, DrivingConditions::default());
        assert!(state.x[0] < before);
    }

    #[test]
    fn predict_noop_for_non_positive_dt() {
        let (ekf, mut state) = ekf();
        let before = state.clone();
        ekf.predict(&mut state, 0.0, DrivingConditions::default());
        assert_eq!(state, before);
    }

    #[test]
    fn fuel_sensor_update_moves_estimate_toward_reading() {
        let (ekf, mut state) = ekf();
        let low_reading = ekf.tank.sensor_pct_from_volume(50.0);
        ekf.update_fuel_sensor(&mut state, low_reading);
        assert!(state.x[0] < 200.0);
    }

    #[test]
    fn ecu_update_ignores_first_reading() {
        let (ekf, mut state) = ekf();
        ekf.update_ecu_fuel_used(&mut state, 100.0, state.x[0]);
        assert_eq!(state.last_ecu_total_l, Some(100.0));
    }

    #[test]
    fn ecu_update_rejects_negative_delta() {
        let (ekf, mut state) = ekf();
        state.last_ecu_total_l = Some(100.0);
        let p00_before = state.p[0][0];
        ekf.update_ecu_fuel_used(&mut state, 90.0, state.x[0]);
        assert_eq!(state.p[0][0], p00_before);
    }

    #[test]
    fn ecu_update_halves_volume_covariance() {
        let (ekf, mut state) = ekf();
        state.last_ecu_total_l = Some(100.0);
        let p00_before = state.p[0][0];
        let prev_fuel = state.x[0] + 1.0;
        ekf.update_ecu_fuel_used(&mut state, 101.0, prev_fuel);
        assert!((state.p[0][0] - p00_before * 0.5).abs() < 1e-9);
    }

    #[test]
    fn fuel_rate_mismatch_detected_and_nudged() {
        let (ekf, mut state) = ekf();
        state.x[1] = 5.0;
        let agreement = ekf.update_fuel_rate(&mut state, 20.0); // ~75.7 Lph
        assert_eq!(agreement, RateAgreement::Mismatched);
        assert!(state.x[1] > 5.0);
    }

    #[test]
    fn fuel_rate_consistent_leaves_state_unchanged() {
        let (ekf, mut state) = ekf();
        state.x[1] = 5.0;
        let gph = 5.0 * GAL_PER_L;
        let agreement = ekf.update_fuel_rate(&mut state, gph);
        assert_eq!(agreement, RateAgreement::Consistent);
        assert!((state.x[1] - 5.0).abs() < 1e-9);
    }

    #[test]
    fn state_never_produces_nan_after_many_cycles() {
        let (ekf, mut state) = ekf();
        for i in 0..500 {
            ekf.predict(
                &mut state,
                1.0 / 3600.0,
                DrivingConditions {
                    speed_mph: 60.0,
                    engine_load_pct: 70.0,
                    grade_pct: 0.0,
                    ambient_temp_f: 70.0,
                },
            );
            if i % 10 == 0 {
                ekf.update_fuel_sensor(&mut state, 50.0);
            }
        }
        assert!(!state.has_nan_or_inf());
    }
}
