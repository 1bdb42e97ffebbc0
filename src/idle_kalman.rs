//! Scalar Kalman filter for idle fuel consumption (gallons/hour).
//!
//! Same philosophy as `ekf`, specialized for a single scalar: idle burn is
//! effectively constant for a given engine/HVAC load, so a full state
//! vector is unnecessary. Four independent channels update the same
//! estimate in priority order (ECU counter > fuel_rate > fuel-level delta
//! > RPM physics model), each through its own fixed measurement noise —
//! except here, per an explicit redesign, that noise is scaled by recent
//! innovation variance rather than held fixed.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::types::{IdleKalmanState, IdleSource};

const Q_PROCESS_NOISE: f64 = 0.01;

const R_FUEL_RATE: f64 = 0.15;
const R_ECU_COUNTER: f64 = 0.05;
const R_FUEL_DELTA: f64 = 0.25;
const R_RPM_MODEL: f64 = 0.35;

const GAL_PER_L: f64 = 1.0 / 3.78541;

const MIN_ADAPTIVE_ALPHA: f64 = 0.5;
const MAX_ADAPTIVE_ALPHA: f64 = 5.0;
const DEFAULT_INNOVATION_HISTORY_CAPACITY: usize = 100;

pub struct IdleKalmanFilter {
    truck_id: String,
    innovation_history_capacity: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct IdleEstimateInputs {
    pub is_stationary: bool,
    pub engine_running: bool,
    pub rpm: Option<f64>,
    pub fuel_rate_lph: Option<f64>,
    pub total_idle_fuel_gal: Option<f64>,
    pub prev_total_idle_fuel_gal: Option<f64>,
    pub fuel_level_delta_gal: Option<f64>,
    pub time_delta_hours: f64,
    pub engine_load_pct: Option<f64>,
    pub ambient_temp_f: Option<f64>,
    pub fuel_delta_confidence: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct IdleEstimate {
    pub idle_gph: f64,
    pub confidence_pct: f64,
    pub source: IdleSource,
    pub sensors_used: u8,
}

impl IdleKalmanFilter {
    pub fn new(truck_id: impl Into<String>) -> Self {
        Self {
            truck_id: truck_id.into(),
            innovation_history_capacity: DEFAULT_INNOVATION_HISTORY_CAPACITY,
        }
    }

    pub fn with_innovation_history_capacity(mut self, capacity: usize) -> Self {
        self.innovation_history_capacity = capacity;
        self
    }

    fn predict(&self, state: &mut IdleKalmanState, time_delta_hours: f64) {
        if time_delta_hours > 0.0 {
            state.uncertainty += Q_PROCESS_NOISE * time_delta_hours;
        }
    }

    /// Scales a channel's base measurement noise by recent innovation
    /// variance: a channel that has been agreeing with the estimate lately
    /// gets trusted more; one that has been noisy gets dampened.
    fn adaptive_r(&self, base_r: f64, history: &VecDeque<f64>) -> f64 {
        if history.len() < 4 {
            return base_r;
        }
        let mean: f64 = history.iter().sum::<f64>() / history.len() as f64;
        let recent_var: f64 =
            history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / history.len() as f64;
        let base_var = base_r.max(1e-6);
        let alpha = (recent_var / base_var).clamp(MIN_ADAPTIVE_ALPHA, MAX_ADAPTIVE_ALPHA);
        base_r * alpha
    }

    fn apply_update(&self, state: &mut IdleKalmanState, measurement_gph: f64, base_r: f64) {
        let r = self.adaptive_r(base_r, &state.innovation_history);
        let k = state.uncertainty / (state.uncertainty + r);
        let innovation = measurement_gph - state.idle_gph;

        state.idle_gph += k * innovation;
        state.uncertainty = (1.0 - k) * state.uncertainty;
        state.samples_count += 1;
        state.record_innovation(innovation, self.innovation_history_capacity);
    }

    fn update_fuel_rate(&self, state: &mut IdleKalmanState, fuel_rate_lph: f64) {
        if fuel_rate_lph <= 0.0 {
            return;
        }
        let measurement_gph = fuel_rate_lph * GAL_PER_L;
        self.apply_update(state, measurement_gph, R_FUEL_RATE);
        debug!(truck_id = %self.truck_id, measurement_gph, "idle kalman fuel_rate update");
    }

    fn update_ecu_counter(&self, state: &mut IdleKalmanState, delta_gal: f64, dt_hours: f64) {
        if delta_gal <= 0.0 || dt_hours <= 0.0 {
            return;
        }
        let measurement_gph = delta_gal / dt_hours;
        self.apply_update(state, measurement_gph, R_ECU_COUNTER);
        debug!(truck_id = %self.truck_id, measurement_gph, "idle kalman ECU counter update");
    }

    fn update_fuel_delta(
        &self,
        state: &mut IdleKalmanState,
        fuel_consumed_gal: f64,
        dt_hours: f64,
        confidence: f64,
    ) {
        if fuel_consumed_gal <= 0.0 || dt_hours <= 0.0 {
            return;
        }
        let measurement_gph = fuel_consumed_gal / dt_hours;
        let adjusted_r = R_FUEL_DELTA / confidence.max(0.01);
        self.apply_update(state, measurement_gph, adjusted_r);
        debug!(truck_id = %self.truck_id, measurement_gph, confidence, "idle kalman fuel_delta update");
    }

    fn update_rpm_model(
        &self,
        state: &mut IdleKalmanState,
        rpm: f64,
        engine_load_pct: f64,
        ambient_temp_f: Option<f64>,
    ) {
        if rpm <= 0.0 {
            return;
        }
        let rpm_factor = rpm / 1000.0;
        let load_factor = engine_load_pct / 100.0;
        let base_gph = 0.4 + rpm_factor * 0.3;
        let load_gph = load_factor * 0.5;
        let mut measurement_gph = base_gph + load_gph;
        measurement_gph *= temp_factor(ambient_temp_f);

        self.apply_update(state, measurement_gph, R_RPM_MODEL);
        debug!(truck_id = %self.truck_id, measurement_gph, rpm, "idle kalman RPM model update");
    }

    /// Fuse all available channels into one idle-GPH estimate. Returns
    /// `None` (conceptually zero/100%-confidence) when the truck is moving
    /// or the engine is off — those are not idle states at all.
    pub fn estimate(&self, state: &mut IdleKalmanState, inputs: IdleEstimateInputs) -> IdleEstimate {
        if !inputs.is_stationary || !inputs.engine_running {
            return IdleEstimate {
                idle_gph: 0.0,
                confidence_pct: 100.0,
                source: IdleSource::Fallback,
                sensors_used: 0,
            };
        }

        self.predict(state, inputs.time_delta_hours);

        let mut sensors_used = 0u8;
        let mut last_single_source = IdleSource::Fallback;

        if let (Some(total), Some(prev)) =
            (inputs.total_idle_fuel_gal, inputs.prev_total_idle_fuel_gal)
        {
            let delta = total - prev;
            if (0.0..5.0).contains(&delta) && inputs.time_delta_hours > 0.01 {
                self.update_ecu_counter(state, delta, inputs.time_delta_hours);
                sensors_used += 1;
                last_single_source = IdleSource::EcuCounter;
            }
        }

        if let Some(rate) = inputs.fuel_rate_lph {
            let gph = rate * GAL_PER_L;
            if (1.5..=12.0).contains(&gph) {
                self.update_fuel_rate(state, rate);
                sensors_used += 1;
                last_single_source = IdleSource::FuelRate;
            }
        }

        if let Some(delta) = inputs.fuel_level_delta_gal {
            if delta > 0.0 && inputs.time_delta_hours >= 0.2 {
                self.update_fuel_delta(
                    state,
                    delta,
                    inputs.time_delta_hours,
                    inputs.fuel_delta_confidence,
                );
                sensors_used += 1;
                last_single_source = IdleSource::FuelDelta;
            }
        }

        if let Some(rpm) = inputs.rpm {
            if rpm > 0.0 {
                self.update_rpm_model(
                    state,
                    rpm,
                    inputs.engine_load_pct.unwrap_or(0.0),
                    inputs.ambient_temp_f,
                );
                sensors_used += 1;
                last_single_source = IdleSource::RpmModel;
            }
        }

        let confidence_pct = (100.0 * (1.0 - state.uncertainty)).clamp(0.0, 100.0);
        let source = match sensors_used {
            0 => IdleSource::Fallback,
            1 => last_single_source,
            _ => IdleSource::MultiSensor,
        };

        info!(
            truck_id = %self.truck_id,
            idle_gph = state.idle_gph,
            confidence_pct,
            sensors_used,
            "idle kalman estimate"
        );

        IdleEstimate {
            idle_gph: state.idle_gph,
            confidence_pct,
            source,
            sensors_used,
        }
    }
}

fn temp_factor(temp_f: Option<f64>) -> f64 {
    let Some(t) = temp_f else { return 1.0 };
    if (60.0..=75.0).contains(&t) {
        1.0
    } else if t < 32.0 {
        1.5
    } else if t < 60.0 {
        1.25
    } else if t > 95.0 {
        1.5
    } else if t > 75.0 {
        1.3
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> IdleEstimateInputs {
        IdleEstimateInputs {
            is_stationary: true,
            engine_running: true,
            rpm: Some(700.0),
            fuel_rate_lph: None,
            total_idle_fuel_gal: None,
            prev_total_idle_fuel_gal: None,
            fuel_level_delta_gal: None,
            time_delta_hours: 0.1,
            engine_load_pct: Some(10.0),
            ambient_temp_f: Some(70.0),
            fuel_delta_confidence: 1.0,
        }
    }

    #[test]
    fn moving_truck_is_not_idle() {
        let filter = IdleKalmanFilter::new("t1");
        let mut state = IdleKalmanState::default();
        let est = filter.estimate(
            &mut state,
            IdleEstimateInputs {
                is_stationary: false,
                ..inputs()
            },
        );
        assert_eq!(est.idle_gph, 0.0);
        assert_eq!(est.confidence_pct, 100.0);
    }

    #[test]
    fn engine_off_is_not_idle() {
        let filter = IdleKalmanFilter::new("t1");
        let mut state = IdleKalmanState::default();
        let est = filter.estimate(
            &mut state,
            IdleEstimateInputs {
                engine_running: false,
                ..inputs()
            },
        );
        assert_eq!(est.idle_gph, 0.0);
    }

    #[test]
    fn rpm_only_update_uses_rpm_model_source() {
        let filter = IdleKalmanFilter::new("t1");
        let mut state = IdleKalmanState::default();
        let est = filter.estimate(&mut state, inputs());
        assert_eq!(est.sensors_used, 1);
        assert_eq!(est.source, IdleSource::RpmModel);
    }

    #[test]
    fn ecu_counter_out_of_plausible_range_is_ignored() {
        let filter = IdleKalmanFilter::new("t1");
        let mut state = IdleKalmanState::default();
        let est = filter.estimate(
            &mut state,
            IdleEstimateInputs {
                total_idle_fuel_gal: Some(20.0),
                prev_total_idle_fuel_gal: Some(10.0), // delta 10 > 5.0 cap
                rpm: None,
                ..inputs()
            },
        );
        assert_eq!(est.sensors_used, 0);
    }

    #[test]
    fn multiple_agreeing_sensors_yield_multi_sensor_source() {
        let filter = IdleKalmanFilter::new("t1");
        let mut state = IdleKalmanState::default();
        let est = filter.estimate(
            &mut state,
            IdleEstimateInputs {
                fuel_rate_lph: Some(8.0 * 3.78541),
                ..inputs()
            },
        );
        assert_eq!(est.sensors_used, 2);
        assert_eq!(est.source, IdleSource::MultiSensor);
    }

    #[test]
    fn adaptive_r_dampens_noisy_channel_after_history_builds() {
        let filter = IdleKalmanFilter::new("t1").with_innovation_history_capacity(10);
        let mut state = IdleKalmanState::default();
        for gph in [2.0, 8.0, 1.0, 9.0, 0.5, 10.0] {
            filter.update_fuel_rate(&mut state, gph * 3.78541);
        }
        let k_before = state.uncertainty;
        filter.update_fuel_rate(&mut state, 5.0 * 3.78541);
        assert!(state.uncertainty <= k_before);
        assert!(!state.idle_gph.is_nan());
    }

    #[test]
    fn uncertainty_grows_with_predict_and_shrinks_with_update() {
        let filter = IdleKalmanFilter::new("t1");
        let mut state = IdleKalmanState::default();
        filter.predict(&mut state, 1.0);
        assert!(state.uncertainty > 0.5);
        filter.update_ecu_counter(&mut state, 0.2, 0.5);
        assert!(state.uncertainty < 0.5 + Q_PROCESS_NOISE);
    }
}
