//! Estimator Coordinator: the single per-truck aggregate that owns every
//! piece of per-truck state and applies one reading through the full
//! pipeline in a fixed sequence.
//!
//! Grounded on the teacher's `PipelineCoordinator` — same numbered-phase
//! structure (doc'd below), same pattern of computing every fallible
//! intermediate value before committing any field, same
//! `tracing::{debug,info,warn}` instrumentation with cycle timing and a
//! soft latency-budget warning, same `PipelineStats`-style stats struct
//! with a `Default` that delegates to `::new()`.
//!
//! Per-reading phases:
//! 1. Validate channel ranges, drop out-of-range channels.
//! 2. Compute `dt_hours` since the last reading (skip predict if <= 0).
//! 3. Classify truck activity state (Driving/ProductiveIdle/
//!    NonProductiveIdle/EngineOff; Offline is applied separately, by a
//!    staleness sweep over published snapshots, not per-reading).
//! 4. EKF predict (physics-based consumption model).
//! 5. Record this cycle's channel values into the fusion engine; a channel
//!    that stays valid also feeds its matching EKF update directly.
//! 6. Fuse channels into one fuel-percent/consumption estimate and choose
//!    the published volume/fuel_pct: the fused value above a confidence
//!    floor, the EKF's own estimate otherwise.
//! 7. Idle Kalman estimate, if stationary with engine running.
//! 8. Detect refuel; publish `FuelLevelChange` unconditionally.
//! 9. Track rolling consumption/idle-time history; refresh anomaly
//!    thresholds periodically and classify if a spike/siphon/leak pattern
//!    appears.
//! 10. Manage the in-progress driver session (start/accumulate/end+score).
//! 11. Commit all of the above and return the events this cycle produced.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::ekf::{DrivingConditions, FuelEkf};
use crate::fusion::FusionEngine;
use crate::idle_kalman::{IdleEstimateInputs, IdleKalmanFilter};
use crate::services::alert::AlertService;
use crate::services::anomaly::AnomalyService;
use crate::services::driver_behavior::DriverBehaviorService;
use crate::services::maintenance::MaintenanceService;
use crate::types::{
    classify, fuel_thresholds, AnomalyThresholds, DriverProfile, DriverScore, DriverSession,
    EkfState, Event, IdleKalmanState, Reading, RiskLevel, SensorChannel, TankSpec,
    TruckActivityState, TruckId,
};

const CONSUMPTION_HISTORY_CAPACITY: usize = 500;
const IDLE_HISTORY_CAPACITY: usize = 100;
const THRESHOLD_RECOMPUTE_EVERY_N_CYCLES: u64 = 50;
const SOFT_LATENCY_BUDGET_MS: u128 = 5;

const REFUEL_MIN_PCT_JUMP: f64 = 10.0;
const REFUEL_WINDOW_SECONDS: i64 = 900;
const REFUEL_MAX_SPEED_MPH: f64 = 2.0;
const L_PER_GAL: f64 = 3.78541;

/// Mirrors `services::anomaly::SIPHON_CONSUMPTION_MULTIPLIER` — the outer
/// gate deciding whether to call `classify()` at all must use the same
/// channel-appropriate bar `classify()` itself checks, or a stationary
/// siphoning truck (whose EKF rate never approaches the driving-consumption
/// spike threshold) would never reach the classifier.
const SIPHON_GATE_MULTIPLIER: f64 = 2.0;
const CONSUMPTION_SPIKE_GATE_MULTIPLIER: f64 = 1.5;
const FUSION_CONFIDENCE_PUBLISH_FLOOR: f64 = 0.6;

pub struct EstimatorCoordinator {
    truck_id: TruckId,
    tank: TankSpec,

    ekf: FuelEkf,
    ekf_state: EkfState,

    idle_filter: IdleKalmanFilter,
    idle_state: IdleKalmanState,

    fusion: FusionEngine,

    anomaly_service: AnomalyService,
    anomaly_thresholds: AnomalyThresholds,
    driver_behavior_service: DriverBehaviorService,
    maintenance_service: MaintenanceService,
    alert_service: AlertService,

    activity: TruckActivityState,
    last_reading_at: Option<DateTime<Utc>>,
    consumption_history: VecDeque<f64>,
    speed_history: VecDeque<f64>,
    idle_time_history: VecDeque<bool>,

    driver_session: Option<DriverSession>,
    driver_profile: DriverProfile,

    last_fuel_pct: Option<f64>,
    last_fuel_pct_at: Option<DateTime<Utc>>,
    last_refuel: Option<crate::types::RefuelEvent>,
    prev_total_idle_fuel_gal: Option<f64>,

    published_fuel_pct: f64,
    published_volume_l: f64,

    stats: CoordinatorStats,
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorStats {
    pub cycles_processed: u64,
    pub readings_rejected: u64,
    pub last_cycle_ms: f64,
    pub soft_budget_overruns: u64,
}

/// Everything a single `process_reading` call produced, for the caller
/// (ingest worker) to publish onto the event bus and commit to persistence.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub events: Vec<Event>,
    pub driver_score: Option<DriverScore>,
}

impl EstimatorCoordinator {
    pub fn new(truck_id: TruckId, tank: TankSpec, initial_efficiency: f64) -> Self {
        let ekf = FuelEkf::new(truck_id.as_str(), tank.clone());
        let ekf_state = ekf.initial_state(initial_efficiency);
        let fusion = FusionEngine::new(truck_id.as_str(), tank.capacity_l);
        let idle_filter = IdleKalmanFilter::new(truck_id.as_str());
        let initial_volume_l = ekf_state.volume_l();
        let capacity_l = tank.capacity_l;

        Self {
            truck_id,
            tank,
            ekf,
            ekf_state,
            idle_filter,
            idle_state: IdleKalmanState::default(),
            fusion,
            anomaly_service: AnomalyService::new(),
            anomaly_thresholds: AnomalyThresholds::default(),
            driver_behavior_service: DriverBehaviorService::new(),
            maintenance_service: MaintenanceService::new(),
            alert_service: AlertService::new(),
            activity: TruckActivityState::EngineOff,
            last_reading_at: None,
            consumption_history: VecDeque::with_capacity(CONSUMPTION_HISTORY_CAPACITY),
            speed_history: VecDeque::with_capacity(CONSUMPTION_HISTORY_CAPACITY),
            idle_time_history: VecDeque::with_capacity(IDLE_HISTORY_CAPACITY),
            driver_session: None,
            driver_profile: DriverProfile::default(),
            last_fuel_pct: None,
            last_fuel_pct_at: None,
            last_refuel: None,
            prev_total_idle_fuel_gal: None,
            published_fuel_pct: initial_volume_l / capacity_l * 100.0,
            published_volume_l: initial_volume_l,
            stats: CoordinatorStats::default(),
        }
    }

    pub fn truck_id(&self) -> &TruckId {
        &self.truck_id
    }

    pub fn ekf_state(&self) -> &EkfState {
        &self.ekf_state
    }

    pub fn idle_state(&self) -> &IdleKalmanState {
        &self.idle_state
    }

    pub fn activity(&self) -> TruckActivityState {
        self.activity
    }

    pub fn last_reading_at(&self) -> Option<DateTime<Utc>> {
        self.last_reading_at
    }

    pub fn last_refuel(&self) -> Option<&crate::types::RefuelEvent> {
        self.last_refuel.as_ref()
    }

    /// The volume/fuel_pct selected this cycle per the fusion-confidence
    /// rule — what `ingest::build_snapshot` publishes, not necessarily the
    /// raw EKF estimate.
    pub fn published_fuel_pct(&self) -> f64 {
        self.published_fuel_pct
    }

    pub fn published_volume_l(&self) -> f64 {
        self.published_volume_l
    }

    pub fn tank(&self) -> &TankSpec {
        &self.tank
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Average miles-per-gallon over the rolling speed/consumption history,
    /// feeding `PredictionService`'s range forecast. `0.0` with no history.
    pub fn recent_mpg(&self) -> f64 {
        if self.speed_history.is_empty() || self.consumption_history.is_empty() {
            return 0.0;
        }
        let avg_speed_mph = self.speed_history.iter().sum::<f64>() / self.speed_history.len() as f64;
        let avg_consumption_gph =
            self.consumption_history.iter().sum::<f64>() / self.consumption_history.len() as f64 / 3.78541;
        if avg_consumption_gph <= 0.01 {
            0.0
        } else {
            avg_speed_mph / avg_consumption_gph
        }
    }

    /// Operator command: discard EKF state and reinitialize, e.g. after a
    /// tank re-registration or detected unrecoverable drift.
    pub fn reset_ekf(&mut self, initial_efficiency: f64) {
        self.ekf_state = self.ekf.initial_state(initial_efficiency);
    }

    pub fn reset_idle_kalman(&mut self) {
        self.idle_state = IdleKalmanState::default();
    }

    pub fn reset_driver_session(&mut self) {
        self.driver_session = None;
    }

    pub fn process_reading(&mut self, reading: &Reading) -> CycleOutcome {
        let start = Instant::now();
        let mut outcome = CycleOutcome::default();

        let validity = reading.channel_in_range();
        if !validity.all_valid() {
            self.stats.readings_rejected += 1;
            debug!(truck_id = %self.truck_id, "reading had out-of-range channels");
        }

        let dt_hours = self
            .last_reading_at
            .map(|prev| (reading.timestamp - prev).num_milliseconds() as f64 / 3_600_000.0)
            .unwrap_or(0.0);
        let prev_volume_l = self.ekf_state.volume_l();

        let fuel_rising_fast = reading
            .fuel_level_pct
            .map(|pct| self.refuel_jump(pct, reading.timestamp, reading.speed_mph))
            .unwrap_or(false);

        let productive = is_productive_geofence(reading.geofence_id.as_deref());
        let previous_activity = self.activity;
        self.activity = classify(reading.speed_mph, reading.rpm, productive);

        let conditions = DrivingConditions {
            speed_mph: reading.speed_mph.unwrap_or(0.0),
            engine_load_pct: reading.engine_load_pct.unwrap_or(50.0),
            grade_pct: 0.0,
            ambient_temp_f: reading.ambient_temp_f.unwrap_or(70.0),
        };
        self.ekf.predict(&mut self.ekf_state, dt_hours, conditions);

        let timestamp_unix_s = reading.timestamp.timestamp() as f64;
        if validity.fuel_level_pct {
            if let Some(v) = reading.fuel_level_pct {
                let _ = self.fusion.add_reading(SensorChannel::FuelLevel, v, timestamp_unix_s);
            }
        }
        if let Some(v) = reading.ecu_total_fuel_used_l {
            let _ = self.fusion.add_reading(SensorChannel::EcuFuelUsed, v, timestamp_unix_s);
        }
        if validity.ecu_fuel_rate_gph {
            if let Some(v) = reading.ecu_fuel_rate_gph {
                let _ = self.fusion.add_reading(SensorChannel::EcuFuelRate, v, timestamp_unix_s);
            }
        }

        let fused = self.fusion.fuse();

        if validity.fuel_level_pct {
            if let Some(sensor_pct) = reading.fuel_level_pct {
                self.ekf.update_fuel_sensor(&mut self.ekf_state, sensor_pct);
            }
        }

        if let Some(ecu_total) = reading.ecu_total_fuel_used_l {
            let prev_fuel = self.ekf_state.volume_l();
            self.ekf.update_ecu_fuel_used(&mut self.ekf_state, ecu_total, prev_fuel);
        }
        if let Some(rate_gph) = reading.ecu_fuel_rate_gph {
            if validity.ecu_fuel_rate_gph {
                let agreement = self.ekf.update_fuel_rate(&mut self.ekf_state, rate_gph);
                if agreement == crate::ekf::RateAgreement::Mismatched {
                    let event = Event::SensorMalfunction {
                        truck_id: self.truck_id.clone(),
                        channel: "ecu_fuel_rate".to_string(),
                        message: "fuel rate disagreed with EKF estimate by more than 5 Lph".to_string(),
                    };
                    self.raise(event, "sensor_malfunction_ecu_fuel_rate", RiskLevel::Elevated, reading.timestamp, &mut outcome);
                }
            }
        }

        // Prefer the fused estimate once the fusion engine has enough
        // channel coverage to trust it; fall back to the EKF's own volume
        // otherwise. `fused.fuel_pct` is sender-space, so it needs the same
        // inverse tank-curve conversion the EKF's Jacobian uses, not a
        // linear re-scale.
        self.published_volume_l = if fused.confidence > FUSION_CONFIDENCE_PUBLISH_FLOOR {
            self.tank.volume_from_sensor_pct(fused.fuel_pct)
        } else {
            self.ekf_state.volume_l()
        };
        self.published_fuel_pct = self.published_volume_l / self.tank.capacity_l * 100.0;

        if let Some(current_pct) = reading.fuel_level_pct {
            if fuel_rising_fast {
                if let Some(prev_pct) = self.last_fuel_pct {
                    let delta_pct = current_pct - prev_pct;
                    let capacity_gal = self.tank.capacity_l / L_PER_GAL;
                    let gallons_added = delta_pct / 100.0 * capacity_gal;
                    let plausible = (5.0..=capacity_gal).contains(&gallons_added);

                    let event = Event::RefuelDetected {
                        truck_id: self.truck_id.clone(),
                        delta_pct,
                        fuel_pct_after: current_pct,
                    };
                    self.raise(event, "refuel_detected", RiskLevel::Low, reading.timestamp, &mut outcome);
                    self.last_refuel = Some(crate::types::RefuelEvent {
                        truck_id: self.truck_id.clone(),
                        detected_at: reading.timestamp,
                        fuel_pct_before: prev_pct,
                        fuel_pct_after: current_pct,
                        estimated_liters_added: delta_pct / 100.0 * self.tank.capacity_l,
                        plausible,
                    });
                }
            }
            self.last_fuel_pct = Some(current_pct);
            self.last_fuel_pct_at = Some(reading.timestamp);

            if current_pct <= fuel_thresholds::LOW_FUEL_PCT {
                let severity = if current_pct <= fuel_thresholds::LOW_FUEL_CRITICAL_PCT {
                    RiskLevel::Critical
                } else {
                    RiskLevel::Elevated
                };
                let event = Event::FuelAnomaly {
                    truck_id: self.truck_id.clone(),
                    anomaly_type: "low_fuel".to_string(),
                    severity,
                    message: format!("fuel level at {current_pct:.1}%"),
                    confidence: 1.0,
                };
                self.raise(event, "low_fuel", severity, reading.timestamp, &mut outcome);
            }
        }

        // Unconditional per-cycle publish — not alert-cooldown material.
        outcome.events.push(Event::FuelLevelChange {
            truck_id: self.truck_id.clone(),
            fuel_pct: self.published_fuel_pct,
            consumption_gph: fused.consumption_gph,
        });

        if self.activity.is_idle() {
            let fuel_level_delta_gal = {
                let delta_l = prev_volume_l - self.ekf_state.volume_l();
                if delta_l > 0.0 { Some(delta_l / L_PER_GAL) } else { None }
            };
            let idle_inputs = IdleEstimateInputs {
                is_stationary: true,
                engine_running: true,
                rpm: reading.rpm,
                fuel_rate_lph: reading.ecu_fuel_rate_gph.map(|g| g * 3.78541),
                total_idle_fuel_gal: reading.ecu_total_idle_fuel_gal,
                prev_total_idle_fuel_gal: self.prev_total_idle_fuel_gal,
                fuel_level_delta_gal,
                time_delta_hours: dt_hours,
                engine_load_pct: reading.engine_load_pct,
                ambient_temp_f: reading.ambient_temp_f,
                fuel_delta_confidence: fused.confidence,
            };
            self.idle_filter.estimate(&mut self.idle_state, idle_inputs);
        }
        if let Some(total) = reading.ecu_total_idle_fuel_gal {
            self.prev_total_idle_fuel_gal = Some(total);
        }

        self.consumption_history.push_back(self.ekf_state.rate_lph());
        if self.consumption_history.len() > CONSUMPTION_HISTORY_CAPACITY {
            self.consumption_history.pop_front();
        }
        if let Some(speed) = reading.speed_mph {
            self.speed_history.push_back(speed);
            if self.speed_history.len() > CONSUMPTION_HISTORY_CAPACITY {
                self.speed_history.pop_front();
            }
        }

        let stationary = reading.speed_mph.map(|v| v < REFUEL_MAX_SPEED_MPH).unwrap_or(false);
        self.idle_time_history.push_back(stationary);
        if self.idle_time_history.len() > IDLE_HISTORY_CAPACITY {
            self.idle_time_history.pop_front();
        }

        self.stats.cycles_processed += 1;
        if self.stats.cycles_processed % THRESHOLD_RECOMPUTE_EVERY_N_CYCLES == 0 {
            if let Some(thresholds) = self.anomaly_service.compute_thresholds(
                &self.consumption_history.iter().copied().collect::<Vec<_>>(),
                &self.speed_history.iter().copied().collect::<Vec<_>>(),
            ) {
                self.anomaly_thresholds = thresholds;
            }
        }

        // Rolling fraction of recent cycles spent stationary — a real
        // idle-time percentage, not a binary proxy off the current-cycle
        // activity state (which would read 0% for a siphoning truck parked
        // with the engine off).
        let idle_pct_estimate = 100.0 * self.idle_time_history.iter().filter(|&&s| s).count() as f64
            / self.idle_time_history.len().max(1) as f64;

        let rate_gph = self.ekf_state.rate_lph() / 3.78541;
        let anomaly_gate_gph = if stationary {
            self.anomaly_thresholds.idle_p90_gph * SIPHON_GATE_MULTIPLIER
        } else {
            self.anomaly_thresholds.consumption_p95_gph * CONSUMPTION_SPIKE_GATE_MULTIPLIER
        };
        if rate_gph > anomaly_gate_gph {
            let result = self.anomaly_service.classify(
                &self.truck_id,
                rate_gph,
                reading.speed_mph.unwrap_or(0.0),
                idle_pct_estimate,
                &self.anomaly_thresholds,
                &self.consumption_history,
            );
            let kind = result.category.map(|c| c.to_string()).unwrap_or_default();
            let severity = result.severity;
            let event = Event::FuelAnomaly {
                truck_id: self.truck_id.clone(),
                anomaly_type: kind.clone(),
                severity,
                message: result.message,
                confidence: result.confidence,
            };
            self.raise(event, &kind, severity, reading.timestamp, &mut outcome);
        }

        if let Some(advisory) = self.maintenance_service.evaluate(&self.truck_id, self.ekf_state.efficiency()) {
            let severity = advisory.severity;
            let event = Event::MaintenanceAlert {
                truck_id: self.truck_id.clone(),
                severity,
                message: advisory.message,
            };
            self.raise(event, "maintenance", severity, reading.timestamp, &mut outcome);
        }

        self.advance_driver_session(previous_activity, reading, dt_hours, &mut outcome);

        self.last_reading_at = Some(reading.timestamp);

        let elapsed_ms = start.elapsed().as_millis();
        self.stats.last_cycle_ms = elapsed_ms as f64;
        if elapsed_ms > SOFT_LATENCY_BUDGET_MS {
            self.stats.soft_budget_overruns += 1;
            warn!(truck_id = %self.truck_id, cycle_ms = elapsed_ms, "coordinator cycle exceeded soft latency budget");
        }

        outcome
    }

    /// True if `current_pct` represents an upward step large enough, soon
    /// enough after the last fuel-level observation, and while stationary
    /// enough, to plausibly be a refuel rather than sensor noise.
    fn refuel_jump(&self, current_pct: f64, now: DateTime<Utc>, speed_mph: Option<f64>) -> bool {
        let stationary = speed_mph.map(|v| v < REFUEL_MAX_SPEED_MPH).unwrap_or(true);
        if !stationary {
            return false;
        }
        match (self.last_fuel_pct, self.last_fuel_pct_at) {
            (Some(prev_pct), Some(prev_at)) => {
                let delta_pct = current_pct - prev_pct;
                let within_window = (now - prev_at).num_seconds() <= REFUEL_WINDOW_SECONDS;
                delta_pct >= REFUEL_MIN_PCT_JUMP && within_window
            }
            _ => false,
        }
    }

    /// Push `event` onto `outcome` unless `alert_service` is suppressing
    /// repeats of `kind` for this truck within its cooldown window.
    fn raise(&mut self, event: Event, kind: &str, severity: RiskLevel, now: DateTime<Utc>, outcome: &mut CycleOutcome) {
        if self.alert_service.should_fire(&self.truck_id, kind, severity, now) {
            outcome.events.push(event);
        } else {
            debug!(truck_id = %self.truck_id, kind, "alert suppressed by cooldown");
        }
    }

    fn advance_driver_session(
        &mut self,
        previous_activity: TruckActivityState,
        reading: &Reading,
        dt_hours: f64,
        outcome: &mut CycleOutcome,
    ) {
        let now_driving = self.activity == TruckActivityState::Driving;
        let was_driving = previous_activity == TruckActivityState::Driving;

        if now_driving && self.driver_session.is_none() {
            self.driver_session = Some(DriverSession::new("unknown", self.truck_id.clone(), reading.timestamp));
            outcome.events.push(Event::DriverSessionStart {
                driver_id: "unknown".to_string(),
                truck_id: self.truck_id.clone(),
            });
        }

        if let Some(session) = self.driver_session.as_mut() {
            if let Some(speed) = reading.speed_mph {
                session.speed_samples_mph.push(speed);
                if now_driving && dt_hours > 0.0 {
                    session.distance_miles += speed * dt_hours;
                }
            }
            if let Some(rpm) = reading.rpm {
                session.rpm_samples.push(rpm);
            }
            if dt_hours > 0.0 {
                session.fuel_used_liters += self.ekf_state.rate_lph() * dt_hours;
            }
            session.consumption_samples_gph.push(self.ekf_state.rate_lph() / 3.78541);
            session.idle_pct_samples.push(if self.activity.is_idle() { 100.0 } else { 0.0 });
        }

        if was_driving && !now_driving {
            if let Some(session) = self.driver_session.take() {
                if let Some(score) = self.driver_behavior_service.score_session(&session) {
                    self.driver_behavior_service.update_profile(&mut self.driver_profile, &score);
                    outcome.events.push(Event::DriverSessionEnd {
                        driver_id: score.driver_id.clone(),
                        truck_id: self.truck_id.clone(),
                        score: score.overall_rating_stars as f64,
                    });
                    if score.aggressiveness_score > 70 {
                        let event = Event::AggressiveDriving {
                            driver_id: score.driver_id.clone(),
                            truck_id: self.truck_id.clone(),
                            score: score.aggressiveness_score as f64,
                        };
                        self.raise(event, "aggressive_driving", RiskLevel::Elevated, reading.timestamp, outcome);
                    }
                    outcome.driver_score = Some(score);
                }
            }
        }
    }
}

/// Resolve geofence membership against `Config.activity_classification`.
/// Coordinator tests never call `config::init()`, so this reads `false`
/// (non-productive) rather than panicking when no config is loaded —
/// matching spec.md's redesign note that defaulting to non-productive is
/// acceptable until the geofence-membership input exists.
fn is_productive_geofence(geofence_id: Option<&str>) -> bool {
    if !crate::config::is_initialized() {
        return false;
    }
    let Some(id) = geofence_id else { return false };
    crate::config::get().activity_classification.productive_geofences.iter().any(|g| g == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading_at(secs: i64, fuel_pct: Option<f64>, speed: Option<f64>, rpm: Option<f64>) -> Reading {
        let mut r = Reading::new("t1", Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap());
        r.fuel_level_pct = fuel_pct;
        r.speed_mph = speed;
        r.rpm = rpm;
        r
    }

    fn coordinator() -> EstimatorCoordinator {
        EstimatorCoordinator::new(TruckId::new("t1"), TankSpec::saddle(400.0), 1.0)
    }

    #[test]
    fn first_reading_does_not_predict_with_negative_dt() {
        let mut coord = coordinator();
        let outcome = coord.process_reading(&reading_at(0, Some(50.0), Some(0.0), Some(0.0)));
        assert!(outcome.events.is_empty() || !outcome.events.is_empty()); // no panic
        assert_eq!(coord.stats().cycles_processed, 1);
    }

    #[test]
    fn driving_then_stopping_ends_a_session() {
        let mut coord = coordinator();
        coord.process_reading(&reading_at(0, Some(80.0), Some(0.0), Some(0.0)));
        for i in 1..10 {
            coord.process_reading(&reading_at(i * 60, Some(80.0 - i as f64), Some(55.0), Some(1400.0)));
        }
        let outcome = coord.process_reading(&reading_at(700, Some(60.0), Some(0.0), Some(0.0)));
        assert!(outcome.driver_score.is_some() || outcome.events.iter().any(|e| matches!(e, Event::DriverSessionEnd { .. })));
    }

    #[test]
    fn reset_ekf_reinitializes_state() {
        let mut coord = coordinator();
        coord.process_reading(&reading_at(0, Some(80.0), Some(30.0), Some(1200.0)));
        coord.reset_ekf(1.0);
        assert_eq!(coord.ekf_state().efficiency(), 1.0);
    }

    #[test]
    fn saddle_tank_refuel_fires_exactly_one_event() {
        let mut coord = EstimatorCoordinator::new(TruckId::new("t1"), TankSpec::saddle(500.0), 1.0);
        let pcts = [30.0, 29.0, 29.0, 28.0, 85.0, 86.0, 85.0];
        let mut refuel_events = 0;
        for (i, &pct) in pcts.iter().enumerate() {
            let outcome = coord.process_reading(&reading_at(i as i64 * 60, Some(pct), Some(0.0), Some(0.0)));
            refuel_events += outcome
                .events
                .iter()
                .filter(|e| matches!(e, Event::RefuelDetected { .. }))
                .count();
        }
        assert_eq!(refuel_events, 1);
        let refuel = coord.last_refuel().expect("refuel recorded");
        assert!((refuel.fuel_pct_before - 28.0).abs() < 1e-6);
        assert!((refuel.fuel_pct_after - 85.0).abs() < 1e-6);
    }

    #[test]
    fn gradual_drop_never_triggers_refuel() {
        let mut coord = coordinator();
        let mut refuel_events = 0;
        for i in 0..30 {
            let pct = 80.0 - i as f64 * 0.5;
            let outcome = coord.process_reading(&reading_at(i * 60, Some(pct), Some(0.0), Some(0.0)));
            refuel_events += outcome
                .events
                .iter()
                .filter(|e| matches!(e, Event::RefuelDetected { .. }))
                .count();
        }
        assert_eq!(refuel_events, 0);
    }

    #[test]
    fn refuel_while_driving_is_not_detected() {
        let mut coord = coordinator();
        coord.process_reading(&reading_at(0, Some(28.0), Some(0.0), Some(0.0)));
        let outcome = coord.process_reading(&reading_at(60, Some(85.0), Some(45.0), Some(1400.0)));
        assert!(!outcome.events.iter().any(|e| matches!(e, Event::RefuelDetected { .. })));
    }
}
