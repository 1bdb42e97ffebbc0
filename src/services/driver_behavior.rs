//! Driver behavior scoring: efficiency, aggressiveness, and safety scores
//! computed from a completed driving session's samples.
//!
//! Grounded on
//! `examples/original_source/driver_behavior_scoring_v2.py`'s
//! `DriverBehaviorScorer` (`_calculate_efficiency_score`,
//! `_calculate_aggressiveness_score`, `_calculate_safety_score`,
//! `_generate_comments`, `_generate_recommendations`), with the same
//! constants and weighting.

use chrono::Utc;

use crate::types::{DriverProfile, DriverScore, DriverSession};

const RPM_AGGRESSIVE_JUMP: f64 = 1500.0;
const SPEED_AGGRESSIVE_CHANGE_MPH: f64 = 20.0;
const BASELINE_MPG: f64 = 6.0;
const GAL_PER_L: f64 = 1.0 / 3.78541;

const MIN_SESSION_SAMPLES: usize = 5;

pub struct DriverBehaviorService;

impl Default for DriverBehaviorService {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverBehaviorService {
    pub fn new() -> Self {
        Self
    }

    /// Score a completed session. Returns `None` if the session has too
    /// few samples to be meaningful.
    pub fn score_session(&self, session: &DriverSession) -> Option<DriverScore> {
        if session.consumption_samples_gph.len() < MIN_SESSION_SAMPLES {
            return None;
        }

        let efficiency_score =
            self.efficiency_score(session.fuel_used_liters, session.distance_miles);
        let aggressiveness_score = self.aggressiveness_score(
            &session.speed_samples_mph,
            &session.rpm_samples,
            &session.consumption_samples_gph,
        );
        let safety_score = self.safety_score(
            &session.speed_samples_mph,
            &session.rpm_samples,
            &session.idle_pct_samples,
        );

        let overall_ratio = (efficiency_score as f64 * 0.4
            + safety_score as f64 * 0.4
            + (100.0 - aggressiveness_score as f64) * 0.2)
            / 100.0;
        let overall_rating_stars = ((overall_ratio * 5.0).round() as i64).clamp(1, 5) as u8;

        let average_speed_mph = mean(&session.speed_samples_mph);
        let speed_variance_mph2 = variance(&session.speed_samples_mph);
        let avg_idle_pct = mean(&session.idle_pct_samples);

        let comments = self.comments(efficiency_score, aggressiveness_score, safety_score, avg_idle_pct);
        let recommendations = self.recommendations(efficiency_score, aggressiveness_score, safety_score);

        let duration_minutes = (Utc::now() - session.started_at).num_seconds() as f64 / 60.0;

        Some(DriverScore {
            driver_id: session.driver_id.clone(),
            truck_id: session.truck_id.clone(),
            session_started_at: session.started_at,
            duration_minutes,
            distance_miles: session.distance_miles,
            fuel_used_liters: session.fuel_used_liters,
            average_speed_mph,
            speed_variance_mph2,
            avg_idle_pct,
            fuel_efficiency_score: efficiency_score,
            aggressiveness_score,
            safety_score,
            overall_rating_stars,
            comments,
            recommendations,
        })
    }

    pub fn update_profile(&self, profile: &mut DriverProfile, score: &DriverScore) {
        profile.driver_id = score.driver_id.clone();
        let n = profile.total_sessions as f64;
        profile.total_sessions += 1;
        profile.total_distance_miles += score.distance_miles;
        profile.total_fuel_used_liters += score.fuel_used_liters;
        profile.avg_efficiency_score =
            (profile.avg_efficiency_score * n + score.fuel_efficiency_score as f64) / (n + 1.0);
        profile.avg_aggressiveness_score =
            (profile.avg_aggressiveness_score * n + score.aggressiveness_score as f64) / (n + 1.0);
        profile.avg_safety_score =
            (profile.avg_safety_score * n + score.safety_score as f64) / (n + 1.0);
        profile.avg_rating_stars =
            (profile.avg_rating_stars * n + score.overall_rating_stars as f64) / (n + 1.0);
    }

    fn efficiency_score(&self, fuel_used_liters: f64, distance_miles: f64) -> u8 {
        if distance_miles <= 0.0 {
            return 50;
        }
        let fuel_used_gal = fuel_used_liters * GAL_PER_L;
        let actual_mpg = if fuel_used_gal > 0.0 {
            distance_miles / fuel_used_gal
        } else {
            0.0
        };
        let ratio = actual_mpg / BASELINE_MPG;
        (ratio * 100.0).clamp(0.0, 100.0) as u8
    }

    fn aggressiveness_score(&self, speed: &[f64], rpm: &[f64], consumption: &[f64]) -> u8 {
        let mut score = 30.0;

        if speed.len() > 2 {
            let large_changes = speed
                .windows(2)
                .filter(|w| (w[1] - w[0]).abs() > SPEED_AGGRESSIVE_CHANGE_MPH)
                .count();
            score += (large_changes as f64 * 2.0).min(30.0);
        }

        if rpm.len() > 2 {
            let aggressive_rpm = rpm
                .windows(2)
                .filter(|w| (w[1] - w[0]).abs() > RPM_AGGRESSIVE_JUMP)
                .count();
            score += (aggressive_rpm as f64 * 2.0).min(20.0);
        }

        if consumption.len() > 2 {
            score += (variance(consumption) * 5.0).min(20.0);
        }

        score.min(100.0) as u8
    }

    fn safety_score(&self, speed: &[f64], rpm: &[f64], idle_pct: &[f64]) -> u8 {
        let mut score = 100.0;

        if speed.len() > 2 {
            score -= (variance(speed) * 2.0).min(30.0);
        }

        if rpm.len() > 2 {
            let jump_fraction = rpm
                .windows(2)
                .filter(|w| (w[1] - w[0]).abs() > RPM_AGGRESSIVE_JUMP)
                .count() as f64
                / (rpm.len() - 1) as f64;
            score -= (jump_fraction * 40.0).min(20.0);
        }

        let avg_idle = mean(idle_pct);
        if avg_idle < 10.0 {
            score = (score + 5.0).min(100.0);
        } else if avg_idle > 40.0 {
            score -= ((avg_idle - 40.0) * 0.5).min(20.0);
        }

        score.max(0.0) as u8
    }

    fn comments(&self, efficiency: u8, aggressiveness: u8, safety: u8, avg_idle: f64) -> Vec<String> {
        let mut out = Vec::new();
        if efficiency > 80 {
            out.push("Excellent fuel efficiency".to_string());
        } else if efficiency > 60 {
            out.push("Good fuel efficiency".to_string());
        } else {
            out.push("Low efficiency - room for improvement".to_string());
        }

        if aggressiveness < 30 {
            out.push("Smooth, controlled driving".to_string());
        } else if aggressiveness > 60 {
            out.push("Aggressive driving detected".to_string());
        }

        if safety > 85 {
            out.push("Safe driving".to_string());
        } else if safety < 60 {
            out.push("Unsafe driving patterns".to_string());
        }

        if avg_idle > 30.0 {
            out.push(format!("High idle time ({avg_idle:.0}%)"));
        }

        out
    }

    fn recommendations(&self, efficiency: u8, aggressiveness: u8, safety: u8) -> Vec<String> {
        let mut out = Vec::new();
        if efficiency < 70 {
            out.push("Maintain steady speeds for better consumption".to_string());
        }
        if aggressiveness > 50 {
            out.push("Avoid hard acceleration".to_string());
            out.push("Anticipate braking for smoothness".to_string());
        }
        if safety < 70 {
            out.push("Increase following distance".to_string());
            out.push("Pay closer attention to speed changes".to_string());
        }
        if out.is_empty() {
            out.push("Keep up the good performance".to_string());
        }
        out
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TruckId;

    fn session_with(speed: Vec<f64>, rpm: Vec<f64>, consumption: Vec<f64>) -> DriverSession {
        let mut s = DriverSession::new("d1", TruckId::new("t1"), Utc::now());
        s.speed_samples_mph = speed;
        s.rpm_samples = rpm;
        s.consumption_samples_gph = consumption;
        s.idle_pct_samples = vec![5.0; 10];
        s.distance_miles = 50.0;
        s.fuel_used_liters = 30.0;
        s
    }

    #[test]
    fn too_few_samples_returns_none() {
        let service = DriverBehaviorService::new();
        let session = session_with(vec![30.0, 31.0], vec![1200.0, 1210.0], vec![3.0, 3.1]);
        assert!(service.score_session(&session).is_none());
    }

    #[test]
    fn steady_driving_scores_low_aggressiveness_high_safety() {
        let service = DriverBehaviorService::new();
        let session = session_with(
            vec![55.0; 10],
            vec![1400.0; 10],
            vec![3.0; 10],
        );
        let score = service.score_session(&session).unwrap();
        assert!(score.aggressiveness_score < 40);
        assert!(score.safety_score > 80);
    }

    #[test]
    fn erratic_speed_scores_high_aggressiveness() {
        let service = DriverBehaviorService::new();
        let session = session_with(
            vec![20.0, 60.0, 10.0, 70.0, 5.0, 65.0, 15.0, 55.0, 25.0, 60.0],
            vec![1400.0; 10],
            vec![3.0; 10],
        );
        let score = service.score_session(&session).unwrap();
        assert!(score.aggressiveness_score > 40);
    }

    #[test]
    fn profile_updates_running_average() {
        let service = DriverBehaviorService::new();
        let mut profile = crate::types::DriverProfile::default();
        let session = session_with(vec![55.0; 10], vec![1400.0; 10], vec![3.0; 10]);
        let score = service.score_session(&session).unwrap();
        service.update_profile(&mut profile, &score);
        assert_eq!(profile.total_sessions, 1);
        assert!(profile.avg_efficiency_score >= 0.0);
    }
}
