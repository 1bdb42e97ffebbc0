//! Rule-based fuel anomaly classification.
//!
//! Grounded on `examples/original_source/anomaly_detection_v2.py`'s
//! `_classify_anomaly`/`_compute_thresholds`. The original gated its
//! Isolation Forest behind an optional scikit-learn import and fell back to
//! doing nothing when it was absent; this service always runs the
//! rule-based classification the original used to pick an anomaly's
//! *category* once the (here, unavailable) ML model had already flagged an
//! observation as anomalous — i.e. the reference path, not the opt-in one.

use std::collections::VecDeque;

use chrono::Utc;
use statrs::statistics::{Data, Distribution, OrderStatistics};

use crate::types::{AnomalyCategory, AnomalyResult, AnomalyThresholds, RiskLevel, TruckId};

const MIN_SAMPLES_FOR_THRESHOLDS: usize = 10;
const MIN_SAMPLES_FOR_TREND: usize = 5;
const SLOW_LEAK_TREND_LPH_PER_SAMPLE: f64 = 0.1;
const CONSUMPTION_SPIKE_MULTIPLIER: f64 = 1.5;
const SIPHON_CONSUMPTION_MULTIPLIER: f64 = 2.0;

pub struct AnomalyService {
    history_capacity: usize,
}

impl Default for AnomalyService {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyService {
    pub fn new() -> Self {
        Self {
            history_capacity: 200,
        }
    }

    /// Recompute a truck's adaptive thresholds from its rolling consumption
    /// and speed history. Returns `None` if there isn't enough history yet.
    pub fn compute_thresholds(
        &self,
        consumption_gph: &[f64],
        speed_mph: &[f64],
    ) -> Option<AnomalyThresholds> {
        if consumption_gph.len() < MIN_SAMPLES_FOR_THRESHOLDS {
            return None;
        }

        let mut consumption_data = Data::new(consumption_gph.to_vec());
        let consumption_mean_gph = consumption_data.mean().unwrap_or(0.0);
        let consumption_std_gph = consumption_data.std_dev().unwrap_or(0.0);
        let consumption_p95_gph = consumption_data.percentile(95);

        let idle_consumption: Vec<f64> = consumption_gph
            .iter()
            .zip(speed_mph.iter())
            .filter(|(_, &s)| s < 5.0)
            .map(|(&c, _)| c)
            .collect();
        let idle_p90_gph = if idle_consumption.is_empty() {
            0.5
        } else {
            Data::new(idle_consumption).percentile(90)
        };

        let highway_consumption: Vec<f64> = consumption_gph
            .iter()
            .zip(speed_mph.iter())
            .filter(|(_, &s)| s > 50.0)
            .map(|(&c, _)| c)
            .collect();
        let highway_p95_gph = if highway_consumption.is_empty() {
            4.0
        } else {
            Data::new(highway_consumption).percentile(95)
        };

        Some(AnomalyThresholds {
            consumption_mean_gph,
            consumption_p95_gph,
            consumption_std_gph,
            idle_p90_gph,
            highway_p95_gph,
        })
    }

    /// Classify the current observation against adaptive thresholds and
    /// recent consumption trend. `is_anomaly` gates whether this is called
    /// at all upstream — this function assumes the caller already decided
    /// the observation warrants classification.
    pub fn classify(
        &self,
        truck_id: &TruckId,
        consumption_gph: f64,
        speed_mph: f64,
        idle_pct: f64,
        thresholds: &AnomalyThresholds,
        recent_consumption_history: &VecDeque<f64>,
    ) -> AnomalyResult {
        let mut category = AnomalyCategory::ConsumptionSpike;
        let mut confidence = 0.7;
        let mut message = "consumption anomaly".to_string();

        if speed_mph < 2.0 && idle_pct > 90.0 && consumption_gph > thresholds.idle_p90_gph * SIPHON_CONSUMPTION_MULTIPLIER {
            category = AnomalyCategory::Siphoning;
            confidence = 0.95;
            message = format!(
                "consumption {consumption_gph:.2} gph while stationary, {:.1}x idle baseline",
                consumption_gph / thresholds.idle_p90_gph.max(0.01)
            );
        }

        if recent_consumption_history.len() > MIN_SAMPLES_FOR_TREND {
            if let Some(trend) = linear_trend(recent_consumption_history) {
                if trend > SLOW_LEAK_TREND_LPH_PER_SAMPLE {
                    category = AnomalyCategory::SlowLeak;
                    confidence = 0.85;
                    message = format!("consumption trending up {trend:.3} gph/sample");
                }
            }
        }

        if consumption_gph > thresholds.consumption_p95_gph * CONSUMPTION_SPIKE_MULTIPLIER {
            category = AnomalyCategory::ConsumptionSpike;
            confidence = 0.80;
            message = format!(
                "consumption {:.1}x the 95th-percentile baseline",
                consumption_gph / thresholds.consumption_p95_gph.max(0.01)
            );
        }

        let severity = match category {
            AnomalyCategory::Siphoning => RiskLevel::Critical,
            AnomalyCategory::SlowLeak => RiskLevel::High,
            AnomalyCategory::ConsumptionSpike => RiskLevel::Elevated,
            AnomalyCategory::SensorMalfunction => RiskLevel::High,
            AnomalyCategory::InconsistentRefuel => RiskLevel::Elevated,
            AnomalyCategory::ExcessiveIdle => RiskLevel::Elevated,
        };

        AnomalyResult {
            truck_id: truck_id.clone(),
            is_anomaly: true,
            category: Some(category),
            confidence,
            severity,
            message,
            detected_at: Utc::now(),
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }
}

/// Ordinary least squares slope over an evenly-spaced sample index —
/// equivalent to `np.polyfit(range(n), y, 1)[0]` in the reference.
fn linear_trend(samples: &VecDeque<f64>) -> Option<f64> {
    let n = samples.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = samples.iter().sum::<f64>() / n as f64;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in samples.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_require_minimum_samples() {
        let service = AnomalyService::new();
        let result = service.compute_thresholds(&[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0]);
        assert!(result.is_none());
    }

    #[test]
    fn thresholds_compute_percentiles() {
        let service = AnomalyService::new();
        let consumption: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let speed = vec![30.0; 20];
        let thresholds = service.compute_thresholds(&consumption, &speed).unwrap();
        assert!(thresholds.consumption_p95_gph > thresholds.consumption_mean_gph);
    }

    #[test]
    fn stationary_high_consumption_classified_as_siphoning() {
        let service = AnomalyService::new();
        let thresholds = AnomalyThresholds::default();
        let result = service.classify(
            &TruckId::new("t1"),
            5.0,
            0.5,
            95.0,
            &thresholds,
            &VecDeque::new(),
        );
        assert_eq!(result.category, Some(AnomalyCategory::Siphoning));
        assert_eq!(result.severity, RiskLevel::Critical);
    }

    #[test]
    fn rising_trend_classified_as_slow_leak() {
        let service = AnomalyService::new();
        let thresholds = AnomalyThresholds::default();
        let history: VecDeque<f64> = (0..10).map(|i| 1.0 + i as f64 * 0.5).collect();
        let result = service.classify(&TruckId::new("t1"), 2.0, 40.0, 0.0, &thresholds, &history);
        assert_eq!(result.category, Some(AnomalyCategory::SlowLeak));
    }

    #[test]
    fn trend_with_no_variance_returns_none() {
        let flat: VecDeque<f64> = std::iter::repeat(2.0).take(10).collect();
        assert_eq!(linear_trend(&flat), Some(0.0));
    }
}
