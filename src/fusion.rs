//! Multi-sensor fuel fusion: weighted blend of fuel-level sender, ECU
//! cumulative fuel-used counter, and ECU instantaneous fuel-rate channel
//! into a single fuel-percent/consumption estimate, with cross-validation
//! between channels to flag disagreement before it reaches the EKF.

use tracing::warn;

use crate::types::{ChannelHistory, FusedEstimate, SensorChannel, SensorSample};

const VARIANCE_ANOMALY_THRESHOLD: f64 = 100.0; // (pct points)^2, ~10% spread
const FUEL_LEVEL_DOWNWEIGHT_ON_DISAGREEMENT: f64 = 0.5;
const RECENCY_DECAY: f64 = 0.5;
const MAX_RECENT_SAMPLES: usize = 5;

pub struct FusionEngine {
    truck_id: String,
    tank_capacity_l: f64,
    channels: std::collections::HashMap<SensorChannel, ChannelHistory>,
    fused_fuel_pct: f64,
    fused_consumption_gph: f64,
}

impl FusionEngine {
    pub fn new(truck_id: impl Into<String>, tank_capacity_l: f64) -> Self {
        let channels = SensorChannel::ALL
            .into_iter()
            .map(|c| (c, ChannelHistory::new(c)))
            .collect();
        Self {
            truck_id: truck_id.into(),
            tank_capacity_l,
            channels,
            fused_fuel_pct: 50.0,
            fused_consumption_gph: 5.0,
        }
    }

    /// Record one channel reading. Returns `false` if it failed validation
    /// (out of physical range, or rate-of-change implausible) — it is still
    /// stored, marked invalid, so history isn't silently gappy.
    pub fn add_reading(
        &mut self,
        channel: SensorChannel,
        value: f64,
        timestamp_unix_s: f64,
    ) -> bool {
        let history = self.channels.get_mut(&channel).expect("all channels registered");
        if !history.config.enabled {
            return false;
        }

        let mut is_valid = true;
        if let Some(last) = history.last() {
            let dt_min = (timestamp_unix_s - last.timestamp_unix_s) / 60.0;
            if dt_min > 0.0 {
                let rate = (value - last.value).abs() / dt_min;
                if rate > history.config.max_rate_of_change {
                    is_valid = false;
                    warn!(
                        truck_id = %self.truck_id,
                        %channel, rate, max = history.config.max_rate_of_change,
                        "fusion channel rate of change too high"
                    );
                }
            }
        }

        is_valid &= match channel {
            SensorChannel::FuelLevel => (0.0..=100.0).contains(&value),
            SensorChannel::EcuFuelUsed => value >= 0.0 && value <= self.tank_capacity_l * 2.0,
            SensorChannel::EcuFuelRate => (0.0..=50.0).contains(&value),
        };

        history.push(SensorSample {
            value,
            timestamp_unix_s,
            is_valid,
        });
        is_valid
    }

    fn fuel_level_estimate(&self) -> Option<f64> {
        let history = &self.channels[&SensorChannel::FuelLevel];
        let valid: Vec<&SensorSample> = history
            .samples
            .iter()
            .rev()
            .take(MAX_RECENT_SAMPLES)
            .filter(|s| s.is_valid)
            .collect();
        if valid.is_empty() {
            return None;
        }
        // valid is newest-first; weight most-recent highest.
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (i, sample) in valid.iter().enumerate() {
            let w = RECENCY_DECAY.powi(i as i32);
            weighted_sum += sample.value * w;
            weight_total += w;
        }
        Some(weighted_sum / weight_total)
    }

    fn ecu_fuel_used_estimate(&self, reference_fuel_pct: Option<f64>) -> (Option<f64>, Option<f64>) {
        let history = &self.channels[&SensorChannel::EcuFuelUsed];
        let valid: Vec<&SensorSample> = history.samples.iter().filter(|s| s.is_valid).collect();
        if valid.len() < 2 {
            return (None, None);
        }
        let first = valid[0];
        let last = valid[valid.len() - 1];
        let delta = last.value - first.value;
        let dt_hours = (last.timestamp_unix_s - first.timestamp_unix_s) / 3600.0;

        if dt_hours <= 0.0 || !(0.0..self.tank_capacity_l).contains(&delta) {
            return (None, None);
        }

        let consumption = delta / dt_hours;
        match reference_fuel_pct {
            Some(reference) => {
                let consumed_pct = delta / self.tank_capacity_l * 100.0;
                let fuel_pct = (reference - consumed_pct).clamp(0.0, 100.0);
                (Some(fuel_pct), Some(consumption))
            }
            None => (None, Some(consumption)),
        }
    }

    fn ecu_fuel_rate_estimate(&self) -> Option<f64> {
        let history = &self.channels[&SensorChannel::EcuFuelRate];
        let valid: Vec<f64> = history
            .samples
            .iter()
            .filter(|s| s.is_valid)
            .map(|s| s.value)
            .collect();
        if valid.is_empty() {
            return None;
        }
        Some(valid.iter().sum::<f64>() / valid.len() as f64)
    }

    /// Fuse all channels into one estimate for this reading cycle.
    pub fn fuse(&mut self) -> FusedEstimate {
        let mut estimates_pct = Vec::new();
        let mut weights_pct = Vec::new();
        let mut consumption_values = Vec::new();
        let mut anomalous = Vec::new();

        if !self.channels[&SensorChannel::FuelLevel].samples.is_empty() {
            match self.fuel_level_estimate() {
                Some(pct) => {
                    estimates_pct.push((SensorChannel::FuelLevel, pct));
                    weights_pct.push(self.channels[&SensorChannel::FuelLevel].adaptive_weight);
                }
                None => anomalous.push(SensorChannel::FuelLevel.to_string()),
            }
        }

        if !self.channels[&SensorChannel::EcuFuelUsed].samples.is_empty() {
            let reference = estimates_pct.first().map(|(_, v)| *v).unwrap_or(self.fused_fuel_pct);
            let (pct, consumption) = self.ecu_fuel_used_estimate(Some(reference));
            if let Some(pct) = pct {
                estimates_pct.push((SensorChannel::EcuFuelUsed, pct));
                weights_pct.push(self.channels[&SensorChannel::EcuFuelUsed].adaptive_weight);
            }
            if let Some(c) = consumption {
                consumption_values.push(c);
            }
        }

        if !self.channels[&SensorChannel::EcuFuelRate].samples.is_empty() {
            if let Some(c) = self.ecu_fuel_rate_estimate() {
                consumption_values.push(c);
            }
        }

        if estimates_pct.len() >= 2 {
            let values: Vec<f64> = estimates_pct.iter().map(|(_, v)| *v).collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

            if variance > VARIANCE_ANOMALY_THRESHOLD {
                anomalous.push("high_variance".to_string());
                warn!(truck_id = %self.truck_id, variance, "fusion sensor variance high");

                if let Some(w) = weights_pct.first_mut() {
                    *w *= FUEL_LEVEL_DOWNWEIGHT_ON_DISAGREEMENT;
                }
            }
        }

        let (fused_pct, confidence) = if !estimates_pct.is_empty() {
            let total_weight: f64 = weights_pct.iter().sum();
            let fused = estimates_pct
                .iter()
                .zip(weights_pct.iter())
                .map(|((_, v), w)| v * w)
                .sum::<f64>()
                / total_weight;

            let n_channels = self.channels.len();
            let n_active = self.channels.values().filter(|h| !h.samples.is_empty()).count();
            (fused, n_active as f64 / n_channels as f64)
        } else {
            anomalous.push("no_estimates".to_string());
            (self.fused_fuel_pct, 0.3)
        };

        let fused_consumption = if !consumption_values.is_empty() {
            consumption_values.iter().sum::<f64>() / consumption_values.len() as f64
        } else {
            self.fused_consumption_gph
        };

        self.fused_fuel_pct = fused_pct;
        self.fused_consumption_gph = fused_consumption;

        FusedEstimate {
            fuel_pct: fused_pct,
            fuel_liters: fused_pct / 100.0 * self.tank_capacity_l,
            consumption_gph: fused_consumption,
            confidence,
            channel_weights: self
                .channels
                .iter()
                .map(|(c, h)| (*c, h.adaptive_weight))
                .collect(),
            anomalous_channels: anomalous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fuel_level_reading_is_used_directly() {
        let mut engine = FusionEngine::new("t1", 400.0);
        engine.add_reading(SensorChannel::FuelLevel, 60.0, 1000.0);
        let est = engine.fuse();
        assert!((est.fuel_pct - 60.0).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_fuel_level_is_invalid() {
        let mut engine = FusionEngine::new("t1", 400.0);
        let valid = engine.add_reading(SensorChannel::FuelLevel, 150.0, 1000.0);
        assert!(!valid);
    }

    #[test]
    fn rate_of_change_too_fast_is_invalid() {
        let mut engine = FusionEngine::new("t1", 400.0);
        engine.add_reading(SensorChannel::FuelLevel, 50.0, 0.0);
        let valid = engine.add_reading(SensorChannel::FuelLevel, 90.0, 30.0); // 30s later, 40% jump
        assert!(!valid);
    }

    #[test]
    fn ecu_fuel_used_delta_computes_consumption() {
        let mut engine = FusionEngine::new("t1", 400.0);
        engine.add_reading(SensorChannel::EcuFuelUsed, 10.0, 0.0);
        engine.add_reading(SensorChannel::EcuFuelUsed, 15.0, 3600.0);
        let est = engine.fuse();
        assert!((est.consumption_gph - 5.0).abs() < 1e-6);
    }

    #[test]
    fn disagreeing_sensors_flag_high_variance_and_downweight_fuel_level() {
        let mut engine = FusionEngine::new("t1", 400.0);
        engine.add_reading(SensorChannel::FuelLevel, 80.0, 0.0);
        engine.add_reading(SensorChannel::EcuFuelUsed, 10.0, 0.0);
        engine.add_reading(SensorChannel::EcuFuelUsed, 11.0, 3600.0);
        let est = engine.fuse();
        assert!(est.anomalous_channels.contains(&"high_variance".to_string()));
    }

    #[test]
    fn no_data_falls_back_to_previous_estimate_with_low_confidence() {
        let mut engine = FusionEngine::new("t1", 400.0);
        let est = engine.fuse();
        assert_eq!(est.confidence, 0.3);
        assert!(est.anomalous_channels.contains(&"no_estimates".to_string()));
    }
}
