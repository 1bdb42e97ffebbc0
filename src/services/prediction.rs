//! Fuel-range and time-to-empty prediction.
//!
//! `ForecastModel` is an interface seam for a richer predictor (the
//! original system's LSTM component, out of scope here); `LinearForecast`
//! is the deterministic reference implementation — it must work
//! standalone, with no trained backend available, the same way the
//! teacher's advisory templates always have a deterministic fallback when
//! no LLM backend is configured.

use chrono::{DateTime, Duration, Utc};

use crate::types::TruckId;

#[derive(Debug, Clone, Copy)]
pub struct PredictionInputs {
    pub current_volume_l: f64,
    pub current_rate_lph: f64,
    pub recent_mpg: f64,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FuelPrediction {
    pub truck_id: TruckId,
    pub predicted_empty_at: Option<DateTime<Utc>>,
    pub predicted_range_miles: f64,
}

/// Seam for a richer forecaster (e.g. an LSTM trained on per-truck
/// consumption history). Not implemented here — see spec's non-goals.
pub trait ForecastModel: Send + Sync {
    fn predict(&self, truck_id: &TruckId, inputs: PredictionInputs) -> FuelPrediction;
}

/// Deterministic linear extrapolation from the current EKF rate estimate.
pub struct LinearForecast;

impl Default for LinearForecast {
    fn default() -> Self {
        Self
    }
}

const GAL_PER_L: f64 = 1.0 / 3.78541;

impl ForecastModel for LinearForecast {
    fn predict(&self, truck_id: &TruckId, inputs: PredictionInputs) -> FuelPrediction {
        let predicted_empty_at = if inputs.current_rate_lph > 0.01 {
            let hours_remaining = inputs.current_volume_l / inputs.current_rate_lph;
            Some(inputs.now + Duration::seconds((hours_remaining * 3600.0) as i64))
        } else {
            None
        };

        let gallons_remaining = inputs.current_volume_l * GAL_PER_L;
        let predicted_range_miles = gallons_remaining * inputs.recent_mpg;

        FuelPrediction {
            truck_id: truck_id.clone(),
            predicted_empty_at,
            predicted_range_miles,
        }
    }
}

pub struct PredictionService {
    model: Box<dyn ForecastModel>,
}

impl Default for PredictionService {
    fn default() -> Self {
        Self::new(Box::new(LinearForecast))
    }
}

impl PredictionService {
    pub fn new(model: Box<dyn ForecastModel>) -> Self {
        Self { model }
    }

    pub fn predict(&self, truck_id: &TruckId, inputs: PredictionInputs) -> FuelPrediction {
        self.model.predict(truck_id, inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_has_no_empty_time() {
        let service = PredictionService::default();
        let prediction = service.predict(
            &TruckId::new("t1"),
            PredictionInputs {
                current_volume_l: 100.0,
                current_rate_lph: 0.0,
                recent_mpg: 6.0,
                now: Utc::now(),
            },
        );
        assert!(prediction.predicted_empty_at.is_none());
    }

    #[test]
    fn positive_rate_predicts_future_empty_time() {
        let service = PredictionService::default();
        let now = Utc::now();
        let prediction = service.predict(
            &TruckId::new("t1"),
            PredictionInputs {
                current_volume_l: 100.0,
                current_rate_lph: 10.0,
                recent_mpg: 6.0,
                now,
            },
        );
        assert!(prediction.predicted_empty_at.unwrap() > now);
    }

    #[test]
    fn range_scales_with_volume_and_mpg() {
        let service = PredictionService::default();
        let prediction = service.predict(
            &TruckId::new("t1"),
            PredictionInputs {
                current_volume_l: 378.541,
                current_rate_lph: 5.0,
                recent_mpg: 6.0,
                now: Utc::now(),
            },
        );
        assert!((prediction.predicted_range_miles - 600.0).abs() < 1.0);
    }
}
