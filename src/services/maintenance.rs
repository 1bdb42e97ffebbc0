//! Maintenance advisories driven by EKF efficiency-factor drift.
//!
//! The EKF's `efficiency` state term (nominally 1.0) absorbs whatever the
//! physics model doesn't capture — clogged fuel filter, worn injectors,
//! dragging brakes. A sustained drift away from 1.0 is a maintenance
//! signal, not a fuel-estimation error, so this service watches it rather
//! than folding it back into the EKF.

use crate::types::{fuel_thresholds, RiskLevel, TruckId};

#[derive(Debug, Clone)]
pub struct MaintenanceAdvisory {
    pub truck_id: TruckId,
    pub severity: RiskLevel,
    pub message: String,
    pub drift_fraction: f64,
}

pub struct MaintenanceService;

impl Default for MaintenanceService {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceService {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate current EKF efficiency factor for drift-based maintenance
    /// signals. `efficiency` is the EKF's `x[2]` term, nominally 1.0.
    pub fn evaluate(&self, truck_id: &TruckId, efficiency: f64) -> Option<MaintenanceAdvisory> {
        let drift = (efficiency - 1.0).abs();

        let severity = if drift >= fuel_thresholds::EFFICIENCY_DRIFT_CRITICAL {
            RiskLevel::Critical
        } else if drift >= fuel_thresholds::EFFICIENCY_DRIFT_WARNING {
            RiskLevel::Elevated
        } else {
            return None;
        };

        let direction = if efficiency > 1.0 {
            "burning more fuel than the physics model predicts"
        } else {
            "burning less fuel than the physics model predicts"
        };

        Some(MaintenanceAdvisory {
            truck_id: truck_id.clone(),
            severity,
            message: format!(
                "efficiency factor drifted {:.0}% from nominal ({direction})",
                drift * 100.0
            ),
            drift_fraction: drift,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_efficiency_has_no_advisory() {
        let service = MaintenanceService::new();
        assert!(service.evaluate(&TruckId::new("t1"), 1.0).is_none());
    }

    #[test]
    fn moderate_drift_is_elevated() {
        let service = MaintenanceService::new();
        let advisory = service.evaluate(&TruckId::new("t1"), 1.2).unwrap();
        assert_eq!(advisory.severity, RiskLevel::Elevated);
    }

    #[test]
    fn large_drift_is_critical() {
        let service = MaintenanceService::new();
        let advisory = service.evaluate(&TruckId::new("t1"), 1.5).unwrap();
        assert_eq!(advisory.severity, RiskLevel::Critical);
    }
}
