//! Alert cooldown gating: suppresses repeat alerts of the same kind for
//! the same truck within a cooldown window, except critical-severity
//! alerts which always bypass it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{fuel_thresholds, RiskLevel, TruckId};

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct CooldownKey {
    truck_id: TruckId,
    kind: String,
}

pub struct AlertService {
    last_fired: HashMap<CooldownKey, DateTime<Utc>>,
    cooldown: chrono::Duration,
}

impl Default for AlertService {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertService {
    pub fn new() -> Self {
        Self {
            last_fired: HashMap::new(),
            cooldown: chrono::Duration::seconds(fuel_thresholds::DEFAULT_COOLDOWN_SECONDS as i64),
        }
    }

    /// Returns `true` if this alert should actually be raised (not
    /// suppressed by cooldown), and records the firing time if so.
    pub fn should_fire(
        &mut self,
        truck_id: &TruckId,
        kind: &str,
        severity: RiskLevel,
        now: DateTime<Utc>,
    ) -> bool {
        if severity == RiskLevel::Critical && fuel_thresholds::CRITICAL_BYPASS_COOLDOWN {
            self.record(truck_id, kind, now);
            return true;
        }

        let key = CooldownKey {
            truck_id: truck_id.clone(),
            kind: kind.to_string(),
        };

        let allowed = match self.last_fired.get(&key) {
            Some(last) => now - *last >= self.cooldown,
            None => true,
        };

        if allowed {
            self.last_fired.insert(key, now);
        }
        allowed
    }

    fn record(&mut self, truck_id: &TruckId, kind: &str, now: DateTime<Utc>) {
        self.last_fired.insert(
            CooldownKey {
                truck_id: truck_id.clone(),
                kind: kind.to_string(),
            },
            now,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_alert_always_fires() {
        let mut service = AlertService::new();
        assert!(service.should_fire(&TruckId::new("t1"), "low_fuel", RiskLevel::Elevated, Utc::now()));
    }

    #[test]
    fn repeat_alert_within_cooldown_is_suppressed() {
        let mut service = AlertService::new();
        let t0 = Utc::now();
        assert!(service.should_fire(&TruckId::new("t1"), "low_fuel", RiskLevel::Elevated, t0));
        assert!(!service.should_fire(&TruckId::new("t1"), "low_fuel", RiskLevel::Elevated, t0 + chrono::Duration::seconds(10)));
    }

    #[test]
    fn alert_after_cooldown_window_fires_again() {
        let mut service = AlertService::new();
        let t0 = Utc::now();
        assert!(service.should_fire(&TruckId::new("t1"), "low_fuel", RiskLevel::Elevated, t0));
        let later = t0 + chrono::Duration::seconds(fuel_thresholds::DEFAULT_COOLDOWN_SECONDS as i64 + 1);
        assert!(service.should_fire(&TruckId::new("t1"), "low_fuel", RiskLevel::Elevated, later));
    }

    #[test]
    fn critical_severity_always_bypasses_cooldown() {
        let mut service = AlertService::new();
        let t0 = Utc::now();
        assert!(service.should_fire(&TruckId::new("t1"), "siphoning", RiskLevel::Critical, t0));
        assert!(service.should_fire(&TruckId::new("t1"), "siphoning", RiskLevel::Critical, t0 + chrono::Duration::seconds(1)));
    }
}
