//! Refuel event detection types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TruckId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefuelEvent {
    pub truck_id: TruckId,
    pub detected_at: DateTime<Utc>,
    pub fuel_pct_before: f64,
    pub fuel_pct_after: f64,
    pub estimated_liters_added: f64,
    /// False when the jump pattern looks inconsistent with a real refuel
    /// (e.g. a second jump too soon after the last one, or a jump while
    /// driving) — still reported, but flagged for review.
    pub plausible: bool,
}
