//! Tank specification: geometry and immutable registration data.

use serde::{Deserialize, Serialize};

/// Tank geometry. Determines the volume <-> sender-percent mapping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum TankShape {
    /// Horizontal cylinder — linear sender response.
    Cylinder,
    /// Saddle tank — three-region piecewise-linear sender response with
    /// breakpoints at 20% and 80% of sender range.
    Saddle,
    /// Rectangular tank — linear, kept distinct from `Cylinder` so future
    /// shape-specific corrections (e.g. baffles) have a seam to attach to.
    Rectangular,
    /// Operator-supplied calibration curve: pairs of (sender_pct, volume_fraction),
    /// sorted ascending by sender_pct, interpolated piecewise-linearly.
    Custom { curve: Vec<(f64, f64)> },
}

impl Default for TankShape {
    fn default() -> Self {
        TankShape::Cylinder
    }
}

/// Immutable per-truck tank registration. Once a truck is registered its
/// `TankSpec` does not change — a capacity or shape correction requires
/// re-registering (and resetting the EKF, since `volume_L` becomes invalid
/// under the old scale).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankSpec {
    pub capacity_l: f64,
    pub shape: TankShape,
}

impl TankSpec {
    pub fn new(capacity_l: f64, shape: TankShape) -> Self {
        Self { capacity_l, shape }
    }

    pub fn cylinder(capacity_l: f64) -> Self {
        Self::new(capacity_l, TankShape::Cylinder)
    }

    pub fn saddle(capacity_l: f64) -> Self {
        Self::new(capacity_l, TankShape::Saddle)
    }
}
