//! Tank geometry: volume <-> sender-percent mapping, per shape.
//!
//! Sender percent is what a capacitive/float sensor reports; it is not
//! proportional to volume for irregular tank geometries. Saddle tanks in
//! particular have a non-linear response: the sensor compresses the low
//! and high ends of its range relative to actual liquid volume.

use crate::types::{TankShape, TankSpec};

/// Saddle-tank sender response breakpoints and slopes, read off a
/// representative factory calibration curve: below 20% fill the sensor
/// under-reports (slope 0.9), between 20-80% it tracks linearly, above
/// 80% it compresses again (slope 0.7).
const SADDLE_LOW_BREAK_PCT: f64 = 20.0;
const SADDLE_HIGH_BREAK_PCT: f64 = 80.0;
const SADDLE_LOW_SLOPE: f64 = 0.9;
const SADDLE_MID_SLOPE: f64 = 1.0;
const SADDLE_HIGH_SLOPE: f64 = 0.7;

impl TankSpec {
    /// Sensor-reported percent given an actual volume in liters. Clamped to
    /// [0, 100] at the volume level before shape correction is applied.
    pub fn sensor_pct_from_volume(&self, volume_l: f64) -> f64 {
        let fuel_pct = (volume_l / self.capacity_l * 100.0).clamp(0.0, 100.0);

        match &self.shape {
            TankShape::Saddle => {
                if fuel_pct < SADDLE_LOW_BREAK_PCT {
                    fuel_pct * SADDLE_LOW_SLOPE
                } else if fuel_pct > SADDLE_HIGH_BREAK_PCT {
                    SADDLE_HIGH_BREAK_PCT + (fuel_pct - SADDLE_HIGH_BREAK_PCT) * SADDLE_HIGH_SLOPE
                } else {
                    fuel_pct * SADDLE_MID_SLOPE
                }
            }
            TankShape::Cylinder | TankShape::Rectangular => fuel_pct,
            TankShape::Custom { curve } => interpolate_curve(curve, fuel_pct),
        }
    }

    /// d(sensor_pct)/d(volume_L) — the Jacobian entry the EKF's measurement
    /// model needs for the fuel-sensor observation.
    pub fn d_sensor_pct_d_volume(&self, volume_l: f64) -> f64 {
        let fuel_pct = (volume_l / self.capacity_l * 100.0).clamp(0.0, 100.0);
        let slope_pct_per_pct = match &self.shape {
            TankShape::Saddle => {
                if fuel_pct < SADDLE_LOW_BREAK_PCT {
                    SADDLE_LOW_SLOPE
                } else if fuel_pct > SADDLE_HIGH_BREAK_PCT {
                    SADDLE_HIGH_SLOPE
                } else {
                    SADDLE_MID_SLOPE
                }
            }
            TankShape::Cylinder | TankShape::Rectangular => 1.0,
            TankShape::Custom { curve } => slope_at(curve, fuel_pct),
        };
        slope_pct_per_pct / self.capacity_l * 100.0
    }

    /// Inverse mapping: actual volume given a sensor reading. Used by
    /// operator tooling and tests; the EKF itself only ever goes
    /// volume -> sensor (it corrects volume via the Kalman update, not by
    /// inverting the sensor model).
    pub fn volume_from_sensor_pct(&self, sensor_pct: f64) -> f64 {
        let sensor_pct = sensor_pct.clamp(0.0, 100.0);
        let fuel_pct = match &self.shape {
            TankShape::Saddle => {
                let low_at_break = SADDLE_LOW_BREAK_PCT * SADDLE_LOW_SLOPE;
                if sensor_pct < low_at_break {
                    sensor_pct / SADDLE_LOW_SLOPE
                } else if sensor_pct > SADDLE_HIGH_BREAK_PCT {
                    SADDLE_HIGH_BREAK_PCT + (sensor_pct - SADDLE_HIGH_BREAK_PCT) / SADDLE_HIGH_SLOPE
                } else {
                    sensor_pct / SADDLE_MID_SLOPE
                }
            }
            TankShape::Cylinder | TankShape::Rectangular => sensor_pct,
            TankShape::Custom { curve } => inverse_interpolate_curve(curve, sensor_pct),
        };
        (fuel_pct / 100.0 * self.capacity_l).clamp(0.0, self.capacity_l)
    }
}

fn interpolate_curve(curve: &[(f64, f64)], fuel_pct: f64) -> f64 {
    if curve.is_empty() {
        return fuel_pct;
    }
    if fuel_pct <= curve[0].0 {
        return curve[0].1;
    }
    if fuel_pct >= curve[curve.len() - 1].0 {
        return curve[curve.len() - 1].1;
    }
    for window in curve.windows(2) {
        let (x0, y0) = window[0];
        let (x1, y1) = window[1];
        if fuel_pct >= x0 && fuel_pct <= x1 {
            let t = if (x1 - x0).abs() < f64::EPSILON {
                0.0
            } else {
                (fuel_pct - x0) / (x1 - x0)
            };
            return y0 + t * (y1 - y0);
        }
    }
    fuel_pct
}

fn slope_at(curve: &[(f64, f64)], fuel_pct: f64) -> f64 {
    if curve.len() < 2 {
        return 1.0;
    }
    for window in curve.windows(2) {
        let (x0, y0) = window[0];
        let (x1, y1) = window[1];
        if fuel_pct >= x0 && fuel_pct <= x1 && (x1 - x0).abs() > f64::EPSILON {
            return (y1 - y0) / (x1 - x0);
        }
    }
    1.0
}

fn inverse_interpolate_curve(curve: &[(f64, f64)], sensor_pct: f64) -> f64 {
    if curve.is_empty() {
        return sensor_pct;
    }
    let inverted: Vec<(f64, f64)> = curve.iter().map(|&(a, b)| (b, a)).collect();
    interpolate_curve(&inverted, sensor_pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cylinder_is_linear() {
        let tank = TankSpec::cylinder(400.0);
        assert!((tank.sensor_pct_from_volume(200.0) - 50.0).abs() < 1e-9);
        assert!((tank.d_sensor_pct_d_volume(200.0) - (100.0 / 400.0)).abs() < 1e-9);
    }

    #[test]
    fn saddle_low_region_matches_python_reference() {
        let tank = TankSpec::saddle(100.0);
        // fuel_pct = 10 -> sensor = 9
        let sensor = tank.sensor_pct_from_volume(10.0);
        assert!((sensor - 9.0).abs() < 1e-9);
    }

    #[test]
    fn saddle_high_region_matches_python_reference() {
        let tank = TankSpec::saddle(100.0);
        // fuel_pct = 90 -> sensor = 80 + 10*0.7 = 87
        let sensor = tank.sensor_pct_from_volume(90.0);
        assert!((sensor - 87.0).abs() < 1e-9);
    }

    #[test]
    fn saddle_mid_region_is_linear() {
        let tank = TankSpec::saddle(100.0);
        assert!((tank.sensor_pct_from_volume(50.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn saddle_roundtrip_through_inverse() {
        let tank = TankSpec::saddle(200.0);
        for vol in [10.0, 50.0, 100.0, 150.0, 190.0] {
            let sensor = tank.sensor_pct_from_volume(vol);
            let recovered = tank.volume_from_sensor_pct(sensor);
            assert!(
                (recovered - vol).abs() < 0.5,
                "vol={vol} sensor={sensor} recovered={recovered}"
            );
        }
    }

    #[test]
    fn out_of_bounds_volume_clamps() {
        let tank = TankSpec::cylinder(100.0);
        assert_eq!(tank.sensor_pct_from_volume(-10.0), 0.0);
        assert_eq!(tank.sensor_pct_from_volume(1000.0), 100.0);
    }

    #[test]
    fn custom_curve_interpolates() {
        let tank = TankSpec::new(
            100.0,
            TankShape::Custom {
                curve: vec![(0.0, 0.0), (50.0, 40.0), (100.0, 100.0)],
            },
        );
        let sensor = tank.sensor_pct_from_volume(25.0);
        assert!((sensor - 20.0).abs() < 1e-9);
    }
}
