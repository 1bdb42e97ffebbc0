//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass approach: first walk the raw TOML's key tree and warn on
//! anything not in `known_config_keys()` (typos never break an existing
//! config, they just get logged), then — after normal serde parsing — run
//! `validate_physical_ranges` to reject impossible values before the config
//! is accepted.

use std::collections::HashSet;

use super::Config;

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " — did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `Config`.
///
/// Maintained manually to match the struct hierarchy in `config/mod.rs`.
/// Any new field added there must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        "tank_specs",
        "ekf_tuning",
        "ekf_tuning.q_volume",
        "ekf_tuning.q_rate",
        "ekf_tuning.q_efficiency",
        "ekf_tuning.r_fuel_sensor",
        "ekf_tuning.r_ecu",
        "ekf_tuning.r_fuel_rate",
        "activity_classification",
        "activity_classification.productive_geofences",
        "rate_limits",
        "rate_limits.max_reading_rate_hz",
        "worker_pool_size",
        "per_truck_queue_depth",
        "ckpt_interval_seconds",
        "graceful_shutdown_deadline_seconds",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            // `tank_specs.<truck_id>.*` is operator-defined, not a fixed schema — skip it.
            if prefix == "tank_specs" {
                continue;
            }
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.len();
    let b_len = b.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist <= 3 {
            match best {
                Some((_, best_dist)) if dist >= best_dist => {}
                _ => best = Some((k, dist)),
            }
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
/// Never fails on unknown keys — only warns. Parse errors are surfaced by
/// the subsequent serde deserialization, not here.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    let found = walk_toml_keys(&value, "");
    let mut warnings = Vec::new();

    for key in &found {
        if !known.contains(key.as_str()) {
            let suggestion = suggest_correction(key, &known);
            warnings.push(ValidationWarning {
                field: key.clone(),
                message: format!("Unknown config key '{key}'"),
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed `Config`. Returns fatal errors that
/// must prevent startup — suspicious-but-plausible values are left to
/// operator judgement rather than rejected.
pub fn validate_physical_ranges(config: &Config) -> Vec<String> {
    let mut errors = Vec::new();

    for (truck_id, tank) in &config.tank_specs {
        if tank.capacity_l <= 0.0 {
            errors.push(format!(
                "tank_specs.{truck_id}.capacity_l = {:.1} must be > 0",
                tank.capacity_l
            ));
        }
    }

    let ekf = &config.ekf_tuning;
    if ekf.q_volume <= 0.0 || ekf.q_rate <= 0.0 || ekf.q_efficiency <= 0.0 {
        errors.push("ekf_tuning process-noise terms (q_volume, q_rate, q_efficiency) must all be > 0".to_string());
    }
    if ekf.r_fuel_sensor <= 0.0 || ekf.r_ecu <= 0.0 || ekf.r_fuel_rate <= 0.0 {
        errors.push("ekf_tuning measurement-noise terms (r_fuel_sensor, r_ecu, r_fuel_rate) must all be > 0".to_string());
    }

    if config.rate_limits.max_reading_rate_hz <= 0.0 {
        errors.push(format!(
            "rate_limits.max_reading_rate_hz = {:.2} must be > 0",
            config.rate_limits.max_reading_rate_hz
        ));
    }

    if config.worker_pool_size == 0 {
        errors.push("worker_pool_size must be >= 1".to_string());
    }
    if config.per_truck_queue_depth == 0 {
        errors.push("per_truck_queue_depth must be >= 1".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn levenshtein_one_edit() {
        assert_eq!(levenshtein("workr_pool_size", "worker_pool_size"), 1);
    }

    #[test]
    fn typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys("workr_pool_size = 4\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("worker_pool_size")
        );
    }

    #[test]
    fn all_valid_keys_produce_zero_warnings() {
        let warnings = validate_unknown_keys(
            "worker_pool_size = 8\n[rate_limits]\nmax_reading_rate_hz = 2.0\n",
        );
        assert!(warnings.is_empty(), "expected 0 warnings, got {warnings:?}");
    }

    #[test]
    fn tank_specs_table_is_not_schema_checked() {
        let warnings = validate_unknown_keys(
            "[tank_specs.truck-42]\ncapacity_l = 400.0\n",
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn defaults_pass_physical_range_checks() {
        assert!(validate_physical_ranges(&Config::default()).is_empty());
    }

    #[test]
    fn zero_worker_pool_size_is_an_error() {
        let mut config = Config::default();
        config.worker_pool_size = 0;
        let errors = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("worker_pool_size")));
    }

    #[test]
    fn negative_ekf_noise_is_an_error() {
        let mut config = Config::default();
        config.ekf_tuning.q_volume = -1.0;
        let errors = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("process-noise")));
    }
}
