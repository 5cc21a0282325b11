//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Unknown keys only produce warnings so that a typo never stops the
//! simulator; impossible values are returned as errors and make the loader
//! fall back to defaults.

use std::collections::HashSet;

use super::SimConfig;
use crate::types::ControlVariable;

/// A non-fatal config warning (typo, suspicious value).
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
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `SimConfig`.
///
/// Must be kept in step with the structs in `sim_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [cavity]
        "cavity",
        "cavity.resonant_frequency_hz",
        "cavity.cavity_voltage_v",
        "cavity.intrinsic_q",
        "cavity.r_over_q_ohm",
        // [controls]
        "controls",
        "controls.fom",
        "controls.fom.value",
        "controls.fom.min",
        "controls.fom.max",
        "controls.uphonics_range",
        "controls.uphonics_range.value",
        "controls.uphonics_range.min",
        "controls.uphonics_range.max",
        "controls.qe",
        "controls.qe.value",
        "controls.qe.min",
        "controls.qe.max",
        "controls.tuning_range",
        "controls.tuning_range.value",
        "controls.tuning_range.min",
        "controls.tuning_range.max",
        "controls.frt_on",
        "controls.frt_on.value",
        // [pipeline]
        "pipeline",
        "pipeline.results_queue_capacity",
        "pipeline.batch_size",
        "pipeline.window_samples",
        "pipeline.colour_interval_secs",
        "pipeline.wrap_offset_secs",
        "pipeline.sample_delay_ms",
        "pipeline.render_interval_ms",
        "pipeline.detuning_offset",
        // [dataset]
        "dataset",
        "dataset.path",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
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

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by serde
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate control ranges and cavity constants.
///
/// Returns the list of errors; an empty list means the config is usable.
pub fn validate_physical_ranges(config: &SimConfig) -> Vec<String> {
    let mut errors = Vec::new();

    for var in ControlVariable::ALL {
        let Some(s) = config.controls.setting(var) else {
            continue;
        };
        let key = var.name().to_ascii_lowercase();
        if !(s.value.is_finite() && s.min.is_finite() && s.max.is_finite()) {
            errors.push(format!("controls.{key}: values must be finite"));
            continue;
        }
        if s.min >= s.max {
            errors.push(format!(
                "controls.{}: min ({}) must be < max ({})",
                key,
                s.min,
                s.max
            ));
        } else if s.value < s.min || s.value > s.max {
            errors.push(format!(
                "controls.{}: value {} outside range [{}, {}]",
                key,
                s.value,
                s.min,
                s.max
            ));
        }
        if var.is_logarithmic() && s.min <= 0.0 {
            errors.push(format!(
                "controls.{}: logarithmic range must be positive (min = {})",
                key,
                s.min
            ));
        }
    }

    let toggle = config.controls.frt_on.value;
    if toggle != 0.0 && toggle != 1.0 {
        errors.push(format!("controls.frt_on.value must be 0 or 1 (got {toggle})"));
    }

    let c = &config.cavity;
    for (name, value) in [
        ("cavity.resonant_frequency_hz", c.resonant_frequency_hz),
        ("cavity.cavity_voltage_v", c.cavity_voltage_v),
        ("cavity.intrinsic_q", c.intrinsic_q),
        ("cavity.r_over_q_ohm", c.r_over_q_ohm),
    ] {
        if !value.is_finite() || value < 0.0 {
            errors.push(format!("{name} must be a finite value >= 0 (got {value})"));
        }
    }

    errors
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("cavity", "cavity"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("intrinsic_qq", "intrinsic_q"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r"
            [controls.qe]
            value = 1.0e8
        "
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"controls".to_string()));
        assert!(keys.contains(&"controls.qe".to_string()));
        assert!(keys.contains(&"controls.qe.value".to_string()));
    }

    #[test]
    fn test_unknown_key_gets_suggestion() {
        let warnings = validate_unknown_keys("[pipeline]\nbatch_sise = 10\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "pipeline.batch_sise");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("pipeline.batch_size"));
    }

    #[test]
    fn test_known_keys_produce_no_warnings() {
        let text = SimConfig::default().to_toml().unwrap();
        assert!(validate_unknown_keys(&text).is_empty());
    }

    #[test]
    fn test_inverted_range_is_an_error() {
        let mut config = SimConfig::default();
        config.controls.fom.min = 50.0;
        config.controls.fom.max = 10.0;
        let errors = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("controls.fom")));
    }

    #[test]
    fn test_negative_cavity_constant_is_an_error() {
        let mut config = SimConfig::default();
        config.cavity.intrinsic_q = -1.0;
        let errors = validate_physical_ranges(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("intrinsic_q"));
    }
}
