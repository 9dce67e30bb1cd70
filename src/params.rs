//! Parameter metadata for pipeline configuration
//!
//! This module describes the tunable fields of [`ChanConfig`], enabling:
//! - Grid search over structural settings
//! - Parameter documentation
//! - Building a configuration from loosely typed key/value input
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use chanlun::params::Configurable;
//! use chanlun::ChanConfig;
//!
//! for param in ChanConfig::param_meta() {
//!   println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let params = HashMap::from([("min_stroke_gap", 5.0)]);
//! let config = ChanConfig::with_params(&params).unwrap();
//! assert_eq!(config.min_stroke_gap.get(), 5);
//! ```

use std::collections::HashMap;

use crate::{ChanConfig, ChanError, Period, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Period value (positive integer)
  Period,
  /// On/off switch, encoded as 0.0 or 1.0
  Flag,
}

/// Metadata for a single configuration parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "min_stroke_gap")
  pub name: &'static str,
  /// Parameter type (Period or Flag)
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Create a new ParamMeta for a Flag parameter
  pub const fn flag(name: &'static str, default: bool, description: &'static str) -> Self {
    Self {
      name,
      param_type: ParamType::Flag,
      default: if default { 1.0 } else { 0.0 },
      range: (0.0, 1.0, 1.0),
      description,
    }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(ChanError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(ChanError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Flag => {
        if value != 0.0 && value != 1.0 {
          return Err(ChanError::InvalidValue("Flag must be 0 or 1"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// CONFIGURABLE TRAIT
// ============================================================

/// Types that can be built from named numeric parameters
pub trait Configurable: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a value from a HashMap
  ///
  /// Missing parameters use their default values; unknown keys are rejected.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

const CHAN_CONFIG_PARAMS: &[ParamMeta] = &[
  ParamMeta::period(
    "min_stroke_gap",
    4.0,
    (2.0, 10.0, 1.0),
    "Minimum merged-bar distance between the two fractals of a stroke",
  ),
  ParamMeta::period("pivot_max_lines", 999.0, (3.0, 999.0, 12.0), "Maximum member lines per pivot zone"),
  ParamMeta::flag(
    "pivot_include_breaking_line",
    true,
    "Keep the last zone member when it ends outside the core",
  ),
  ParamMeta::period(
    "fractal_confirmation_lag",
    1.0,
    (1.0, 5.0, 1.0),
    "Merged bars required after a fractal's right neighbour",
  ),
];

impl Configurable for ChanConfig {
  fn param_meta() -> &'static [ParamMeta] {
    CHAN_CONFIG_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    for (key, value) in params {
      let meta = CHAN_CONFIG_PARAMS
        .iter()
        .find(|m| m.name == *key)
        .ok_or_else(|| ChanError::InvalidConfig(format!("unknown parameter: {key}")))?;
      meta.validate(*value)?;
    }

    let config = ChanConfig {
      min_stroke_gap: get_period(params, "min_stroke_gap", 4)?,
      pivot_max_lines: get_period(params, "pivot_max_lines", 999)?,
      pivot_include_breaking_line: get_flag(params, "pivot_include_breaking_line", true)?,
      fractal_confirmation_lag: get_period(params, "fractal_confirmation_lag", 1)?,
    };
    config.validate()?;
    Ok(config)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  Period::new(value as usize)
}

/// Helper to get a Flag from params with default fallback
pub fn get_flag(params: &HashMap<&str, f64>, key: &str, default: bool) -> Result<bool> {
  match params.get(key).copied() {
    None => Ok(default),
    Some(v) if v == 0.0 => Ok(false),
    Some(v) if v == 1.0 => Ok(true),
    Some(_) => Err(ChanError::InvalidValue("Flag must be 0 or 1")),
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_period() {
    let meta = ParamMeta::period("test_period", 4.0, (2.0, 10.0, 1.0), "Test period parameter");

    assert_eq!(meta.name, "test_period");
    assert_eq!(meta.param_type, ParamType::Period);
    assert_eq!(meta.default, 4.0);
  }

  #[test]
  fn test_param_meta_flag() {
    let meta = ParamMeta::flag("test_flag", false, "Test flag parameter");

    assert_eq!(meta.param_type, ParamType::Flag);
    assert_eq!(meta.default, 0.0);
    assert_eq!(meta.generate_grid(), vec![0.0, 1.0]);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::period("test", 4.0, (2.0, 6.0, 2.0), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid, vec![2.0, 4.0, 6.0]);
  }

  #[test]
  fn test_validate_period() {
    let meta = ParamMeta::period("test", 4.0, (2.0, 10.0, 1.0), "Test");

    assert!(meta.validate(4.0).is_ok());
    assert!(meta.validate(2.0).is_ok());
    assert!(meta.validate(10.0).is_ok());
    assert!(meta.validate(1.0).is_err());
    assert!(meta.validate(11.0).is_err());
    assert!(meta.validate(4.5).is_err());
  }

  #[test]
  fn test_validate_flag() {
    let meta = ParamMeta::flag("test", true, "Test");

    assert!(meta.validate(0.0).is_ok());
    assert!(meta.validate(1.0).is_ok());
    assert!(meta.validate(0.5).is_err());
  }

  #[test]
  fn test_defaults_are_valid() {
    for meta in ChanConfig::param_meta() {
      assert!(meta.validate(meta.default).is_ok(), "{} default out of range", meta.name);
    }
    let config = ChanConfig::with_params(&HashMap::new()).unwrap();
    assert_eq!(config, ChanConfig::default());
  }

  #[test]
  fn test_with_params_overrides() {
    let params = HashMap::from([
      ("min_stroke_gap", 5.0),
      ("pivot_max_lines", 9.0),
      ("pivot_include_breaking_line", 0.0),
    ]);
    let config = ChanConfig::with_params(&params).unwrap();

    assert_eq!(config.min_stroke_gap.get(), 5);
    assert_eq!(config.pivot_max_lines.get(), 9);
    assert!(!config.pivot_include_breaking_line);
    assert_eq!(config.fractal_confirmation_lag.get(), 1);
  }

  #[test]
  fn test_with_params_rejects_unknown_and_out_of_range() {
    let unknown = HashMap::from([("shadow_ratio", 0.5)]);
    assert!(matches!(ChanConfig::with_params(&unknown), Err(ChanError::InvalidConfig(_))));

    let small = HashMap::from([("min_stroke_gap", 1.0)]);
    assert!(matches!(ChanConfig::with_params(&small), Err(ChanError::OutOfRange { .. })));
  }

  #[test]
  fn test_get_period_helper() {
    let params = HashMap::from([("key1", 20.0)]);

    assert_eq!(get_period(&params, "key1", 14).unwrap().get(), 20);
    assert_eq!(get_period(&params, "key2", 14).unwrap().get(), 14);
  }

  #[test]
  fn test_get_flag_helper() {
    let params = HashMap::from([("on", 1.0), ("off", 0.0), ("bad", 2.0)]);

    assert!(get_flag(&params, "on", false).unwrap());
    assert!(!get_flag(&params, "off", true).unwrap());
    assert!(get_flag(&params, "missing", true).unwrap());
    assert!(get_flag(&params, "bad", true).is_err());
  }
}
