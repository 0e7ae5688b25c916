//! Layout spacing policy.
//!
//! Every constant the layout engine uses lives here so callers can vary the
//! policy per run. Load from TOML with [`LayoutConfig::from_toml_file`] or
//! use [`LayoutConfig::default`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::OnelineError;

/// Spacing policy for the layout engine (all values in pixels).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Y of the topmost tier.
    pub top_margin: f64,
    /// X origin of every tier.
    pub left_margin: f64,
    /// Horizontal pixels per bus length unit.
    pub grid_spacing: f64,
    /// Vertical weight of a branch in a chain.
    pub branch_slot_height: f64,
    /// Vertical weight of a passive element in a chain.
    pub passive_slot_height: f64,
    /// Smallest distance between two adjacent tiers.
    pub min_tier_gap: f64,
    /// Space kept clear above and below a stacked chain.
    pub chain_padding: f64,
    /// Separation between parallel chains on the same bus pair.
    pub parallel_offset: f64,
    /// Height above the tier line for same-tier chains.
    pub same_tier_offset: f64,
    /// Horizontal step between elements of a same-tier chain.
    pub element_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            top_margin: 60.0,
            left_margin: 60.0,
            grid_spacing: 40.0,
            branch_slot_height: 80.0,
            passive_slot_height: 40.0,
            min_tier_gap: 160.0,
            chain_padding: 20.0,
            parallel_offset: 60.0,
            same_tier_offset: 50.0,
            element_spacing: 40.0,
        }
    }
}

impl LayoutConfig {
    /// Load and validate a config from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `OnelineError::Config` if the file cannot be read, the TOML
    /// is invalid, or a value is out of range.
    pub fn from_toml_file(path: &Path) -> Result<Self, OnelineError> {
        let content = fs::read_to_string(path).map_err(|e| {
            OnelineError::Config(format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config from a TOML string. Missing keys keep
    /// their defaults; unknown keys are rejected.
    pub fn from_toml_str(s: &str) -> Result<Self, OnelineError> {
        let config: Self = toml::from_str(s).map_err(|e| OnelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OnelineError> {
        let positive = [
            ("grid_spacing", self.grid_spacing),
            ("branch_slot_height", self.branch_slot_height),
            ("passive_slot_height", self.passive_slot_height),
            ("min_tier_gap", self.min_tier_gap),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(OnelineError::Config(format!(
                    "{field} must be a positive number, got {value}"
                )));
            }
        }

        let non_negative = [
            ("top_margin", self.top_margin),
            ("left_margin", self.left_margin),
            ("chain_padding", self.chain_padding),
            ("parallel_offset", self.parallel_offset),
            ("same_tier_offset", self.same_tier_offset),
            ("element_spacing", self.element_spacing),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(OnelineError::Config(format!(
                    "{field} must be zero or positive, got {value}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(LayoutConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LayoutConfig::from_toml_str("grid_spacing = 25.0\nmin_tier_gap = 200.0\n").unwrap();

        assert_eq!(config.grid_spacing, 25.0);
        assert_eq!(config.min_tier_gap, 200.0);
        assert_eq!(config.top_margin, 60.0);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = LayoutConfig::from_toml_str("gird_spacing = 25.0").unwrap_err();
        assert!(matches!(err, OnelineError::Config(_)));
    }

    #[test]
    fn test_non_positive_rejected() {
        let err = LayoutConfig::from_toml_str("branch_slot_height = 0.0").unwrap_err();
        assert!(err.to_string().contains("branch_slot_height"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "top_margin = 10.0").unwrap();

        let config = LayoutConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.top_margin, 10.0);

        let missing = LayoutConfig::from_toml_file(Path::new("/nonexistent/layout.toml"));
        assert!(missing.is_err());
    }
}
