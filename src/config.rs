use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AnalysisError;

/// Processing configuration for the analysis pipeline.
///
/// All values are fixed at pipeline construction; the components hold no
/// other state, so a constructed pipeline is freely shareable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Grid cell size in millimeters. Must be in `(0, 10]`.
    pub grid_size_mm: f64,
    /// Minimum plausible seed area in mm².
    pub min_seed_area_mm2: f64,
    /// Maximum plausible seed area in mm².
    pub max_seed_area_mm2: f64,
    /// Area above which a blob is treated as multiple touching seeds.
    pub max_single_seed_area_mm2: f64,
    /// Fitted major-axis length above which a blob is treated as multiple seeds.
    pub max_seed_length_mm: f64,
    /// Percentile threshold for counting "large" seeds.
    pub large_percentile: f64,
    /// Percentile threshold for counting "small" seeds.
    pub small_percentile: f64,
    /// Maximum depth when splitting clusters of touching seeds.
    pub max_split_depth: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            grid_size_mm: 1.0,
            min_seed_area_mm2: 0.5,
            max_seed_area_mm2: 100.0,
            max_single_seed_area_mm2: 12.0,
            max_seed_length_mm: 6.0,
            large_percentile: 75.0,
            small_percentile: 25.0,
            max_split_depth: 8,
        }
    }
}

impl ProcessingConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: ProcessingConfig = toml_edit::de::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml_edit::ser::to_string_pretty(self)
            .context("Failed to serialize configuration to TOML")?;

        std::fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Check value ranges. Violations are caller contract errors, not
    /// recoverable analysis failures.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.grid_size_mm > 0.0 && self.grid_size_mm <= 10.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "grid_size_mm must be in (0, 10], got {}",
                self.grid_size_mm
            )));
        }
        if self.min_seed_area_mm2 <= 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "min_seed_area_mm2 must be positive, got {}",
                self.min_seed_area_mm2
            )));
        }
        if self.max_seed_area_mm2 <= self.min_seed_area_mm2 {
            return Err(AnalysisError::InvalidConfig(format!(
                "max_seed_area_mm2 ({}) must exceed min_seed_area_mm2 ({})",
                self.max_seed_area_mm2, self.min_seed_area_mm2
            )));
        }
        if self.max_single_seed_area_mm2 <= 0.0 || self.max_seed_length_mm <= 0.0 {
            return Err(AnalysisError::InvalidConfig(
                "single-seed area and length bounds must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.large_percentile)
            || !(0.0..=100.0).contains(&self.small_percentile)
        {
            return Err(AnalysisError::InvalidConfig(
                "percentiles must be in [0, 100]".to_string(),
            ));
        }
        if self.max_split_depth == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_split_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
