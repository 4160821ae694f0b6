use anyhow::Context;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{FitError, Result};

/// Which fitted attributes the refined path inherits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitScope {
    Radii,
    Midpoints,
    RadiiAndMidpoints,
}

impl FitScope {
    pub fn fits_radii(self) -> bool {
        matches!(self, FitScope::Radii | FitScope::RadiiAndMidpoints)
    }

    pub fn fits_midpoints(self) -> bool {
        matches!(self, FitScope::Midpoints | FitScope::RadiiAndMidpoints)
    }
}

impl fmt::Display for FitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                FitScope::Radii => "radii",
                FitScope::Midpoints => "midpoint refinement",
                FitScope::RadiiAndMidpoints => "radii and midpoint refinement",
            }
        )
    }
}

impl FromStr for FitScope {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "radii" => Ok(FitScope::Radii),
            "midpoints" => Ok(FitScope::Midpoints),
            "radii_and_midpoints" | "both" => Ok(FitScope::RadiiAndMidpoints),
            other => Err(FitError::InvalidConfig(format!(
                "unknown fit scope '{}', expected radii, midpoints or radii_and_midpoints",
                other
            ))),
        }
    }
}

/// Numeric flags: 1 = radii, 2 = midpoints, 4 = both.
impl TryFrom<i32> for FitScope {
    type Error = FitError;

    fn try_from(flag: i32) -> Result<Self> {
        match flag {
            1 => Ok(FitScope::Radii),
            2 => Ok(FitScope::Midpoints),
            4 => Ok(FitScope::RadiiAndMidpoints),
            other => Err(FitError::InvalidConfig(format!(
                "invalid scope flag {}, only 1 (radii), 2 (midpoints) or 4 (both) allowed",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitConfig {
    /// Side length, in grid cells, of each cross-section.
    pub max_radius: usize,
    pub scope: FitScope,
    /// Nodes taken on each side when differencing the tangent.
    pub tangent_half_window: usize,
    /// Nodes taken on each side for the local mode radius.
    pub mode_half_window: usize,
    /// Longest tolerated run of discarded nodes.
    pub max_gap: usize,
    pub keep_cross_sections: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_radius: 40,
            scope: FitScope::RadiiAndMidpoints,
            tangent_half_window: 4,
            mode_half_window: 4,
            max_gap: 2,
            keep_cross_sections: false,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_radius == 0 {
            return Err(FitError::InvalidConfig("max_radius must be positive".into()));
        }
        if self.tangent_half_window == 0 {
            return Err(FitError::InvalidConfig(
                "tangent_half_window must be at least 1".into(),
            ));
        }
        if self.max_gap == 0 {
            return Err(FitError::InvalidConfig("max_gap must be at least 1".into()));
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: FitConfig = toml::from_str(s).context("Failed to parse fit configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }
}
