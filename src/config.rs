//! Engine configuration.
//!
//! All constants the engine depends on (pixel footprint, stock reference
//! area, sentinel codes, AOI limits) live in [`EngineConfig`]. It is built
//! once, validated, and then passed by reference into every component.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GhgError, Result};

/// Square metres per hectare.
pub const SQM_PER_HA: f64 = 10_000.0;
pub const SQM_TO_HA: f64 = 1.0 / SQM_PER_HA;

/// How class names missing from the classification legend are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegendMode {
    /// Fail on the first class the legend does not know.
    #[default]
    Strict,
    /// Drop unknown classes with a warning.
    Lenient,
}

/// Lon/lat bounding box in WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn germany() -> Self {
        Self::new(5.87, 47.27, 15.04, 55.06)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    pub fn to_rect(&self) -> geo::Rect<f64> {
        geo::Rect::new(
            geo::coord! { x: self.min_lon, y: self.min_lat },
            geo::coord! { x: self.max_lon, y: self.max_lat },
        )
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Linear ground size of one classification pixel in metres.
    pub ground_resolution_m: f64,

    /// Area the stock values are expressed in (one hectare).
    pub stock_reference_area_m2: f64,

    pub no_change_value: u16,

    /// Change code for cells that cannot be attributed. Never a valid change id.
    pub unknown_change_value: u16,

    /// Fill value for unknown cells of the flux raster.
    pub unknown_emissions_value: f64,

    pub legend_mode: LegendMode,

    pub max_aoi_area_km2: f64,

    /// `None` disables the region check.
    pub supported_region: Option<BoundingBox>,

    /// Minimum classification confidence (0.0-1.0) requested from the classifier.
    pub classification_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ground_resolution_m: 10.0,
            stock_reference_area_m2: SQM_PER_HA,
            no_change_value: 0,
            unknown_change_value: u16::MAX,
            unknown_emissions_value: -999.999,
            legend_mode: LegendMode::Strict,
            max_aoi_area_km2: 1000.0,
            supported_region: Some(BoundingBox::germany()),
            classification_threshold: 0.75,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.ground_resolution_m > 0.0) {
            return Err(GhgError::InvalidConfig(format!(
                "ground_resolution_m must be positive, got {}",
                self.ground_resolution_m
            )));
        }
        if !(self.stock_reference_area_m2 > 0.0) {
            return Err(GhgError::InvalidConfig(format!(
                "stock_reference_area_m2 must be positive, got {}",
                self.stock_reference_area_m2
            )));
        }
        if self.no_change_value == self.unknown_change_value {
            return Err(GhgError::InvalidConfig(format!(
                "no_change_value and unknown_change_value must differ (both {})",
                self.no_change_value
            )));
        }
        if !(self.max_aoi_area_km2 > 0.0) {
            return Err(GhgError::InvalidConfig(format!(
                "max_aoi_area_km2 must be positive, got {}",
                self.max_aoi_area_km2
            )));
        }
        if !(0.0..=1.0).contains(&self.classification_threshold) {
            return Err(GhgError::InvalidConfig(format!(
                "classification_threshold must be within 0.0-1.0, got {}",
                self.classification_threshold
            )));
        }
        Ok(())
    }

    /// Ground area of one pixel in square metres.
    pub fn pixel_area(&self) -> f64 {
        self.ground_resolution_m * self.ground_resolution_m
    }

    /// Scale from a per-reference-area quantity to a per-pixel quantity.
    pub fn emission_per_pixel_factor(&self) -> f64 {
        self.pixel_area() / self.stock_reference_area_m2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pixel_area(), 100.0);
        assert_eq!(config.emission_per_pixel_factor(), 0.01);
        assert_ne!(config.no_change_value, config.unknown_change_value);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"ground_resolution_m": 20.0, "legend_mode": "lenient"}"#)
                .unwrap();
        assert_eq!(config.pixel_area(), 400.0);
        assert_eq!(config.legend_mode, LegendMode::Lenient);
        assert_eq!(config.unknown_change_value, u16::MAX);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = EngineConfig::from_json_str(r#"{"no_change_value": 7, "unknown_change_value": 7}"#);
        assert!(matches!(result, Err(GhgError::InvalidConfig(_))));

        let result = EngineConfig::from_json_str(r#"{"ground_resolution_m": 0.0}"#);
        assert!(matches!(result, Err(GhgError::InvalidConfig(_))));
    }
}
