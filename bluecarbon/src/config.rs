//! Explorer configuration
//!
//! Every field has a default reproducing the published explorer, so a
//! configuration file only needs the values it overrides.

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::collect::global_variables::{
    selectable_years, BOUNDARY_NAME_FIELD, DEFAULT_BASELINE_YEAR, DEFAULT_COMPARISON_YEAR,
    DEFAULT_DELTA_THRESHOLD, DEFAULT_MAX_PIXELS, FIRST_YEAR, LAST_YEAR, NDVI_BAND,
    NDVI_COLLECTION, NDVI_SCALE_FACTOR, REGION_FIELD_CANDIDATES,
};
use crate::error::{Error, Result};
use crate::geo_core::GridSpec;

/// Locations of the GeoJSON inputs; unset entries are supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetPaths {
    pub mangroves: Option<PathBuf>,
    pub seagrasses: Option<PathBuf>,
    pub saltmarshes: Option<PathBuf>,
    /// Level-1 administrative boundaries carrying the region name attribute
    pub boundaries: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Raster collection holding the vegetation index captures
    pub ndvi_collection: String,
    pub ndvi_band: String,
    /// Multiplier turning stored values into NDVI
    pub ndvi_scale_factor: f64,

    /// Grid habitat boundaries are rasterized on (native grid of the raster source)
    pub native_grid: GridSpec,
    /// Grid every area computation runs on
    pub equal_area_grid: GridSpec,

    pub first_year: i32,
    pub last_year: i32,
    pub baseline_year: i32,
    pub comparison_year: i32,
    /// Absolute NDVI change separating stable pixels from loss/gain
    pub delta_threshold: f64,
    /// Years offered by the year selector
    pub display_years: Vec<i32>,

    /// Attribute names checked, in order, for the state of a habitat feature
    pub region_field_candidates: Vec<String>,
    pub boundary_name_field: String,

    pub max_pixels: u64,

    pub datasets: DatasetPaths,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            ndvi_collection: NDVI_COLLECTION.to_string(),
            ndvi_band: NDVI_BAND.to_string(),
            ndvi_scale_factor: NDVI_SCALE_FACTOR,
            native_grid: GridSpec::modis_250m(),
            equal_area_grid: GridSpec::australian_albers_250m(),
            first_year: FIRST_YEAR,
            last_year: LAST_YEAR,
            baseline_year: DEFAULT_BASELINE_YEAR,
            comparison_year: DEFAULT_COMPARISON_YEAR,
            delta_threshold: DEFAULT_DELTA_THRESHOLD,
            display_years: selectable_years(),
            region_field_candidates: REGION_FIELD_CANDIDATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            boundary_name_field: BOUNDARY_NAME_FIELD.to_string(),
            max_pixels: DEFAULT_MAX_PIXELS,
            datasets: DatasetPaths::default(),
        }
    }
}

impl ExplorerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ExplorerConfig =
            serde_json::from_str(text).map_err(|e| Error::Configuration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
        let config = ExplorerConfig::from_json_str(&text)
            .with_context(|| format!("Invalid configuration file: {:?}", path))?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Check ranges and cross-field consistency
    pub fn validate(&self) -> Result<()> {
        if self.first_year > self.last_year {
            return Err(Error::Configuration {
                message: format!(
                    "first_year {} is after last_year {}",
                    self.first_year, self.last_year
                ),
            });
        }
        self.check_year("baseline_year", self.baseline_year)?;
        self.check_year("comparison_year", self.comparison_year)?;
        for &year in &self.display_years {
            self.check_year("display_years", year)?;
        }

        for (name, grid) in [
            ("native_grid", &self.native_grid),
            ("equal_area_grid", &self.equal_area_grid),
        ] {
            if !(grid.scale.is_finite() && grid.scale > 0.0) {
                return Err(Error::InvalidParameter {
                    name,
                    value: grid.to_string(),
                    reason: "scale must be positive".to_string(),
                });
            }
        }
        if self.equal_area_grid.crs.is_geographic() {
            return Err(Error::InvalidParameter {
                name: "equal_area_grid",
                value: self.equal_area_grid.to_string(),
                reason: "a geographic CRS is not equal-area".to_string(),
            });
        }

        if !self.delta_threshold.is_finite() {
            return Err(Error::InvalidParameter {
                name: "delta_threshold",
                value: self.delta_threshold.to_string(),
                reason: "must be finite".to_string(),
            });
        }
        if self.max_pixels == 0 {
            return Err(Error::InvalidParameter {
                name: "max_pixels",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Whether `year` lies in the configured range
    pub fn contains_year(&self, year: i32) -> bool {
        (self.first_year..=self.last_year).contains(&year)
    }

    fn check_year(&self, name: &'static str, year: i32) -> Result<()> {
        if self.contains_year(year) {
            Ok(())
        } else {
            Err(Error::InvalidParameter {
                name,
                value: year.to_string(),
                reason: format!("outside {}..={}", self.first_year, self.last_year),
            })
        }
    }
}
