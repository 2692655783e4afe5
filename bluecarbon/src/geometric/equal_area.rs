//! Equal-area grid projection
//!
//! Area sums are only meaningful when every layer is sampled on the same
//! equal-area grid. [`EqualAreaProjector`] is the single place layers get
//! that grid, and [`EqualAreaLayer`] carries the grid so consumers can check
//! they are not mixing grids.

use tracing::debug;

use crate::collect::image::Image;
use crate::commons::basic_functions::{m2_to_ha, M2_PER_HA};
use crate::error::{Error, Result};
use crate::geo_core::GridSpec;

/// A raster pinned to an equal-area grid
#[derive(Debug, Clone)]
pub struct EqualAreaLayer {
    pub image: Image,
    pub grid: GridSpec,
}

impl EqualAreaLayer {
    /// Fails with `GridMismatch` unless the layer is on `expected`
    pub fn ensure_grid(&self, expected: GridSpec) -> Result<()> {
        if self.grid == expected {
            Ok(())
        } else {
            Err(Error::GridMismatch {
                expected,
                actual: self.grid,
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct EqualAreaProjector {
    grid: GridSpec,
    pixel_area_ha: EqualAreaLayer,
}

impl EqualAreaProjector {
    /// Projector for `grid`; the grid CRS must not be geographic
    pub fn new(grid: GridSpec) -> Result<Self> {
        if grid.crs.is_geographic() || grid.scale.is_nan() || grid.scale <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "equal_area_grid",
                value: grid.to_string(),
                reason: "needs a projected CRS and a positive scale".to_string(),
            });
        }
        Ok(EqualAreaProjector::on_grid(grid))
    }

    fn on_grid(grid: GridSpec) -> Self {
        debug!(
            "Equal-area grid {} ({} ha per pixel)",
            grid,
            m2_to_ha(grid.scale * grid.scale)
        );
        let pixel_area_ha = EqualAreaLayer {
            image: Image::pixel_area().reproject(grid).divide(M2_PER_HA),
            grid,
        };
        EqualAreaProjector {
            grid,
            pixel_area_ha,
        }
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    pub fn to_equal_area(&self, raster: &Image) -> EqualAreaLayer {
        EqualAreaLayer {
            image: raster.reproject(self.grid),
            grid: self.grid,
        }
    }

    /// Hectares per pixel, built once per projector
    pub fn pixel_area_ha(&self) -> &EqualAreaLayer {
        &self.pixel_area_ha
    }
}
