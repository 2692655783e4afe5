use geo::{Geometry, Point};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::debug;

use crate::collect::engine::{ComputeEngine, ReduceRequest, Reducer};
use crate::error::{Error, Result};
use crate::geo_core::GridSpec;
use crate::geometric::composite::AnnualCompositeCache;

/// Annual NDVI at one location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NdviSample {
    pub year: i32,
    /// `None` when the year has no capture over the pixel
    pub ndvi: Option<f64>,
}

/// Per-pixel NDVI history over the annual composites
pub struct NdviInspector {
    engine: Arc<dyn ComputeEngine>,
    composites: Arc<AnnualCompositeCache>,
    grid: GridSpec,
}

impl NdviInspector {
    /// `grid` is the grid samples are read on, usually the raster source's native grid
    pub fn new(
        engine: Arc<dyn ComputeEngine>,
        composites: Arc<AnnualCompositeCache>,
        grid: GridSpec,
    ) -> Self {
        NdviInspector {
            engine,
            composites,
            grid,
        }
    }

    /// Mean composite value of the pixel holding `point`, one entry per year
    pub fn ndvi_time_series(
        &self,
        point: Point<f64>,
        years: RangeInclusive<i32>,
    ) -> Result<Vec<NdviSample>> {
        debug!(
            "NDVI time series at ({}, {}) for {:?}",
            point.x(),
            point.y(),
            years
        );
        years
            .map(|year| {
                let request = ReduceRequest {
                    image: self.composites.composite_for_year(year)?,
                    geometry: Geometry::Point(point),
                    reducer: Reducer::Mean,
                    grid: self.grid,
                    max_pixels: 1,
                };
                let values = self.engine.reduce_region(&request).map_err(|e| {
                    Error::upstream(
                        format!("NDVI at ({}, {}) for {}", point.x(), point.y(), year),
                        e,
                    )
                })?;
                Ok(NdviSample {
                    year,
                    ndvi: values.into_values().next().flatten(),
                })
            })
            .collect()
    }
}
