//! Contract of the lazy-execution engine
//!
//! The core only builds [`Image`] descriptions; evaluation happens inside
//! [`ComputeEngine::reduce_region`], the single blocking call of a request.

use geo::Geometry;
use std::collections::BTreeMap;

use crate::collect::image::Image;
use crate::geo_core::{GridSpec, ProjectionError};

/// Spatial reducer applied per band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Mean,
}

/// Band name to reduced value; `None` when no pixel contributed
pub type BandValues = BTreeMap<String, Option<f64>>;

/// A zonal reduction: reduce every band of `image` over `geometry`
///
/// The geometry is in geographic coordinates; pixels are enumerated on
/// `grid` and a pixel contributes when its center lies inside the geometry
/// and its value is not masked. A point geometry selects the one pixel that
/// contains it.
#[derive(Debug, Clone)]
pub struct ReduceRequest {
    pub image: Image,
    pub geometry: Geometry<f64>,
    pub reducer: Reducer,
    pub grid: GridSpec,
    pub max_pixels: u64,
}

/// Failures reported by an engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown raster collection: {0}")]
    UnknownCollection(String),

    #[error("Band error: {0}")]
    Band(String),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Too many pixels in reduction: {count} > {max}")]
    TooManyPixels { count: u64, max: u64 },

    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    #[error("Engine failure: {0}")]
    Other(String),
}

/// A lazy-execution engine able to reduce image descriptions over regions
pub trait ComputeEngine: Send + Sync {
    fn reduce_region(&self, request: &ReduceRequest) -> Result<BandValues, EngineError>;
}
