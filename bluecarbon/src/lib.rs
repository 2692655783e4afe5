//! Change-detection area statistics for Australian blue-carbon habitats
//!
//! Mangrove, seagrass and saltmarsh boundaries are rasterized into masks,
//! annual MODIS NDVI composites are differenced between two years, and
//! habitat, loss and gain areas are summed per region on the GDA94 /
//! Australian Albers equal-area grid. Rasters are lazy [`Image`] graphs
//! evaluated by a [`ComputeEngine`]; [`LocalEngine`] evaluates them over
//! in-memory scenes.

pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod explorer;
pub mod geo_core;
pub mod geometric;

#[cfg(test)]
pub(crate) mod testing;

pub use collect::engine::{BandValues, ComputeEngine, EngineError, ReduceRequest, Reducer};
pub use collect::image::{Image, RasterCollection};
pub use collect::local_engine::{LocalEngine, SceneRaster};
pub use collect::vector::{Feature, FeatureCollection, VectorSource};
pub use config::ExplorerConfig;
pub use error::{Error, Result};
pub use explorer::{Command, Explorer, ExplorerState, Layer, RenderRequest, StatsQuery};
pub use geo_core::{BoundingBox, Crs, GridSpec};
pub use geometric::region::{HabitatDataset, HabitatKind, RegionCatalog, RegionResolver};
pub use geometric::zonal_stats::{HabitatValues, StatsResult, ZonalStatsAggregator};
