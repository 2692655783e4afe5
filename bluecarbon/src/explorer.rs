//! Explorer application state
//!
//! The explorer is driven by discrete [`Command`]s. Handling a command never
//! mutates anything: it returns the next [`ExplorerState`] plus a
//! [`RenderRequest`] describing what a presentation layer should draw and
//! which statistics to show.

use anyhow::{Context, Result as AnyResult};
use geo::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::collect::engine::ComputeEngine;
use crate::collect::global_variables::ALL_REGIONS;
use crate::collect::image::Image;
use crate::collect::vector::FeatureCollection;
use crate::config::ExplorerConfig;
use crate::error::{Error, Result};
use crate::geometric::change::ChangeDetector;
use crate::geometric::composite::AnnualCompositeCache;
use crate::geometric::equal_area::EqualAreaProjector;
use crate::geometric::habitat_mask::HabitatMaskBuilder;
use crate::geometric::region::{
    is_all_regions, HabitatDataset, HabitatKind, RegionCatalog, RegionResolver,
};
use crate::geometric::time_series::{NdviInspector, NdviSample};
use crate::geometric::zonal_stats::{StatsResult, ZonalStatsAggregator};

/// Toggleable map layers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Ndvi,
    Mangrove,
    Seagrass,
    Saltmarsh,
    RegionOutline,
}

impl Layer {
    fn habitat(kind: HabitatKind) -> Layer {
        match kind {
            HabitatKind::Mangrove => Layer::Mangrove,
            HabitatKind::Seagrass => Layer::Seagrass,
            HabitatKind::Saltmarsh => Layer::Saltmarsh,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectRegion(String),
    SelectYear(i32),
    ToggleLayer(Layer, bool),
}

/// Parameters of a statistics query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsQuery {
    pub region: String,
    pub baseline_year: i32,
    pub comparison_year: i32,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerState {
    pub region: String,
    pub year: i32,
    pub visible: BTreeSet<Layer>,
}

/// What to draw after a command
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub year: i32,
    pub region: String,
    /// Visible layers, bottom to top
    pub layers: Vec<Layer>,
    pub ndvi: Image,
    /// Habitat features of the selected region
    pub habitats: Vec<(HabitatKind, Arc<FeatureCollection>)>,
    /// Boundary to outline when a single region is selected
    pub selected_outline: Option<Arc<FeatureCollection>>,
    pub stats: StatsQuery,
}

/// Assembled explorer services over one engine
pub struct Explorer {
    config: ExplorerConfig,
    datasets: Vec<HabitatDataset>,
    catalog: RegionCatalog,
    composites: Arc<AnnualCompositeCache>,
    aggregator: ZonalStatsAggregator,
    inspector: NdviInspector,
}

impl Explorer {
    pub fn new(
        config: ExplorerConfig,
        engine: Arc<dyn ComputeEngine>,
        mangroves: FeatureCollection,
        seagrasses: FeatureCollection,
        saltmarshes: FeatureCollection,
        boundaries: FeatureCollection,
    ) -> Result<Self> {
        config.validate()?;
        let candidates = &config.region_field_candidates;
        let mangrove = HabitatDataset::new(HabitatKind::Mangrove, mangroves, candidates)?;
        let seagrass = HabitatDataset::new(HabitatKind::Seagrass, seagrasses, candidates)?;
        let saltmarsh = HabitatDataset::new(HabitatKind::Saltmarsh, saltmarshes, candidates)?;

        let builder = HabitatMaskBuilder::new(config.native_grid);
        let masks = builder.build_all(&mangrove, &seagrass, &saltmarsh);
        let boundaries = Arc::new(boundaries);
        let national_mask = builder.rasterize(Arc::clone(&boundaries));

        let composites = Arc::new(AnnualCompositeCache::new(
            config.ndvi_collection.clone(),
            config.ndvi_band.clone(),
            config.ndvi_scale_factor,
            national_mask,
        ));
        let projector = EqualAreaProjector::new(config.equal_area_grid)?;
        let detector = ChangeDetector::new(
            Arc::clone(&composites),
            projector.clone(),
            masks.union.clone(),
        );
        let resolver = RegionResolver::new(boundaries, config.boundary_name_field.clone());

        let datasets = vec![mangrove, seagrass, saltmarsh];
        let catalog = RegionCatalog::build(&datasets);
        info!("Region catalog: {:?}", catalog.entries());

        let aggregator = ZonalStatsAggregator::new(
            Arc::clone(&engine),
            projector,
            masks,
            detector,
            resolver,
            config.max_pixels,
        );
        let inspector = NdviInspector::new(engine, Arc::clone(&composites), config.native_grid);

        Ok(Explorer {
            config,
            datasets,
            catalog,
            composites,
            aggregator,
            inspector,
        })
    }

    /// Build from configured GeoJSON paths
    pub fn from_config(config: ExplorerConfig, engine: Arc<dyn ComputeEngine>) -> AnyResult<Self> {
        let paths = config.datasets.clone();
        let load = |name: &str, path: Option<&Path>| -> AnyResult<FeatureCollection> {
            let path = path.with_context(|| format!("No path configured for {}", name))?;
            FeatureCollection::load(name, path)
        };
        let mangroves = load("mangroves", paths.mangroves.as_deref())?;
        let seagrasses = load("seagrasses", paths.seagrasses.as_deref())?;
        let saltmarshes = load("saltmarshes", paths.saltmarshes.as_deref())?;
        let boundaries = load("boundaries", paths.boundaries.as_deref())?;
        let explorer = Explorer::new(
            config,
            engine,
            mangroves,
            seagrasses,
            saltmarshes,
            boundaries,
        )
        .context("Failed to assemble explorer")?;
        Ok(explorer)
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    /// All regions, last display year, only the region outline shown
    pub fn initial_state(&self) -> ExplorerState {
        let year = self
            .config
            .display_years
            .last()
            .copied()
            .unwrap_or(self.config.last_year);
        ExplorerState {
            region: ALL_REGIONS.to_string(),
            year,
            visible: BTreeSet::from([Layer::RegionOutline]),
        }
    }

    pub fn handle(
        &self,
        state: &ExplorerState,
        command: Command,
    ) -> Result<(ExplorerState, RenderRequest)> {
        debug!("Handling {:?}", command);
        let mut next = state.clone();
        match command {
            Command::SelectRegion(selector) => {
                if !self.catalog.contains(&selector) {
                    return Err(Error::InvalidParameter {
                        name: "region",
                        value: selector,
                        reason: "not in the region catalog".to_string(),
                    });
                }
                next.region = selector;
            }
            Command::SelectYear(year) => {
                if !self.config.contains_year(year) {
                    return Err(Error::InvalidParameter {
                        name: "year",
                        value: year.to_string(),
                        reason: format!(
                            "outside {}..={}",
                            self.config.first_year, self.config.last_year
                        ),
                    });
                }
                next.year = year;
            }
            Command::ToggleLayer(layer, shown) => {
                if shown {
                    next.visible.insert(layer);
                } else {
                    next.visible.remove(&layer);
                }
            }
        }
        let render = self.render(&next)?;
        Ok((next, render))
    }

    /// Render request for a state
    pub fn render(&self, state: &ExplorerState) -> Result<RenderRequest> {
        let habitats = self
            .datasets
            .iter()
            .filter(|d| state.visible.contains(&Layer::habitat(d.kind)))
            .map(|d| (d.kind, d.filter_region(&state.region)))
            .collect();

        let selected_outline = if is_all_regions(&state.region) {
            None
        } else {
            Some(Arc::new(
                self.aggregator.resolver().region_boundaries(&state.region),
            ))
        };

        Ok(RenderRequest {
            year: state.year,
            region: state.region.clone(),
            layers: state.visible.iter().copied().collect(),
            ndvi: self.composites.composite_for_year(state.year)?,
            habitats,
            selected_outline,
            stats: StatsQuery {
                region: state.region.clone(),
                baseline_year: self.config.baseline_year,
                comparison_year: self.config.comparison_year,
                threshold: self.config.delta_threshold,
            },
        })
    }

    pub fn stats(&self, query: &StatsQuery) -> Result<StatsResult> {
        self.aggregator.compute_stats_for_selector(
            &query.region,
            query.baseline_year,
            query.comparison_year,
            query.threshold,
        )
    }

    /// NDVI history of the clicked pixel over the configured years
    pub fn inspect(&self, lon: f64, lat: f64) -> Result<Vec<NdviSample>> {
        self.inspector.ndvi_time_series(
            Point::new(lon, lat),
            self.config.first_year..=self.config.last_year,
        )
    }
}
