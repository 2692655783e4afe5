//! Zonal area statistics
//!
//! Twelve hectare bands are summed in one reduction: habitat area, loss area
//! and gain area for each habitat and their union. Every band is a pixel
//! area layer masked by a habitat mask and optionally by a change flag, so
//! all of them must share the projector's equal-area grid.

use geo::{BooleanOps, BoundingRect, Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::collect::engine::{BandValues, ComputeEngine, ReduceRequest, Reducer};
use crate::collect::image::Image;
use crate::commons::basic_functions::{ha_to_km2, percent_of};
use crate::error::{Error, Result};
use crate::geometric::change::ChangeDetector;
use crate::geometric::equal_area::{EqualAreaLayer, EqualAreaProjector};
use crate::geometric::habitat_mask::HabitatMasks;
use crate::geometric::region::{HabitatKind, RegionResolver};

/// One value per habitat plus their union; `None` when no pixel contributed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HabitatValues {
    pub mangrove: Option<f64>,
    pub seagrass: Option<f64>,
    pub saltmarsh: Option<f64>,
    pub all: Option<f64>,
}

impl HabitatValues {
    pub fn get(&self, kind: HabitatKind) -> Option<f64> {
        match kind {
            HabitatKind::Mangrove => self.mangrove,
            HabitatKind::Seagrass => self.seagrass,
            HabitatKind::Saltmarsh => self.saltmarsh,
        }
    }

    pub fn map<F>(&self, f: F) -> HabitatValues
    where
        F: Fn(f64) -> f64,
    {
        HabitatValues {
            mangrove: self.mangrove.map(&f),
            seagrass: self.seagrass.map(&f),
            saltmarsh: self.saltmarsh.map(&f),
            all: self.all.map(&f),
        }
    }

    /// Field-wise percentage of `self` in `whole`
    pub fn percent_of(&self, whole: &HabitatValues) -> HabitatValues {
        HabitatValues {
            mangrove: percent_of(self.mangrove, whole.mangrove),
            seagrass: percent_of(self.seagrass, whole.seagrass),
            saltmarsh: percent_of(self.saltmarsh, whole.saltmarsh),
            all: percent_of(self.all, whole.all),
        }
    }

    fn from_bands(values: &BandValues, prefix: &str) -> HabitatValues {
        let band = |code: &str| values.get(&band_name(prefix, code)).copied().flatten();
        HabitatValues {
            mangrove: band(HabitatKind::Mangrove.code()),
            seagrass: band(HabitatKind::Seagrass.code()),
            saltmarsh: band(HabitatKind::Saltmarsh.code()),
            all: band(ALL_CODE),
        }
    }
}

/// Habitat, loss and gain areas in hectares
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub areas: HabitatValues,
    pub loss: HabitatValues,
    pub gain: HabitatValues,
}

impl StatsResult {
    pub fn in_km2(&self) -> StatsResult {
        StatsResult {
            areas: self.areas.map(ha_to_km2),
            loss: self.loss.map(ha_to_km2),
            gain: self.gain.map(ha_to_km2),
        }
    }

    pub fn loss_percent(&self) -> HabitatValues {
        self.loss.percent_of(&self.areas)
    }

    pub fn gain_percent(&self) -> HabitatValues {
        self.gain.percent_of(&self.areas)
    }
}

const ALL_CODE: &str = "all";
const AREA_PREFIX: &str = "ha";
const LOSS_PREFIX: &str = "loss";
const GAIN_PREFIX: &str = "gain";

fn band_name(prefix: &str, code: &str) -> String {
    format!("{}_{}", prefix, code)
}

pub struct ZonalStatsAggregator {
    engine: Arc<dyn ComputeEngine>,
    projector: EqualAreaProjector,
    masks: HabitatMasks,
    detector: ChangeDetector,
    resolver: RegionResolver,
    max_pixels: u64,
}

impl ZonalStatsAggregator {
    pub fn new(
        engine: Arc<dyn ComputeEngine>,
        projector: EqualAreaProjector,
        masks: HabitatMasks,
        detector: ChangeDetector,
        resolver: RegionResolver,
        max_pixels: u64,
    ) -> Self {
        ZonalStatsAggregator {
            engine,
            projector,
            masks,
            detector,
            resolver,
            max_pixels,
        }
    }

    pub fn resolver(&self) -> &RegionResolver {
        &self.resolver
    }

    /// Resolve a region selector, then compute its statistics
    pub fn compute_stats_for_selector(
        &self,
        selector: &str,
        baseline_year: i32,
        comparison_year: i32,
        threshold_abs: f64,
    ) -> Result<StatsResult> {
        let region = self.resolver.canonical_region_geometry(selector)?;
        self.reduce_stats(
            &region,
            format!("region {}", selector.trim()),
            baseline_year,
            comparison_year,
            threshold_abs,
        )
    }

    /// Hectare sums over `region` on the equal-area grid
    ///
    /// The region is first clipped to the habitat extent; a region that
    /// misses every habitat gives an all-`None` result without a reduction.
    pub fn compute_stats(
        &self,
        region: &MultiPolygon<f64>,
        baseline_year: i32,
        comparison_year: i32,
        threshold_abs: f64,
    ) -> Result<StatsResult> {
        let label = match region.bounding_rect() {
            Some(rect) => format!(
                "region bbox [{}, {}, {}, {}]",
                rect.min().x,
                rect.min().y,
                rect.max().x,
                rect.max().y
            ),
            None => "region bbox []".to_string(),
        };
        self.reduce_stats(
            region,
            label,
            baseline_year,
            comparison_year,
            threshold_abs,
        )
    }

    fn reduce_stats(
        &self,
        region: &MultiPolygon<f64>,
        region_label: String,
        baseline_year: i32,
        comparison_year: i32,
        threshold_abs: f64,
    ) -> Result<StatsResult> {
        let grid = self.projector.grid();
        let pixel_area = self.projector.pixel_area_ha();
        let change = self
            .detector
            .detect_change(baseline_year, comparison_year, threshold_abs)?;

        let mut habitat_layers: Vec<(&str, EqualAreaLayer)> = Vec::with_capacity(4);
        for kind in HabitatKind::ALL {
            let mask = &self.masks.get(kind).image;
            habitat_layers.push((kind.code(), self.projector.to_equal_area(mask)));
        }
        habitat_layers.push((ALL_CODE, self.projector.to_equal_area(&self.masks.union)));

        pixel_area.ensure_grid(grid)?;
        change.loss.ensure_grid(grid)?;
        change.gain.ensure_grid(grid)?;
        for (_, layer) in &habitat_layers {
            layer.ensure_grid(grid)?;
        }

        let mut area_bands = Vec::with_capacity(4);
        let mut loss_bands = Vec::with_capacity(4);
        let mut gain_bands = Vec::with_capacity(4);
        for (code, layer) in &habitat_layers {
            let area = pixel_area.image.update_mask(&layer.image);
            loss_bands.push(
                area.update_mask(&change.loss.image)
                    .rename([band_name(LOSS_PREFIX, code)]),
            );
            gain_bands.push(
                area.update_mask(&change.gain.image)
                    .rename([band_name(GAIN_PREFIX, code)]),
            );
            area_bands.push(area.rename([band_name(AREA_PREFIX, code)]));
        }
        let bands: Vec<Image> = area_bands
            .into_iter()
            .chain(loss_bands)
            .chain(gain_bands)
            .collect();

        let clipped = match &self.masks.extent {
            Some(extent) => region.intersection(&MultiPolygon::new(vec![extent.to_polygon()])),
            None => MultiPolygon::new(Vec::new()),
        };
        if clipped.0.is_empty() {
            info!("Region does not intersect any habitat; no statistics");
            return Ok(StatsResult::default());
        }

        let request = ReduceRequest {
            image: Image::cat(bands),
            geometry: Geometry::MultiPolygon(clipped),
            reducer: Reducer::Sum,
            grid,
            max_pixels: self.max_pixels,
        };
        let description = format!(
            "area statistics ({}, baseline {}, comparison {}, threshold {}, grid {})",
            region_label, baseline_year, comparison_year, threshold_abs, grid
        );
        debug!("Reducing {}", description);
        let values = self
            .engine
            .reduce_region(&request)
            .map_err(|e| Error::upstream(description, e))?;

        Ok(StatsResult {
            areas: HabitatValues::from_bands(&values, AREA_PREFIX),
            loss: HabitatValues::from_bands(&values, LOSS_PREFIX),
            gain: HabitatValues::from_bands(&values, GAIN_PREFIX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::engine::EngineError;
    use crate::collect::global_variables::ALL_REGIONS;
    use crate::collect::local_engine::LocalEngine;
    use crate::collect::vector::FeatureCollection;
    use crate::geo_core::GridSpec;
    use crate::geometric::composite::AnnualCompositeCache;
    use crate::geometric::habitat_mask::HabitatMaskBuilder;
    use crate::geometric::region::HabitatDataset;
    use crate::testing::{
        boundaries_arc, candidates, engine, equal_area_grid, mangroves, rect, saltmarshes,
        seagrasses, TEST_COLLECTION,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps the local engine and counts reductions
    struct CountingEngine {
        inner: LocalEngine,
        calls: AtomicUsize,
    }

    impl ComputeEngine for CountingEngine {
        fn reduce_region(
            &self,
            request: &ReduceRequest,
        ) -> std::result::Result<BandValues, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.reduce_region(request)
        }
    }

    struct Fixture {
        engine: Arc<CountingEngine>,
        aggregator: ZonalStatsAggregator,
    }

    fn fixture_with(
        seagrass: FeatureCollection,
        max_pixels: u64,
        change_grid: GridSpec,
    ) -> Fixture {
        let dataset = |kind, fc| HabitatDataset::new(kind, fc, &candidates()).unwrap();
        let m = dataset(HabitatKind::Mangrove, mangroves());
        let sg = dataset(HabitatKind::Seagrass, seagrass);
        let sm = dataset(HabitatKind::Saltmarsh, saltmarshes());

        let builder = HabitatMaskBuilder::new(GridSpec::modis_250m());
        let masks = builder.build_all(&m, &sg, &sm);
        let cache = AnnualCompositeCache::new(
            TEST_COLLECTION,
            "NDVI",
            0.0001,
            builder.rasterize(boundaries_arc()),
        );
        let projector = EqualAreaProjector::new(equal_area_grid()).unwrap();
        let detector = ChangeDetector::new(
            Arc::new(cache),
            EqualAreaProjector::new(change_grid).unwrap(),
            masks.union.clone(),
        );

        let engine = Arc::new(CountingEngine {
            inner: engine(),
            calls: AtomicUsize::new(0),
        });
        let aggregator = ZonalStatsAggregator::new(
            engine.clone(),
            projector,
            masks,
            detector,
            RegionResolver::new(boundaries_arc(), "ADM1_NAME"),
            max_pixels,
        );
        Fixture { engine, aggregator }
    }

    fn fixture() -> Fixture {
        fixture_with(seagrasses(), 1_000_000, equal_area_grid())
    }

    fn stats(f: &Fixture, selector: &str, base: i32, comp: i32, t: f64) -> StatsResult {
        f.aggregator
            .compute_stats_for_selector(selector, base, comp, t)
            .unwrap()
    }

    #[test]
    fn test_all_regions_2005_2024() {
        let f = fixture();
        let s = stats(&f, ALL_REGIONS, 2005, 2024, 0.05);

        for values in [s.areas, s.loss, s.gain] {
            for v in [values.mangrove, values.seagrass, values.saltmarsh, values.all] {
                assert!(v.map_or(true, |v| v >= 0.0));
            }
        }

        let area_all = s.areas.all.unwrap();
        for kind in HabitatKind::ALL {
            let area = s.areas.get(kind).unwrap();
            assert!(area_all >= area);
            assert!(s.loss.get(kind).unwrap_or(0.0) <= area);
            assert!(s.gain.get(kind).unwrap_or(0.0) <= area);
        }
        assert!(s.loss.all.unwrap_or(0.0) + s.gain.all.unwrap_or(0.0) <= area_all);

        // mangroves sit west of the change edge and lost NDVI
        let area_m = s.areas.mangrove.unwrap();
        assert!((area_m - 10_350.0).abs() / 10_350.0 < 0.1, "mangrove area {}", area_m);
        assert!(s.loss.mangrove.unwrap() >= 0.8 * area_m);
        // seagrasses sit east of it and gained
        let area_sg = s.areas.seagrass.unwrap();
        assert!(s.gain.seagrass.unwrap() >= 0.8 * area_sg);
        assert_eq!(f.engine.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_alias_and_full_name_give_same_stats() {
        let f = fixture();
        let short = stats(&f, "NSW", 2005, 2024, 0.05);
        let long = stats(&f, "New South Wales", 2005, 2024, 0.05);
        assert_eq!(short, long);
    }

    #[test]
    fn test_empty_habitat_is_null_only_for_itself() {
        let f = fixture_with(FeatureCollection::empty("seagrasses"), 1_000_000, equal_area_grid());
        let s = stats(&f, ALL_REGIONS, 2005, 2024, 0.05);
        assert_eq!(s.areas.seagrass, None);
        assert_eq!(s.loss.seagrass, None);
        assert_eq!(s.gain.seagrass, None);
        assert!(s.areas.mangrove.is_some());
        assert!(s.areas.saltmarsh.is_some());
        assert!(s.areas.all.is_some());
    }

    #[test]
    fn test_unknown_region_attempts_no_reduction() {
        let f = fixture();
        let err = f
            .aggregator
            .compute_stats_for_selector("Atlantis", 2005, 2024, 0.05)
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedRegion { .. }));
        assert_eq!(f.engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_region_without_habitat_is_all_null() {
        let f = fixture();
        let s = stats(&f, "QLD", 2005, 2024, 0.05);
        assert_eq!(s, StatsResult::default());
        assert_eq!(f.engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_threshold_unchanged_is_neither() {
        let f = fixture();
        let s = stats(&f, ALL_REGIONS, 2005, 2005, 0.0);
        assert!(s.areas.all.is_some());
        assert_eq!(s.loss.all, None);
        assert_eq!(s.gain.all, None);
    }

    #[test]
    fn test_zero_threshold_counts_any_increase() {
        let f = fixture();
        let s = stats(&f, ALL_REGIONS, 2005, 2010, 0.0);
        assert_eq!(s.loss.all, None);
        assert_eq!(s.gain.all, s.areas.all);
    }

    #[test]
    fn test_engine_failure_carries_request() {
        let f = fixture_with(seagrasses(), 10, equal_area_grid());
        let err = f
            .aggregator
            .compute_stats_for_selector(ALL_REGIONS, 2005, 2024, 0.05)
            .unwrap_err();
        match err {
            Error::Upstream { request, source } => {
                assert!(request.contains("region All Regions"));
                assert!(request.contains("baseline 2005"));
                assert!(matches!(source, EngineError::TooManyPixels { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_engine_failures_name_their_region() {
        let f = fixture_with(seagrasses(), 10, equal_area_grid());
        let err = f
            .aggregator
            .compute_stats_for_selector("NSW", 2005, 2024, 0.05)
            .unwrap_err();
        match err {
            Error::Upstream { request, .. } => {
                assert!(request.contains("region NSW"), "{}", request);
                assert!(request.contains("comparison 2024"));
            }
            other => panic!("unexpected error {:?}", other),
        }

        let region = MultiPolygon::new(vec![rect(150.95, -33.1, 151.15, -33.0)]);
        let err = f
            .aggregator
            .compute_stats(&region, 2005, 2024, 0.05)
            .unwrap_err();
        match err {
            Error::Upstream { request, .. } => {
                let bbox = "region bbox [150.95, -33.1, 151.15, -33]";
                assert!(request.contains(bbox), "{}", request);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_grid_mismatch_rejected() {
        let f = fixture_with(seagrasses(), 1_000_000, GridSpec::australian_albers_250m());
        let err = f
            .aggregator
            .compute_stats_for_selector(ALL_REGIONS, 2005, 2024, 0.05)
            .unwrap_err();
        assert!(matches!(err, Error::GridMismatch { .. }));
        assert_eq!(f.engine.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stats_helpers() {
        let s = StatsResult {
            areas: HabitatValues {
                mangrove: Some(200.0),
                seagrass: Some(0.0),
                saltmarsh: None,
                all: Some(400.0),
            },
            loss: HabitatValues {
                mangrove: Some(50.0),
                seagrass: None,
                saltmarsh: Some(1.0),
                all: Some(100.0),
            },
            gain: HabitatValues::default(),
        };
        assert_eq!(s.in_km2().areas.mangrove, Some(2.0));
        let pct = s.loss_percent();
        assert_eq!(pct.mangrove, Some(25.0));
        assert_eq!(pct.seagrass, None);
        assert_eq!(pct.saltmarsh, None);
        assert_eq!(pct.all, Some(25.0));
        assert_eq!(s.gain_percent(), HabitatValues::default());
    }

    #[test]
    fn test_stats_serialize() {
        let s = StatsResult::default();
        let json = serde_json::to_value(s).unwrap();
        assert!(json["areas"]["mangrove"].is_null());
        assert!(json["gain"].get("all").is_some());
    }
}
