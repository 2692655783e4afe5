//! Shared fixtures for unit tests
//!
//! A miniature NSW coast: two state boundaries, three small habitat patches
//! north of Newcastle and an NDVI archive over them. In 2024 the western half
//! of the archive drops by 0.1 NDVI and the eastern half rises by 0.1.

use chrono::NaiveDate;
use geo::{coord, LineString, Polygon};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::collect::global_variables::{NDVI_BAND, REGION_FIELD_CANDIDATES};
use crate::collect::local_engine::{LocalEngine, SceneRaster};
use crate::collect::vector::{Feature, FeatureCollection};
use crate::geo_core::{BoundingBox, Crs, GridSpec};

pub const TEST_COLLECTION: &str = "test/ndvi";

/// Longitude where the 2024 capture switches from loss to gain
pub const CHANGE_EDGE_LON: f64 = 151.05;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn candidates() -> Vec<String> {
    REGION_FIELD_CANDIDATES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn props(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            coord! { x: min_x, y: min_y },
            coord! { x: max_x, y: min_y },
            coord! { x: max_x, y: max_y },
            coord! { x: min_x, y: max_y },
            coord! { x: min_x, y: min_y },
        ]),
        vec![],
    )
}

pub fn square(min_x: f64, min_y: f64, size: f64) -> Polygon<f64> {
    rect(min_x, min_y, min_x + size, min_y + size)
}

pub fn boundaries() -> FeatureCollection {
    FeatureCollection::new(
        "gaul1",
        vec![
            Feature::new(
                rect(141.0, -37.5, 153.7, -28.2),
                props(&[
                    ("ADM0_NAME", "Australia"),
                    ("ADM1_NAME", "New South Wales"),
                ]),
            ),
            Feature::new(
                rect(138.0, -28.2, 153.6, -10.0),
                props(&[("ADM0_NAME", "Australia"), ("ADM1_NAME", "Queensland")]),
            ),
        ],
    )
}

pub fn mangroves() -> FeatureCollection {
    FeatureCollection::new(
        "mangroves",
        vec![Feature::new(
            rect(150.95, -33.1, 151.05, -33.0),
            props(&[("STATE", "NSW")]),
        )],
    )
}

pub fn seagrasses() -> FeatureCollection {
    FeatureCollection::new(
        "seagrasses",
        vec![Feature::new(
            rect(151.05, -33.1, 151.15, -33.0),
            props(&[("State_Name", "New South Wales")]),
        )],
    )
}

/// Straddles the change edge; carries no region attribute
pub fn saltmarshes() -> FeatureCollection {
    FeatureCollection::new(
        "saltmarshes",
        vec![Feature::new(
            rect(151.0, -33.05, 151.1, -32.95),
            props(&[("TYPE", "saltmarsh")]),
        )],
    )
}

fn scene(year: i32, month: u32, value: impl Fn(f64) -> f64) -> SceneRaster {
    let bbox = BoundingBox::new(150.9, -33.2, 151.2, -32.9);
    SceneRaster::covering(date(year, month, 1), Crs::Wgs84, bbox, 0.0025)
        .with_band_fn(NDVI_BAND, move |lon, _| value(lon))
}

fn west_east(west: f64, east: f64) -> impl Fn(f64) -> f64 {
    move |lon| if lon < CHANGE_EDGE_LON { west } else { east }
}

/// NDVI archive stored as fixed-point integers (scale 0.0001)
///
/// 2005 is 0.5 everywhere, 2010 is 0.502, 2024 is 0.4 west of the change
/// edge and 0.6 east of it. Other years have no captures.
pub fn engine() -> LocalEngine {
    let scenes = vec![
        scene(2005, 3, |_| 4990.0),
        scene(2005, 6, |_| 5000.0),
        scene(2005, 9, |_| 5010.0),
        scene(2010, 6, |_| 5020.0),
        scene(2024, 2, west_east(3990.0, 5990.0)),
        scene(2024, 8, west_east(4010.0, 6010.0)),
    ];
    LocalEngine::new().with_collection(TEST_COLLECTION, scenes)
}

/// Equal-area grid coarse enough to keep reductions quick
pub fn equal_area_grid() -> GridSpec {
    GridSpec::new(Crs::AustralianAlbers, 500.0)
}

pub fn boundaries_arc() -> Arc<FeatureCollection> {
    Arc::new(boundaries())
}
