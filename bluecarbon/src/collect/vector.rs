use anyhow::{Context, Result as AnyResult};
use geo::{BooleanOps, BoundingRect, Contains, Geometry, MultiPolygon, Point};
use geojson::GeoJson;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::geo_core::{BoundingBox, Crs};

type Envelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Read access to a vector dataset: attribute schema, attribute values, geometries
///
/// Implemented by [`FeatureCollection`]; hosted datasets implement it by
/// querying their backend.
pub trait VectorSource: Send + Sync {
    fn name(&self) -> &str;

    /// Attribute names declared by the dataset (the schema of its first feature)
    fn property_names(&self) -> Result<Vec<String>>;

    /// Value of `field` for every feature that has it
    fn attribute_values(&self, field: &str) -> Result<Vec<Value>>;
}

/// A vector feature: optional geometry plus JSON attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>, properties: Map<String, Value>) -> Self {
        Feature {
            geometry: Some(geometry.into()),
            properties,
        }
    }

    pub fn property(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }
}

/// In-memory feature collection in geographic coordinates (EPSG:4326)
///
/// Feature envelopes are indexed in an R-tree so point coverage tests only
/// visit candidate features.
#[derive(Clone)]
pub struct FeatureCollection {
    name: String,
    features: Vec<Feature>,
    index: RTree<Envelope>,
}

impl FeatureCollection {
    pub fn new(name: impl Into<String>, features: Vec<Feature>) -> Self {
        let envelopes: Vec<Envelope> = features
            .iter()
            .enumerate()
            .filter_map(|(i, f)| {
                let rect = f.geometry.as_ref()?.bounding_rect()?;
                Some(GeomWithData::new(
                    Rectangle::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    i,
                ))
            })
            .collect();

        FeatureCollection {
            name: name.into(),
            features,
            index: RTree::bulk_load(envelopes),
        }
    }

    pub fn empty(name: impl Into<String>) -> Self {
        FeatureCollection::new(name, Vec::new())
    }

    /// Build from parsed GeoJSON (FeatureCollection, Feature or bare Geometry)
    pub fn from_geojson(name: impl Into<String>, geojson: &GeoJson) -> Result<Self> {
        let name = name.into();
        let invalid = |message: String| Error::InvalidGeoJson {
            source_name: name.clone(),
            message,
        };

        let raw_features: Vec<&geojson::Feature> = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features.iter().collect(),
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(g) => {
                let geometry: Geometry<f64> = g
                    .try_into()
                    .map_err(|e: geojson::Error| invalid(e.to_string()))?;
                return Ok(FeatureCollection::new(
                    name,
                    vec![Feature::new(geometry, Map::new())],
                ));
            }
        };

        let mut features = Vec::with_capacity(raw_features.len());
        for raw in raw_features {
            let geometry: Option<Geometry<f64>> = match &raw.geometry {
                Some(g) => Some(
                    g.try_into()
                        .map_err(|e: geojson::Error| invalid(e.to_string()))?,
                ),
                None => None,
            };
            features.push(Feature {
                geometry,
                properties: raw.properties.clone().unwrap_or_default(),
            });
        }

        Ok(FeatureCollection::new(name, features))
    }

    pub fn from_geojson_str(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let geojson: GeoJson = text
            .parse()
            .map_err(|e: geojson::Error| Error::InvalidGeoJson {
                source_name: name.clone(),
                message: e.to_string(),
            })?;
        FeatureCollection::from_geojson(name, &geojson)
    }

    /// Load a GeoJSON file from disk
    pub fn load(name: impl Into<String>, path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read GeoJSON file: {:?}", path))?;
        let collection = FeatureCollection::from_geojson_str(name, &text)
            .with_context(|| format!("Failed to parse GeoJSON file: {:?}", path))?;
        Ok(collection)
    }

    /// Vector data is always held in geographic coordinates
    pub fn crs(&self) -> Crs {
        Crs::Wgs84
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Envelope of all geometries, `None` when there are none
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.as_ref()?.bounding_rect())
            .map(BoundingBox::from_rect)
            .reduce(|a, b| a.union(&b))
    }

    /// Whether any feature geometry contains the point
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        let point = Point::new(lon, lat);
        self.index.locate_all_at_point(&[lon, lat]).any(|envelope| {
            self.features[envelope.data]
                .geometry
                .as_ref()
                .map(|g| geometry_contains(g, &point))
                .unwrap_or(false)
        })
    }

    /// Features matching the predicate, as a new collection
    pub fn filter<F>(&self, predicate: F) -> FeatureCollection
    where
        F: Fn(&Feature) -> bool,
    {
        let features = self
            .features
            .iter()
            .filter(|f| predicate(f))
            .cloned()
            .collect();
        FeatureCollection::new(self.name.clone(), features)
    }

    /// Dissolved polygonal footprint of all features
    pub fn union_geometry(&self) -> MultiPolygon<f64> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.as_ref())
            .map(polygonal_part)
            .fold(MultiPolygon::new(Vec::new()), |acc, part| {
                if acc.0.is_empty() {
                    part
                } else if part.0.is_empty() {
                    acc
                } else {
                    acc.union(&part)
                }
            })
    }
}

impl fmt::Debug for FeatureCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureCollection")
            .field("name", &self.name)
            .field("features", &self.features.len())
            .finish()
    }
}

impl VectorSource for FeatureCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn property_names(&self) -> Result<Vec<String>> {
        Ok(self
            .features
            .first()
            .map(|f| f.properties.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn attribute_values(&self, field: &str) -> Result<Vec<Value>> {
        Ok(self
            .features
            .iter()
            .filter_map(|f| f.property(field).cloned())
            .collect())
    }
}

/// Point-in-area test; only polygonal geometries cover anything
pub fn geometry_contains(geometry: &Geometry<f64>, point: &Point<f64>) -> bool {
    match geometry {
        Geometry::Polygon(p) => p.contains(point),
        Geometry::MultiPolygon(mp) => mp.contains(point),
        Geometry::Rect(r) => r.to_polygon().contains(point),
        Geometry::Triangle(t) => t.to_polygon().contains(point),
        Geometry::GeometryCollection(gc) => gc.iter().any(|g| geometry_contains(g, point)),
        _ => false,
    }
}

/// Polygonal content of a geometry; points and lines contribute nothing
pub fn polygonal_part(geometry: &Geometry<f64>) -> MultiPolygon<f64> {
    match geometry {
        Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => mp.clone(),
        Geometry::Rect(r) => MultiPolygon::new(vec![r.to_polygon()]),
        Geometry::Triangle(t) => MultiPolygon::new(vec![t.to_polygon()]),
        Geometry::GeometryCollection(gc) => MultiPolygon::new(
            gc.iter().flat_map(|g| polygonal_part(g).0).collect(),
        ),
        _ => MultiPolygon::new(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{props, square};

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"ADM1_NAME": "Tasmania", "ADM0_NAME": "Australia"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[145.0,-43.0],[148.0,-43.0],[148.0,-40.5],[145.0,-40.5],[145.0,-43.0]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"ADM1_NAME": "Victoria"},
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn test_from_geojson_str() {
        let fc = FeatureCollection::from_geojson_str("gaul", SAMPLE).unwrap();
        assert_eq!(fc.len(), 2);
        assert!(fc.features()[1].geometry.is_none());
        assert_eq!(
            fc.property_names().unwrap(),
            vec!["ADM0_NAME".to_string(), "ADM1_NAME".to_string()]
        );
        assert!(fc.covers(146.5, -42.0));
        assert!(!fc.covers(150.0, -42.0));
    }

    #[test]
    fn test_from_geojson_str_invalid() {
        let result = FeatureCollection::from_geojson_str("broken", "{not json");
        assert!(matches!(
            result,
            Err(Error::InvalidGeoJson { ref source_name, .. }) if source_name == "broken"
        ));
    }

    #[test]
    fn test_empty_collection() {
        let fc = FeatureCollection::empty("none");
        assert!(fc.is_empty());
        assert!(fc.bounding_box().is_none());
        assert!(fc.property_names().unwrap().is_empty());
        assert!(fc.union_geometry().0.is_empty());
        assert!(!fc.covers(0.0, 0.0));
    }

    #[test]
    fn test_bounding_box_and_union() {
        let fc = FeatureCollection::new(
            "pair",
            vec![
                Feature::new(square(0.0, 0.0, 1.0), props(&[])),
                Feature::new(square(0.5, 0.0, 1.0), props(&[])),
            ],
        );
        assert_eq!(fc.bounding_box(), Some(BoundingBox::new(0.0, 0.0, 1.5, 1.0)));

        use geo::Area;
        let area = fc.union_geometry().unsigned_area();
        assert!((area - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_attribute_values_and_filter() {
        let fc = FeatureCollection::new(
            "mangroves",
            vec![
                Feature::new(square(0.0, 0.0, 1.0), props(&[("STATE", "NSW")])),
                Feature::new(square(2.0, 0.0, 1.0), props(&[("STATE", "QLD")])),
                Feature::new(square(4.0, 0.0, 1.0), props(&[])),
            ],
        );
        assert_eq!(fc.attribute_values("STATE").unwrap().len(), 2);

        fn state(f: &Feature) -> Option<&str> {
            f.property("STATE").and_then(|v| v.as_str())
        }
        let nsw = fc.filter(|f| state(f) == Some("NSW"));
        assert_eq!(nsw.len(), 1);
        assert!(nsw.covers(0.5, 0.5));
        assert!(!nsw.covers(2.5, 0.5));
    }
}
