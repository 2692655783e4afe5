//! Region resolution
//!
//! Habitat datasets name their state in different attributes and spellings.
//! Resolution runs in two stages: [`resolve_field`] finds the attribute by
//! probing the dataset schema, then [`normalize_region_name`] maps whatever
//! spelling was found onto the name used by the reference boundaries.

use geo::MultiPolygon;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::collect::global_variables::{ALL_REGIONS, REGION_ALIASES};
use crate::collect::vector::{FeatureCollection, VectorSource};
use crate::commons::basic_functions::attribute_label;
use crate::error::{Error, Result};

/// The three blue-carbon ecosystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HabitatKind {
    Mangrove,
    Seagrass,
    Saltmarsh,
}

impl HabitatKind {
    pub const ALL: [HabitatKind; 3] = [
        HabitatKind::Mangrove,
        HabitatKind::Seagrass,
        HabitatKind::Saltmarsh,
    ];

    /// Short code used in band names (`ha_m`, `loss_sg`, ...)
    pub fn code(&self) -> &'static str {
        match self {
            HabitatKind::Mangrove => "m",
            HabitatKind::Seagrass => "sg",
            HabitatKind::Saltmarsh => "sm",
        }
    }
}

impl fmt::Display for HabitatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HabitatKind::Mangrove => "Mangroves",
            HabitatKind::Seagrass => "Seagrasses",
            HabitatKind::Saltmarsh => "Saltmarshes",
        };
        write!(f, "{}", label)
    }
}

/// First candidate present in the dataset schema
///
/// `None` means the dataset has no region attribute and is national-scope only.
pub fn resolve_field(dataset: &dyn VectorSource, candidates: &[String]) -> Result<Option<String>> {
    let names = dataset.property_names()?;
    let found = candidates
        .iter()
        .find(|candidate| names.iter().any(|n| n == *candidate))
        .cloned();
    match &found {
        Some(field) => debug!("Dataset '{}' region field: {}", dataset.name(), field),
        None => info!(
            "Dataset '{}' has none of the region fields {:?}; national scope only",
            dataset.name(),
            candidates
        ),
    }
    Ok(found)
}

/// Sorted distinct usable values of `field`; empty without a field
pub fn distinct_region_values(
    dataset: &dyn VectorSource,
    field: Option<&str>,
) -> Result<BTreeSet<String>> {
    let Some(field) = field else {
        return Ok(BTreeSet::new());
    };
    Ok(dataset
        .attribute_values(field)?
        .iter()
        .filter_map(attribute_label)
        .collect())
}

/// Canonical boundary name for a selector
///
/// Matching against the alias table ignores case and surrounding space;
/// names not in the table come back trimmed but otherwise unchanged.
pub fn normalize_region_name(selector: &str) -> String {
    let trimmed = selector.trim();
    REGION_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

pub fn is_all_regions(selector: &str) -> bool {
    selector.trim() == ALL_REGIONS
}

/// A habitat feature collection with its resolved region attribute
#[derive(Debug, Clone)]
pub struct HabitatDataset {
    pub kind: HabitatKind,
    pub collection: Arc<FeatureCollection>,
    pub region_field: Option<String>,
    pub region_values: BTreeSet<String>,
}

impl HabitatDataset {
    /// Resolve the region field and its values once
    pub fn new(
        kind: HabitatKind,
        collection: FeatureCollection,
        candidates: &[String],
    ) -> Result<Self> {
        let region_field = resolve_field(&collection, candidates)?;
        let region_values = distinct_region_values(&collection, region_field.as_deref())?;
        info!(
            "Loaded {} ({} features, {} region values)",
            kind,
            collection.len(),
            region_values.len()
        );
        Ok(HabitatDataset {
            kind,
            collection: Arc::new(collection),
            region_field,
            region_values,
        })
    }

    pub fn is_national_scope(&self) -> bool {
        self.region_field.is_none()
    }

    /// Features belonging to the selected region
    ///
    /// The whole collection is returned for "All Regions" and for datasets
    /// without a region attribute.
    pub fn filter_region(&self, selector: &str) -> Arc<FeatureCollection> {
        let field = match &self.region_field {
            Some(field) if !is_all_regions(selector) => field,
            _ => return Arc::clone(&self.collection),
        };
        let wanted = normalize_region_name(selector);
        Arc::new(self.collection.filter(|feature| {
            feature
                .property(field)
                .and_then(attribute_label)
                .map(|label| normalize_region_name(&label) == wanted)
                .unwrap_or(false)
        }))
    }
}

/// Maps selectors to reference boundary geometries
#[derive(Debug, Clone)]
pub struct RegionResolver {
    boundaries: Arc<FeatureCollection>,
    name_field: String,
    national: MultiPolygon<f64>,
}

impl RegionResolver {
    /// The national geometry is dissolved once from all boundaries
    pub fn new(boundaries: Arc<FeatureCollection>, name_field: impl Into<String>) -> Self {
        let national = boundaries.union_geometry();
        RegionResolver {
            boundaries,
            name_field: name_field.into(),
            national,
        }
    }

    /// Reference boundary features named like the selector
    pub fn region_boundaries(&self, selector: &str) -> FeatureCollection {
        let canonical = normalize_region_name(selector);
        self.boundaries.filter(|feature| {
            feature
                .property(&self.name_field)
                .and_then(attribute_label)
                .map(|name| name == canonical)
                .unwrap_or(false)
        })
    }

    /// Geometry of the selected region
    ///
    /// Unknown names are an error; they never widen to the national extent.
    pub fn canonical_region_geometry(&self, selector: &str) -> Result<MultiPolygon<f64>> {
        if is_all_regions(selector) {
            return Ok(self.national.clone());
        }
        let geometry = self.region_boundaries(selector).union_geometry();
        if geometry.0.is_empty() {
            return Err(Error::UnresolvedRegion {
                selector: selector.to_string(),
            });
        }
        Ok(geometry)
    }
}

/// Region selector entries: the sentinel first, then canonical names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCatalog {
    entries: Vec<String>,
}

impl RegionCatalog {
    pub fn build<'a>(datasets: impl IntoIterator<Item = &'a HabitatDataset>) -> Self {
        let names: BTreeSet<String> = datasets
            .into_iter()
            .flat_map(|d| d.region_values.iter())
            .map(|v| normalize_region_name(v))
            .collect();
        let mut entries = Vec::with_capacity(names.len() + 1);
        entries.push(ALL_REGIONS.to_string());
        entries.extend(names);
        RegionCatalog { entries }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.entries.iter().any(|e| e == selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::vector::Feature;
    use crate::testing::{
        boundaries_arc, candidates, mangroves, props, saltmarshes, seagrasses, square,
    };
    use serde_json::json;

    fn dataset(kind: HabitatKind, fc: FeatureCollection) -> HabitatDataset {
        HabitatDataset::new(kind, fc, &candidates()).unwrap()
    }

    #[test]
    fn test_resolve_field_first_candidate_wins() {
        let fc = FeatureCollection::new(
            "both",
            vec![Feature::new(
                square(0.0, 0.0, 1.0),
                props(&[("STATE_NAME", "Victoria"), ("STATE", "VIC")]),
            )],
        );
        assert_eq!(
            resolve_field(&fc, &candidates()).unwrap(),
            Some("STATE".to_string())
        );
    }

    #[test]
    fn test_resolve_field_miss() {
        assert_eq!(resolve_field(&saltmarshes(), &candidates()).unwrap(), None);
        assert_eq!(
            resolve_field(&FeatureCollection::empty("none"), &candidates()).unwrap(),
            None
        );
    }

    #[test]
    fn test_distinct_region_values_filters_blanks() {
        let values = [
            json!("QLD"),
            json!("NSW"),
            json!(""),
            json!("null"),
            json!("None"),
            json!(null),
            json!(7),
            json!("NSW"),
        ];
        let features = values
            .iter()
            .map(|v| {
                let mut p = serde_json::Map::new();
                p.insert("STATE".to_string(), v.clone());
                Feature::new(square(0.0, 0.0, 1.0), p)
            })
            .collect();
        let fc = FeatureCollection::new("states", features);
        let distinct = distinct_region_values(&fc, Some("STATE")).unwrap();
        assert_eq!(
            distinct.into_iter().collect::<Vec<_>>(),
            vec!["7".to_string(), "NSW".to_string(), "QLD".to_string()]
        );
        assert!(distinct_region_values(&fc, None).unwrap().is_empty());
    }

    #[test]
    fn test_normalize_region_name() {
        assert_eq!(normalize_region_name("NSW"), "New South Wales");
        assert_eq!(normalize_region_name("nsw"), "New South Wales");
        assert_eq!(normalize_region_name(" Queensland "), "Queensland");
        assert_eq!(normalize_region_name("ACT"), "Australian Capital Territory");
        assert_eq!(normalize_region_name("  Atlantis "), "Atlantis");
    }

    #[test]
    fn test_alias_and_full_name_same_geometry() {
        let resolver = RegionResolver::new(boundaries_arc(), "ADM1_NAME");
        let short = resolver.canonical_region_geometry("NSW").unwrap();
        let long = resolver
            .canonical_region_geometry("New South Wales")
            .unwrap();
        assert_eq!(short, long);
        assert_eq!(short.0.len(), 1);
    }

    #[test]
    fn test_all_regions_is_national_union() {
        use geo::Area;
        let resolver = RegionResolver::new(boundaries_arc(), "ADM1_NAME");
        let national = resolver.canonical_region_geometry(ALL_REGIONS).unwrap();
        let nsw = resolver.canonical_region_geometry("NSW").unwrap();
        let qld = resolver.canonical_region_geometry("QLD").unwrap();
        let sum = nsw.unsigned_area() + qld.unsigned_area();
        assert!((national.unsigned_area() - sum).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_region_is_error() {
        let resolver = RegionResolver::new(boundaries_arc(), "ADM1_NAME");
        let err = resolver.canonical_region_geometry("Atlantis").unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedRegion { ref selector } if selector == "Atlantis"
        ));
        // known alias without a boundary in the reference data
        assert!(resolver.canonical_region_geometry("TAS").is_err());
    }

    #[test]
    fn test_habitat_dataset_and_catalog() {
        let m = dataset(HabitatKind::Mangrove, mangroves());
        let sg = dataset(HabitatKind::Seagrass, seagrasses());
        let sm = dataset(HabitatKind::Saltmarsh, saltmarshes());

        assert_eq!(m.region_field.as_deref(), Some("STATE"));
        assert_eq!(sg.region_field.as_deref(), Some("State_Name"));
        assert!(sm.is_national_scope());

        let catalog = RegionCatalog::build([&m, &sg, &sm]);
        assert_eq!(
            catalog.entries(),
            &["All Regions".to_string(), "New South Wales".to_string()]
        );
        assert!(catalog.contains("New South Wales"));
        assert!(!catalog.contains("NSW"));
    }

    #[test]
    fn test_filter_region() {
        let m = dataset(HabitatKind::Mangrove, mangroves());
        let sm = dataset(HabitatKind::Saltmarsh, saltmarshes());

        assert_eq!(m.filter_region("New South Wales").len(), 1);
        assert_eq!(m.filter_region("Queensland").len(), 0);
        assert!(Arc::ptr_eq(&m.filter_region(ALL_REGIONS), &m.collection));
        assert_eq!(sm.filter_region("Queensland").len(), 1);
    }
}
