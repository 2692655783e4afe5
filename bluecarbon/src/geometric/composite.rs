use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::collect::image::{Image, RasterCollection};
use crate::error::{Error, Result};

/// Per-year NDVI composites, built on first request and kept for the
/// lifetime of the cache
///
/// Entries are never evicted: the source imagery is archival and does not
/// change once published.
#[derive(Debug)]
pub struct AnnualCompositeCache {
    collection: String,
    band: String,
    scale_factor: f64,
    national_mask: Image,
    entries: Mutex<HashMap<String, Image>>,
}

impl AnnualCompositeCache {
    pub fn new(
        collection: impl Into<String>,
        band: impl Into<String>,
        scale_factor: f64,
        national_mask: Image,
    ) -> Self {
        AnnualCompositeCache {
            collection: collection.into(),
            band: band.into(),
            scale_factor,
            national_mask,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Median NDVI of the captures in `[Jan 1 year, Jan 1 year+1)`, masked
    /// to the national boundary
    ///
    /// A hit returns the cached handle itself. A year without captures
    /// gives a composite with no valid pixel.
    pub fn composite_for_year(&self, year: i32) -> Result<Image> {
        let key = year.to_string();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(image) = entries.get(&key) {
            return Ok(image.clone());
        }

        let image = self.build(year)?;
        debug!("Built NDVI composite for {}", year);
        entries.insert(key, image.clone());
        Ok(image)
    }

    fn build(&self, year: i32) -> Result<Image> {
        let start = year_start(year)?;
        let end = year_start(year + 1)?;
        Ok(RasterCollection::new(&self.collection)
            .filter_date(start, end)
            .select(&self.band)
            .median()
            .multiply(self.scale_factor)
            .update_mask(&self.national_mask))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, year: i32) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&year.to_string())
    }
}

fn year_start(year: i32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| Error::InvalidParameter {
        name: "year",
        value: year.to_string(),
        reason: "not a representable calendar year".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::local_engine::sample_at;
    use crate::geo_core::{Crs, GridSpec};
    use crate::geometric::habitat_mask::HabitatMaskBuilder;
    use crate::testing::{boundaries_arc, engine, TEST_COLLECTION};
    use std::sync::Arc;
    use std::thread;

    fn cache() -> AnnualCompositeCache {
        let builder = HabitatMaskBuilder::new(GridSpec::modis_250m());
        let national = builder.rasterize(boundaries_arc());
        AnnualCompositeCache::new(TEST_COLLECTION, "NDVI", 0.0001, national)
    }

    fn sample_grid() -> GridSpec {
        GridSpec::new(Crs::Wgs84, 0.001)
    }

    #[test]
    fn test_cache_returns_same_handle() {
        let cache = cache();
        assert!(cache.is_empty());
        let a = cache.composite_for_year(2005).unwrap();
        let b = cache.composite_for_year(2005).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(2005));
        assert!(!cache.contains(2006));
    }

    #[test]
    fn test_concurrent_first_requests_build_once() {
        let cache = Arc::new(cache());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.composite_for_year(2010).unwrap())
            })
            .collect();
        let images: Vec<Image> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(images.windows(2).all(|w| w[0].ptr_eq(&w[1])));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_scaled_median_values() {
        let engine = engine();
        let cache = cache();
        let ndvi_2005 = cache.composite_for_year(2005).unwrap();
        let at = |image: &Image, lon: f64| {
            sample_at(&engine, image, sample_grid(), lon, -33.05)
                .unwrap()
                .unwrap()
        };
        assert!((at(&ndvi_2005, 151.0) - 0.5).abs() < 1e-9);

        let ndvi_2024 = cache.composite_for_year(2024).unwrap();
        let west = at(&ndvi_2024, 150.97);
        let east = at(&ndvi_2024, 151.13);
        assert!((west - 0.4).abs() < 1e-9);
        assert!((east - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_year_without_captures_is_no_data() {
        let engine = engine();
        let cache = cache();
        let ndvi = cache.composite_for_year(2003).unwrap();
        let value = sample_at(&engine, &ndvi, sample_grid(), 151.0, -33.05);
        assert_eq!(value.unwrap(), None);
    }

    #[test]
    fn test_masked_outside_national_boundary() {
        let national = Image::constant(0.0).self_mask();
        let cache = AnnualCompositeCache::new(TEST_COLLECTION, "NDVI", 0.0001, national);
        let ndvi = cache.composite_for_year(2005).unwrap();
        let value = sample_at(&engine(), &ndvi, sample_grid(), 151.0, -33.05);
        assert_eq!(value.unwrap(), None);
    }
}
