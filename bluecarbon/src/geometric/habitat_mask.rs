use std::sync::Arc;
use tracing::{debug, warn};

use crate::collect::image::Image;
use crate::collect::vector::FeatureCollection;
use crate::geo_core::{BoundingBox, GridSpec};
use crate::geometric::region::{HabitatDataset, HabitatKind};

/// Presence raster of one habitat: 1 where covered, masked elsewhere
#[derive(Debug, Clone)]
pub struct HabitatMask {
    pub kind: HabitatKind,
    pub image: Image,
    /// Envelope of the habitat geometries
    pub extent: Option<BoundingBox>,
}

/// Per-habitat masks, their union and the union's extent
#[derive(Debug, Clone)]
pub struct HabitatMasks {
    pub mangrove: HabitatMask,
    pub seagrass: HabitatMask,
    pub saltmarsh: HabitatMask,
    pub union: Image,
    /// `None` when every habitat collection is empty
    pub extent: Option<BoundingBox>,
}

impl HabitatMasks {
    pub fn get(&self, kind: HabitatKind) -> &HabitatMask {
        match kind {
            HabitatKind::Mangrove => &self.mangrove,
            HabitatKind::Seagrass => &self.seagrass,
            HabitatKind::Saltmarsh => &self.saltmarsh,
        }
    }
}

/// Rasterizes vector collections on the raster source's native grid
#[derive(Debug, Clone, Copy)]
pub struct HabitatMaskBuilder {
    native_grid: GridSpec,
}

impl HabitatMaskBuilder {
    pub fn new(native_grid: GridSpec) -> Self {
        HabitatMaskBuilder { native_grid }
    }

    /// Burn presence value 1 for every feature; uncovered pixels stay masked
    ///
    /// Geometries are used as given. An empty collection gives a mask with
    /// no valid pixel.
    pub fn rasterize(&self, features: Arc<FeatureCollection>) -> Image {
        Image::paint(features, 1.0).reproject(self.native_grid)
    }

    pub fn build_mask(&self, dataset: &HabitatDataset) -> HabitatMask {
        if dataset.collection.is_empty() {
            warn!("{} collection is empty; its mask has no pixels", dataset.kind);
        }
        HabitatMask {
            kind: dataset.kind,
            image: self.rasterize(Arc::clone(&dataset.collection)),
            extent: dataset.collection.bounding_box(),
        }
    }

    /// Union of the habitat masks
    ///
    /// Each mask is unmasked to 0 before the OR so a pixel covered by one
    /// habitat is not lost to another's no-data, then re-masked so only
    /// union pixels stay valid.
    pub fn union_mask(masks: &[&Image]) -> Image {
        let mut iter = masks.iter();
        let Some(first) = iter.next() else {
            return Image::constant(0.0).self_mask();
        };
        iter.fold(first.unmask(0.0), |acc, mask| acc.add(&mask.unmask(0.0)))
            .gt(0.0)
            .self_mask()
    }

    pub fn build_all(
        &self,
        mangrove: &HabitatDataset,
        seagrass: &HabitatDataset,
        saltmarsh: &HabitatDataset,
    ) -> HabitatMasks {
        let mangrove = self.build_mask(mangrove);
        let seagrass = self.build_mask(seagrass);
        let saltmarsh = self.build_mask(saltmarsh);

        let images = [&mangrove.image, &seagrass.image, &saltmarsh.image];
        let union = HabitatMaskBuilder::union_mask(&images);
        let extent = [mangrove.extent, seagrass.extent, saltmarsh.extent]
            .into_iter()
            .flatten()
            .reduce(|a, b| a.union(&b));
        debug!("Habitat union extent: {:?}", extent);

        HabitatMasks {
            mangrove,
            seagrass,
            saltmarsh,
            union,
            extent,
        }
    }
}
