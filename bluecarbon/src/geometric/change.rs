use std::sync::Arc;
use tracing::debug;

use crate::collect::image::Image;
use crate::error::{Error, Result};
use crate::geometric::composite::AnnualCompositeCache;
use crate::geometric::equal_area::{EqualAreaLayer, EqualAreaProjector};

/// NDVI change between two years restricted to habitat pixels
#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub baseline_year: i32,
    pub comparison_year: i32,
    pub threshold: f64,
    /// comparison − baseline
    pub delta: EqualAreaLayer,
    /// 1 where the index dropped past the threshold, 0 otherwise
    pub loss: EqualAreaLayer,
    /// 1 where the index rose past the threshold, 0 otherwise
    pub gain: EqualAreaLayer,
}

/// Loss/gain classification of a delta image
///
/// With a positive threshold `t`: loss is `delta <= -t`, gain is
/// `delta >= t` and anything in between is stable. A threshold of zero or
/// below classifies by sign only, so an unchanged pixel is neither.
pub fn classify(delta: &Image, threshold: f64) -> (Image, Image) {
    if threshold > 0.0 {
        (delta.lte(-threshold), delta.gte(threshold))
    } else {
        (delta.lt(0.0), delta.gt(0.0))
    }
}

/// Not cached: every (baseline, comparison, threshold) triple is rebuilt
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    composites: Arc<AnnualCompositeCache>,
    projector: EqualAreaProjector,
    union_mask: Image,
}

impl ChangeDetector {
    pub fn new(
        composites: Arc<AnnualCompositeCache>,
        projector: EqualAreaProjector,
        union_mask: Image,
    ) -> Self {
        ChangeDetector {
            composites,
            projector,
            union_mask,
        }
    }

    pub fn detect_change(
        &self,
        baseline_year: i32,
        comparison_year: i32,
        threshold_abs: f64,
    ) -> Result<ChangeResult> {
        if !threshold_abs.is_finite() {
            return Err(Error::InvalidParameter {
                name: "threshold_abs",
                value: threshold_abs.to_string(),
                reason: "must be finite".to_string(),
            });
        }
        let baseline = self.composites.composite_for_year(baseline_year)?;
        let comparison = self.composites.composite_for_year(comparison_year)?;

        let delta = comparison
            .subtract(&baseline)
            .update_mask(&self.union_mask);
        let (loss, gain) = classify(&delta, threshold_abs);
        debug!(
            "Change {} -> {} at threshold {}",
            baseline_year, comparison_year, threshold_abs
        );

        Ok(ChangeResult {
            baseline_year,
            comparison_year,
            threshold: threshold_abs,
            delta: self.projector.to_equal_area(&delta),
            loss: self.projector.to_equal_area(&loss),
            gain: self.projector.to_equal_area(&gain),
        })
    }
}
