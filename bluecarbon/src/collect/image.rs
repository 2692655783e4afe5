//! Lazy raster computation graph
//!
//! An [`Image`] describes a computation; nothing is evaluated until a
//! [`ComputeEngine`](crate::collect::engine::ComputeEngine) reduces it over a
//! region. Handles are reference counted, so cloning shares the node and
//! [`Image::ptr_eq`] identifies "the same raster".
//!
//! Masking follows the no-data model: a pixel either carries a value or is
//! masked out. Masked pixels propagate through arithmetic and comparisons and
//! are never read as zero unless [`Image::unmask`] says so.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::collect::vector::FeatureCollection;
use crate::geo_core::GridSpec;

/// Per-pixel reduction across the images of a date window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalReducer {
    Median,
}

/// A temporal composite drawn from a raster source
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSpec {
    pub collection: String,
    /// Band to read; `None` reads the source's only band
    pub band: Option<String>,
    /// Inclusive start of the capture window
    pub start: Option<NaiveDate>,
    /// Exclusive end of the capture window
    pub end: Option<NaiveDate>,
    pub reducer: TemporalReducer,
}

/// Raster source query builder: date filter, band selection, temporal reduction
#[derive(Debug, Clone, PartialEq)]
pub struct RasterCollection {
    id: String,
    band: Option<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl RasterCollection {
    pub fn new(id: impl Into<String>) -> Self {
        RasterCollection {
            id: id.into(),
            band: None,
            start: None,
            end: None,
        }
    }

    /// Keep captures in `[start, end)`
    pub fn filter_date(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn select(mut self, band: impl Into<String>) -> Self {
        self.band = Some(band.into());
        self
    }

    pub fn median(&self) -> Image {
        Image::new(ImageNode::Composite(CompositeSpec {
            collection: self.id.clone(),
            band: self.band.clone(),
            start: self.start,
            end: self.end,
            reducer: TemporalReducer::Median,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Abs,
    /// Mask out pixels equal to zero
    SelfMask,
    /// Replace masked pixels with a value
    Unmask(f64),
    Multiply(f64),
    Divide(f64),
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
}

#[derive(Debug)]
pub enum ImageNode {
    Constant(f64),
    /// Ground area of each pixel in square metres
    PixelArea,
    Composite(CompositeSpec),
    /// Burn `value` into pixels covered by any feature; others are masked
    Paint {
        features: Arc<FeatureCollection>,
        value: f64,
    },
    Unary {
        op: UnaryOp,
        input: Image,
    },
    Binary {
        op: BinaryOp,
        lhs: Image,
        rhs: Image,
    },
    /// Mask `input` wherever `mask` is masked or zero
    UpdateMask {
        input: Image,
        mask: Image,
    },
    /// Evaluate `input` on a fixed grid
    Reproject {
        input: Image,
        grid: GridSpec,
    },
    Rename {
        input: Image,
        names: Vec<String>,
    },
    Concat(Vec<Image>),
}

#[derive(Debug, Clone)]
pub struct Image(Arc<ImageNode>);

impl Image {
    fn new(node: ImageNode) -> Self {
        Image(Arc::new(node))
    }

    pub fn constant(value: f64) -> Self {
        Image::new(ImageNode::Constant(value))
    }

    pub fn pixel_area() -> Self {
        Image::new(ImageNode::PixelArea)
    }

    pub fn paint(features: Arc<FeatureCollection>, value: f64) -> Self {
        Image::new(ImageNode::Paint { features, value })
    }

    /// Stack bands of several images
    pub fn cat(images: Vec<Image>) -> Self {
        Image::new(ImageNode::Concat(images))
    }

    pub fn node(&self) -> &ImageNode {
        &self.0
    }

    /// Whether both handles point to the same computation node
    pub fn ptr_eq(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn unary(&self, op: UnaryOp) -> Self {
        Image::new(ImageNode::Unary {
            op,
            input: self.clone(),
        })
    }

    fn binary(&self, op: BinaryOp, rhs: &Image) -> Self {
        Image::new(ImageNode::Binary {
            op,
            lhs: self.clone(),
            rhs: rhs.clone(),
        })
    }

    pub fn abs(&self) -> Self {
        self.unary(UnaryOp::Abs)
    }

    pub fn self_mask(&self) -> Self {
        self.unary(UnaryOp::SelfMask)
    }

    pub fn unmask(&self, value: f64) -> Self {
        self.unary(UnaryOp::Unmask(value))
    }

    pub fn multiply(&self, factor: f64) -> Self {
        self.unary(UnaryOp::Multiply(factor))
    }

    pub fn divide(&self, divisor: f64) -> Self {
        self.unary(UnaryOp::Divide(divisor))
    }

    pub fn gt(&self, value: f64) -> Self {
        self.unary(UnaryOp::Gt(value))
    }

    pub fn gte(&self, value: f64) -> Self {
        self.unary(UnaryOp::Gte(value))
    }

    pub fn lt(&self, value: f64) -> Self {
        self.unary(UnaryOp::Lt(value))
    }

    pub fn lte(&self, value: f64) -> Self {
        self.unary(UnaryOp::Lte(value))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(&self, rhs: &Image) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    pub fn subtract(&self, rhs: &Image) -> Self {
        self.binary(BinaryOp::Subtract, rhs)
    }

    pub fn update_mask(&self, mask: &Image) -> Self {
        Image::new(ImageNode::UpdateMask {
            input: self.clone(),
            mask: mask.clone(),
        })
    }

    pub fn reproject(&self, grid: GridSpec) -> Self {
        Image::new(ImageNode::Reproject {
            input: self.clone(),
            grid,
        })
    }

    pub fn rename<S: Into<String>>(&self, names: impl IntoIterator<Item = S>) -> Self {
        Image::new(ImageNode::Rename {
            input: self.clone(),
            names: names.into_iter().map(Into::into).collect(),
        })
    }

    /// Output band names
    pub fn band_names(&self) -> Vec<String> {
        match self.node() {
            ImageNode::Constant(_) | ImageNode::Paint { .. } => vec!["constant".to_string()],
            ImageNode::PixelArea => vec!["area".to_string()],
            ImageNode::Composite(spec) => {
                vec![spec.band.clone().unwrap_or_else(|| "b1".to_string())]
            }
            ImageNode::Unary { input, .. }
            | ImageNode::UpdateMask { input, .. }
            | ImageNode::Reproject { input, .. } => input.band_names(),
            ImageNode::Binary { lhs, rhs, .. } => {
                let left = lhs.band_names();
                if left.len() == 1 {
                    let right = rhs.band_names();
                    if right.len() > 1 {
                        return right;
                    }
                }
                left
            }
            ImageNode::Rename { names, .. } => names.clone(),
            ImageNode::Concat(images) => images.iter().flat_map(|i| i.band_names()).collect(),
        }
    }

    /// Fixed grid this image is evaluated on, if it was reprojected
    pub fn fixed_grid(&self) -> Option<GridSpec> {
        match self.node() {
            ImageNode::Reproject { grid, .. } => Some(*grid),
            ImageNode::Unary { input, .. } | ImageNode::Rename { input, .. } => input.fixed_grid(),
            _ => None,
        }
    }
}
