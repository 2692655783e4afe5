//! Local reference engine
//!
//! Evaluates [`Image`] graphs pixel by pixel over in-memory scene archives
//! and GeoJSON features. Every request is answered on the grid it names:
//! the engine enumerates grid cells whose centers fall inside the request
//! geometry and evaluates the image at each center. `Reproject` nodes snap
//! the sample location to the center of their own fixed grid first, which
//! reproduces nearest-neighbour resampling.

use chrono::NaiveDate;
use geo::{BoundingRect, Contains, Geometry, MultiPolygon, Point};
use std::collections::HashMap;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::collect::engine::{BandValues, ComputeEngine, EngineError, ReduceRequest, Reducer};
use crate::collect::image::{BinaryOp, CompositeSpec, Image, ImageNode, TemporalReducer, UnaryOp};
use crate::collect::vector::polygonal_part;
use crate::commons::basic_functions::median;
use crate::geo_core::{transform_coords, BoundingBox, Crs, GridSpec};

/// Mean Earth radius used for geographic pixel areas
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// One capture of a raster source
///
/// `transform` is GDAL-style: `[x_origin, pixel_width, 0, y_origin, 0, -pixel_height]`
/// with the origin at the top-left corner.
#[derive(Debug, Clone)]
pub struct SceneRaster {
    pub date: NaiveDate,
    pub crs: Crs,
    pub transform: [f64; 6],
    pub width: usize,
    pub height: usize,
    pub nodata: Option<f64>,
    bands: HashMap<String, Vec<f64>>,
}

impl SceneRaster {
    pub fn new(
        date: NaiveDate,
        crs: Crs,
        transform: [f64; 6],
        width: usize,
        height: usize,
    ) -> Self {
        SceneRaster {
            date,
            crs,
            transform,
            width,
            height,
            nodata: None,
            bands: HashMap::new(),
        }
    }

    /// Scene covering `bbox` with square pixels of `scale` CRS units
    pub fn covering(date: NaiveDate, crs: Crs, bbox: BoundingBox, scale: f64) -> Self {
        let width = ((bbox.max_x - bbox.min_x) / scale).ceil().max(1.0) as usize;
        let height = ((bbox.max_y - bbox.min_y) / scale).ceil().max(1.0) as usize;
        let transform = [bbox.min_x, scale, 0.0, bbox.max_y, 0.0, -scale];
        SceneRaster::new(date, crs, transform, width, height)
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Attach a band stored row-major from the top-left pixel
    pub fn with_band(
        mut self,
        name: impl Into<String>,
        data: Vec<f64>,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        if data.len() != self.width * self.height {
            return Err(EngineError::Band(format!(
                "band '{}' has {} values, scene is {}x{}",
                name,
                data.len(),
                self.width,
                self.height
            )));
        }
        self.bands.insert(name, data);
        Ok(self)
    }

    /// Attach a band computed from each pixel center
    pub fn with_band_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(f64, f64) -> f64,
    {
        let mut data = Vec::with_capacity(self.width * self.height);
        for row in 0..self.height {
            for col in 0..self.width {
                let x = self.transform[0] + (col as f64 + 0.5) * self.transform[1];
                let y = self.transform[3] + (row as f64 + 0.5) * self.transform[5];
                data.push(f(x, y));
            }
        }
        let mut scene = self;
        scene.bands.insert(name.into(), data);
        scene
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.keys().map(|k| k.as_str()).collect()
    }

    /// Value at (x, y) in the scene CRS; `None` outside, on nodata or NaN
    pub fn sample(&self, band: &str, x: f64, y: f64) -> Option<f64> {
        let data = self.bands.get(band)?;
        let col = ((x - self.transform[0]) / self.transform[1]).floor();
        let row = ((y - self.transform[3]) / self.transform[5]).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        let value = data[row as usize * self.width + col as usize];
        if value.is_nan() || self.nodata == Some(value) {
            None
        } else {
            Some(value)
        }
    }

    fn resolve_band<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str, EngineError> {
        match requested {
            Some(band) if self.bands.contains_key(band) => Ok(band),
            Some(band) => Err(EngineError::Band(format!(
                "scene {} has no band '{}'",
                self.date, band
            ))),
            None if self.bands.len() == 1 => {
                Ok(self.bands.keys().next().map(|k| k.as_str()).unwrap_or(""))
            }
            None => Err(EngineError::Band(format!(
                "scene {} has {} bands and none was selected",
                self.date,
                self.bands.len()
            ))),
        }
    }
}

/// Sample location: a cell center plus the cell size, in some CRS
#[derive(Debug, Clone, Copy)]
struct Cell {
    crs: Crs,
    x: f64,
    y: f64,
    scale: f64,
}

type Pixel = Vec<Option<f64>>;

#[derive(Debug, Clone)]
struct Accumulator {
    sums: Vec<f64>,
    counts: Vec<u64>,
}

impl Accumulator {
    fn new(bands: usize) -> Self {
        Accumulator {
            sums: vec![0.0; bands],
            counts: vec![0; bands],
        }
    }

    fn add(&mut self, pixel: &Pixel) {
        for (i, value) in pixel.iter().enumerate() {
            if let Some(v) = value {
                self.sums[i] += v;
                self.counts[i] += 1;
            }
        }
    }

    fn merge(mut self, other: Accumulator) -> Self {
        for i in 0..self.sums.len() {
            self.sums[i] += other.sums[i];
            self.counts[i] += other.counts[i];
        }
        self
    }

    fn finish(self, names: Vec<String>, reducer: Reducer) -> BandValues {
        names
            .into_iter()
            .zip(self.sums.into_iter().zip(self.counts))
            .map(|(name, (sum, count))| {
                let value = match (count, reducer) {
                    (0, _) => None,
                    (_, Reducer::Sum) => Some(sum),
                    (n, Reducer::Mean) => Some(sum / n as f64),
                };
                (name, value)
            })
            .collect()
    }
}

/// In-memory engine over named scene archives
#[derive(Debug, Default)]
pub struct LocalEngine {
    archives: HashMap<String, Vec<SceneRaster>>,
}

impl LocalEngine {
    pub fn new() -> Self {
        LocalEngine::default()
    }

    /// Register an archive; an archive may be empty
    pub fn with_collection(mut self, id: impl Into<String>, scenes: Vec<SceneRaster>) -> Self {
        self.archives.insert(id.into(), scenes);
        self
    }

    fn eval(&self, image: &Image, cell: &Cell) -> Result<Pixel, EngineError> {
        match image.node() {
            ImageNode::Constant(v) => Ok(vec![Some(*v)]),
            ImageNode::PixelArea => Ok(vec![Some(cell_area_m2(cell))]),
            ImageNode::Composite(spec) => self.eval_composite(spec, cell).map(|v| vec![v]),
            ImageNode::Paint { features, value } => {
                let (lon, lat) = transform_coords(cell.crs, features.crs(), cell.x, cell.y)?;
                Ok(vec![features.covers(lon, lat).then_some(*value)])
            }
            ImageNode::Unary { op, input } => {
                let pixel = self.eval(input, cell)?;
                Ok(pixel.into_iter().map(|v| apply_unary(*op, v)).collect())
            }
            ImageNode::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs, cell)?;
                let right = self.eval(rhs, cell)?;
                broadcast(left, right, |a, b| match (a, b) {
                    (Some(a), Some(b)) => Some(match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Subtract => a - b,
                    }),
                    _ => None,
                })
            }
            ImageNode::UpdateMask { input, mask } => {
                let values = self.eval(input, cell)?;
                let mask = self.eval(mask, cell)?;
                broadcast(values, mask, |v, m| match m {
                    Some(m) if m != 0.0 => v,
                    _ => None,
                })
            }
            ImageNode::Reproject { input, grid } => {
                let (x, y) = transform_coords(cell.crs, grid.crs, cell.x, cell.y)?;
                let (cx, cy) = grid.snap(x, y);
                let fixed = Cell {
                    crs: grid.crs,
                    x: cx,
                    y: cy,
                    scale: grid.scale,
                };
                self.eval(input, &fixed)
            }
            ImageNode::Rename { input, names } => {
                let pixel = self.eval(input, cell)?;
                if pixel.len() != names.len() {
                    return Err(EngineError::Band(format!(
                        "cannot rename {} bands to {:?}",
                        pixel.len(),
                        names
                    )));
                }
                Ok(pixel)
            }
            ImageNode::Concat(images) => {
                let mut pixel = Vec::new();
                for image in images {
                    pixel.extend(self.eval(image, cell)?);
                }
                Ok(pixel)
            }
        }
    }

    fn eval_composite(
        &self,
        spec: &CompositeSpec,
        cell: &Cell,
    ) -> Result<Option<f64>, EngineError> {
        let scenes = self
            .archives
            .get(&spec.collection)
            .ok_or_else(|| EngineError::UnknownCollection(spec.collection.clone()))?;

        let mut values = Vec::new();
        for scene in scenes {
            let in_window = spec.start.map_or(true, |s| scene.date >= s)
                && spec.end.map_or(true, |e| scene.date < e);
            if !in_window {
                continue;
            }
            let band = scene.resolve_band(spec.band.as_deref())?;
            let (x, y) = transform_coords(cell.crs, scene.crs, cell.x, cell.y)?;
            if let Some(v) = scene.sample(band, x, y) {
                values.push(v);
            }
        }

        Ok(match spec.reducer {
            TemporalReducer::Median => median(&mut values),
        })
    }

    /// Accumulate one grid row of a polygonal reduction
    fn scan_row(
        &self,
        request: &ReduceRequest,
        region: &MultiPolygon<f64>,
        row: i64,
        cols: (i64, i64),
        bands: usize,
    ) -> Result<Accumulator, EngineError> {
        let grid = request.grid;
        let mut acc = Accumulator::new(bands);
        for col in cols.0..=cols.1 {
            let (x, y) = grid.cell_center(col, row);
            let Ok((lon, lat)) = transform_coords(grid.crs, Crs::Wgs84, x, y) else {
                continue;
            };
            if !region.contains(&Point::new(lon, lat)) {
                continue;
            }
            let cell = Cell {
                crs: grid.crs,
                x,
                y,
                scale: grid.scale,
            };
            let pixel = self.eval(&request.image, &cell)?;
            if pixel.len() != bands {
                return Err(EngineError::Band(format!(
                    "image produced {} values for {} bands",
                    pixel.len(),
                    bands
                )));
            }
            acc.add(&pixel);
        }
        Ok(acc)
    }

    fn reduce_point(
        &self,
        request: &ReduceRequest,
        point: &Point<f64>,
    ) -> Result<BandValues, EngineError> {
        let names = request.image.band_names();
        let grid = request.grid;
        let (x, y) = transform_coords(Crs::Wgs84, grid.crs, point.x(), point.y())?;
        let (cx, cy) = grid.snap(x, y);
        let cell = Cell {
            crs: grid.crs,
            x: cx,
            y: cy,
            scale: grid.scale,
        };
        let pixel = self.eval(&request.image, &cell)?;
        let mut acc = Accumulator::new(names.len());
        acc.add(&pixel);
        Ok(acc.finish(names, request.reducer))
    }
}

impl ComputeEngine for LocalEngine {
    fn reduce_region(&self, request: &ReduceRequest) -> Result<BandValues, EngineError> {
        let region = match &request.geometry {
            Geometry::Point(point) => return self.reduce_point(request, point),
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_)
            | Geometry::GeometryCollection(_) => polygonal_part(&request.geometry),
            other => {
                return Err(EngineError::UnsupportedGeometry(format!("{:?}", other)));
            }
        };

        let names = request.image.band_names();
        let bands = names.len();
        let Some(rect) = region.bounding_rect() else {
            return Ok(Accumulator::new(bands).finish(names, request.reducer));
        };

        let grid = request.grid;
        let envelope = BoundingBox::from_rect(rect).transform(Crs::Wgs84, grid.crs)?;
        let (min_col, min_row) = grid.cell_index(envelope.min_x, envelope.min_y);
        let (max_col, max_row) = grid.cell_index(envelope.max_x, envelope.max_y);

        let count = ((max_col - min_col + 1) * (max_row - min_row + 1)) as u64;
        if count > request.max_pixels {
            return Err(EngineError::TooManyPixels {
                count,
                max: request.max_pixels,
            });
        }

        #[cfg(feature = "rayon")]
        let rows: Vec<Accumulator> = (min_row..=max_row)
            .into_par_iter()
            .map(|row| self.scan_row(request, &region, row, (min_col, max_col), bands))
            .collect::<Result<_, _>>()?;

        #[cfg(not(feature = "rayon"))]
        let rows: Vec<Accumulator> = (min_row..=max_row)
            .map(|row| self.scan_row(request, &region, row, (min_col, max_col), bands))
            .collect::<Result<_, _>>()?;

        let total = rows
            .into_iter()
            .fold(Accumulator::new(bands), Accumulator::merge);
        Ok(total.finish(names, request.reducer))
    }
}

fn apply_unary(op: UnaryOp, value: Option<f64>) -> Option<f64> {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    match op {
        UnaryOp::Unmask(default) => Some(value.unwrap_or(default)),
        UnaryOp::SelfMask => value.filter(|v| *v != 0.0),
        UnaryOp::Abs => value.map(f64::abs),
        UnaryOp::Multiply(f) => value.map(|v| v * f),
        UnaryOp::Divide(d) => value.map(|v| v / d),
        UnaryOp::Gt(t) => value.map(|v| flag(v > t)),
        UnaryOp::Gte(t) => value.map(|v| flag(v >= t)),
        UnaryOp::Lt(t) => value.map(|v| flag(v < t)),
        UnaryOp::Lte(t) => value.map(|v| flag(v <= t)),
    }
}

/// Combine two pixels band-wise; a single band is applied to every band of the other side
fn broadcast<F>(left: Pixel, right: Pixel, f: F) -> Result<Pixel, EngineError>
where
    F: Fn(Option<f64>, Option<f64>) -> Option<f64>,
{
    match (left.len(), right.len()) {
        (l, r) if l == r => Ok(left.into_iter().zip(right).map(|(a, b)| f(a, b)).collect()),
        (_, 1) => Ok(left.into_iter().map(|a| f(a, right[0])).collect()),
        (1, _) => Ok(right.into_iter().map(|b| f(left[0], b)).collect()),
        (l, r) => Err(EngineError::Band(format!(
            "band count mismatch: {} vs {}",
            l, r
        ))),
    }
}

/// Ground area of a cell: exact on a sphere for geographic grids, scale² otherwise
fn cell_area_m2(cell: &Cell) -> f64 {
    if cell.crs.is_geographic() {
        let half = cell.scale / 2.0;
        let north = (cell.y + half).clamp(-90.0, 90.0).to_radians();
        let south = (cell.y - half).clamp(-90.0, 90.0).to_radians();
        let band = (north.sin() - south.sin()).abs();
        EARTH_RADIUS_M * EARTH_RADIUS_M * cell.scale.to_radians() * band
    } else {
        cell.scale * cell.scale
    }
}

/// Reduce a single band image at one location; convenience for inspection
pub fn sample_at(
    engine: &dyn ComputeEngine,
    image: &Image,
    grid: GridSpec,
    lon: f64,
    lat: f64,
) -> Result<Option<f64>, EngineError> {
    let request = ReduceRequest {
        image: image.clone(),
        geometry: Geometry::Point(Point::new(lon, lat)),
        reducer: Reducer::Mean,
        grid,
        max_pixels: 1,
    };
    let values = engine.reduce_region(&request)?;
    Ok(values.into_values().next().flatten())
}
