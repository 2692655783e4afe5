use geo::{coord, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::commons::albers::{sinusoidal_forward, sinusoidal_inverse, AlbersEqualArea};

/// Coordinate reference systems known to the explorer
///
/// EPSG:4326, EPSG:3577 and the MODIS sinusoidal grid are projected with
/// built-in formulas; any other EPSG code needs the `proj` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// Geographic WGS84 (EPSG:4326), axis order lon/lat
    Wgs84,
    /// GDA94 / Australian Albers (EPSG:3577), the national equal-area CRS
    AustralianAlbers,
    /// MODIS sinusoidal (SR-ORG:6974), native grid of MOD13Q1
    ModisSinusoidal,
    /// Any other EPSG code
    Epsg(u32),
}

impl Crs {
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => write!(f, "EPSG:4326"),
            Crs::AustralianAlbers => write!(f, "EPSG:3577"),
            Crs::ModisSinusoidal => write!(f, "SR-ORG:6974"),
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
        }
    }
}

impl FromStr for Crs {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == "SR-ORG:6974" {
            return Ok(Crs::ModisSinusoidal);
        }
        let code = upper
            .strip_prefix("EPSG:")
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| ProjectionError::UnknownCrs(s.to_string()))?;
        Ok(match code {
            4326 => Crs::Wgs84,
            3577 => Crs::AustralianAlbers,
            other => Crs::Epsg(other),
        })
    }
}

impl TryFrom<String> for Crs {
    type Error = ProjectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

/// Coordinate transformation failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    #[error("Unknown CRS identifier: {0}")]
    UnknownCrs(String),

    #[error("No transformation from {from} to {to} (enable the `proj` feature)")]
    Unsupported { from: Crs, to: Crs },

    #[error("Coordinate ({x}, {y}) is outside the domain of {crs}")]
    OutOfDomain { crs: Crs, x: f64, y: f64 },

    #[error("PROJ error: {0}")]
    Proj(String),
}

/// A fixed projection: CRS plus pixel size in CRS units
///
/// Cells are aligned on the CRS origin, so two grids with the same spec
/// always share cell boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub crs: Crs,
    pub scale: f64,
}

impl GridSpec {
    pub fn new(crs: Crs, scale: f64) -> Self {
        GridSpec { crs, scale }
    }

    /// GDA94 / Australian Albers at the MOD13Q1 nominal 250 m
    pub fn australian_albers_250m() -> Self {
        GridSpec::new(Crs::AustralianAlbers, 250.0)
    }

    /// MOD13Q1 native grid (sinusoidal, 231.656 m)
    pub fn modis_250m() -> Self {
        GridSpec::new(Crs::ModisSinusoidal, 231.656_358_263_958_3)
    }

    /// Column/row of the cell holding (x, y); rows increase northwards.
    pub fn cell_index(&self, x: f64, y: f64) -> (i64, i64) {
        ((x / self.scale).floor() as i64, (y / self.scale).floor() as i64)
    }

    /// Center of the cell at (col, row)
    pub fn cell_center(&self, col: i64, row: i64) -> (f64, f64) {
        (
            (col as f64 + 0.5) * self.scale,
            (row as f64 + 0.5) * self.scale,
        )
    }

    /// Center of the cell holding (x, y)
    pub fn snap(&self, x: f64, y: f64) -> (f64, f64) {
        let (col, row) = self.cell_index(x, y);
        self.cell_center(col, row)
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.crs, self.scale)
    }
}

/// Transform coordinates from one CRS to another
///
/// Built-in projections go through geographic WGS84; GDA94 and WGS84 are
/// treated as coincident, which is within the 250 m grid tolerance.
pub fn transform_coords(from: Crs, to: Crs, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
    if from == to {
        return Ok((x, y));
    }

    let (lon, lat) = match from {
        Crs::Wgs84 => (x, y),
        Crs::AustralianAlbers => australian_albers()
            .inverse(x, y)
            .ok_or(ProjectionError::OutOfDomain { crs: from, x, y })?,
        Crs::ModisSinusoidal => {
            sinusoidal_inverse(x, y).ok_or(ProjectionError::OutOfDomain { crs: from, x, y })?
        }
        Crs::Epsg(_) => return proj_transform(from, to, x, y),
    };

    match to {
        Crs::Wgs84 => Ok((lon, lat)),
        Crs::AustralianAlbers => Ok(australian_albers().forward(lon, lat)),
        Crs::ModisSinusoidal => Ok(sinusoidal_forward(lon, lat)),
        Crs::Epsg(_) => proj_transform(Crs::Wgs84, to, lon, lat),
    }
}

fn australian_albers() -> &'static AlbersEqualArea {
    static ALBERS: OnceLock<AlbersEqualArea> = OnceLock::new();
    ALBERS.get_or_init(AlbersEqualArea::australian_albers)
}

#[cfg(feature = "proj")]
fn proj_transform(from: Crs, to: Crs, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
    use proj::Proj;

    let proj = Proj::new_known_crs(&from.to_string(), &to.to_string(), None)
        .map_err(|e| ProjectionError::Proj(e.to_string()))?;
    proj.convert((x, y))
        .map_err(|e| ProjectionError::Proj(e.to_string()))
}

#[cfg(not(feature = "proj"))]
fn proj_transform(from: Crs, to: Crs, _x: f64, _y: f64) -> Result<(f64, f64), ProjectionError> {
    Err(ProjectionError::Unsupported { from, to })
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    /// Smallest box covering both
    pub fn union(&self, other: &BoundingBox) -> Self {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Transform bounding box to another CRS
    ///
    /// Edges are densified before transforming so curved projected edges
    /// stay inside the returned envelope.
    pub fn transform(&self, from: Crs, to: Crs) -> Result<Self, ProjectionError> {
        const STEPS: usize = 16;

        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;

        for i in 0..=STEPS {
            let t = i as f64 / STEPS as f64;
            let x = self.min_x + t * (self.max_x - self.min_x);
            let y = self.min_y + t * (self.max_y - self.min_y);
            for &(px, py) in &[
                (x, self.min_y),
                (x, self.max_y),
                (self.min_x, y),
                (self.max_x, y),
            ] {
                let (tx, ty) = transform_coords(from, to, px, py)?;
                min_x = min_x.min(tx);
                min_y = min_y.min(ty);
                max_x = max_x.max(tx);
                max_y = max_y.max(ty);
            }
        }

        Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
    }

    /// Closed rectangular polygon
    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                coord! { x: self.min_x, y: self.min_y },
                coord! { x: self.max_x, y: self.min_y },
                coord! { x: self.max_x, y: self.max_y },
                coord! { x: self.min_x, y: self.max_y },
                coord! { x: self.min_x, y: self.min_y },
            ]),
            vec![],
        )
    }
}
