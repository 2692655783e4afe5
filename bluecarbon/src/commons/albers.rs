//! Pure-Rust equal-area projections (Snyder 1987, USGS Professional Paper 1395).
//!
//! Covers the two projections the explorer needs without libproj:
//! GDA94 / Australian Albers (EPSG:3577) on the GRS80 ellipsoid, and the
//! spherical MODIS sinusoidal grid (SR-ORG:6974).

// GRS80 ellipsoid
const GRS80_A: f64 = 6_378_137.0;
const GRS80_F: f64 = 1.0 / 298.257_222_101;

/// Sphere radius of the MODIS land products grid
pub const MODIS_SPHERE_RADIUS: f64 = 6_371_007.181;

const MAX_ITERATIONS: usize = 15;
const CONVERGENCE: f64 = 1e-12;

/// Albers equal-area conic on an ellipsoid.
#[derive(Debug, Clone, Copy)]
pub struct AlbersEqualArea {
    a: f64,
    e: f64,
    e2: f64,
    lon0: f64,
    n: f64,
    c: f64,
    rho0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl AlbersEqualArea {
    /// Build a projection from its defining parameters (degrees).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        a: f64,
        f: f64,
        lat0: f64,
        lon0: f64,
        lat1: f64,
        lat2: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let e2 = 2.0 * f - f * f;
        let e = e2.sqrt();
        let (phi0, phi1, phi2) = (lat0.to_radians(), lat1.to_radians(), lat2.to_radians());

        let m1 = m(phi1, e2);
        let m2 = m(phi2, e2);
        let q0 = q(phi0, e, e2);
        let q1 = q(phi1, e, e2);
        let q2 = q(phi2, e, e2);

        let n = if (phi1 - phi2).abs() < f64::EPSILON {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = m1 * m1 + n * q1;
        let rho0 = a * (c - n * q0).sqrt() / n;

        AlbersEqualArea {
            a,
            e,
            e2,
            lon0: lon0.to_radians(),
            n,
            c,
            rho0,
            false_easting,
            false_northing,
        }
    }

    /// GDA94 / Australian Albers (EPSG:3577)
    pub fn australian_albers() -> Self {
        AlbersEqualArea::new(GRS80_A, GRS80_F, 0.0, 132.0, -18.0, -36.0, 0.0, 0.0)
    }

    /// Geographic (lon, lat in degrees) to projected metres.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let phi = lat.to_radians();
        let rho = self.a * (self.c - self.n * q(phi, self.e, self.e2)).max(0.0).sqrt() / self.n;
        let theta = self.n * wrap_pi(lon.to_radians() - self.lon0);

        let x = rho * theta.sin() + self.false_easting;
        let y = self.rho0 - rho * theta.cos() + self.false_northing;
        (x, y)
    }

    /// Projected metres to geographic degrees. `None` outside the projection domain.
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let x = x - self.false_easting;
        let dy = self.rho0 - (y - self.false_northing);

        let mut rho = (x * x + dy * dy).sqrt();
        let theta = if self.n < 0.0 {
            rho = -rho;
            (-x).atan2(-dy)
        } else {
            x.atan2(dy)
        };

        let q_val = (self.c - rho * rho * self.n * self.n / (self.a * self.a)) / self.n;
        let phi = self.phi_from_q(q_val)?;
        let lon = (self.lon0 + theta / self.n).to_degrees();

        Some((lon, phi.to_degrees()))
    }

    /// Iterative inversion of the authalic q function (Snyder eq. 3-16).
    fn phi_from_q(&self, q_val: f64) -> Option<f64> {
        let e = self.e;
        let e2 = self.e2;
        let q_pole = q(std::f64::consts::FRAC_PI_2, e, e2);
        if q_val.abs() > q_pole + 1e-9 {
            return None;
        }
        if (q_val.abs() - q_pole).abs() < 1e-12 {
            return Some(std::f64::consts::FRAC_PI_2.copysign(q_val));
        }

        let mut phi = (q_val / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..MAX_ITERATIONS {
            let sin_phi = phi.sin();
            let cos_phi = phi.cos();
            let one_minus = 1.0 - e2 * sin_phi * sin_phi;
            let log_term = ((1.0 - e * sin_phi) / (1.0 + e * sin_phi)).ln() / (2.0 * e);
            let scale = one_minus * one_minus / (2.0 * cos_phi);
            let delta = scale * (q_val / (1.0 - e2) - sin_phi / one_minus + log_term);
            phi += delta;
            if delta.abs() < CONVERGENCE {
                return Some(phi);
            }
        }
        Some(phi)
    }
}

/// MODIS sinusoidal forward projection (degrees to metres).
pub fn sinusoidal_forward(lon: f64, lat: f64) -> (f64, f64) {
    let phi = lat.to_radians();
    let lambda = wrap_pi(lon.to_radians());
    (
        MODIS_SPHERE_RADIUS * lambda * phi.cos(),
        MODIS_SPHERE_RADIUS * phi,
    )
}

/// MODIS sinusoidal inverse projection. `None` off the projected ellipse.
pub fn sinusoidal_inverse(x: f64, y: f64) -> Option<(f64, f64)> {
    let phi = y / MODIS_SPHERE_RADIUS;
    if phi.abs() > std::f64::consts::FRAC_PI_2 {
        return None;
    }
    let cos_phi = phi.cos();
    if cos_phi.abs() < 1e-12 {
        return Some((0.0, phi.to_degrees()));
    }
    let lambda = x / (MODIS_SPHERE_RADIUS * cos_phi);
    if lambda.abs() > std::f64::consts::PI {
        return None;
    }
    Some((lambda.to_degrees(), phi.to_degrees()))
}

fn m(phi: f64, e2: f64) -> f64 {
    let s = phi.sin();
    phi.cos() / (1.0 - e2 * s * s).sqrt()
}

fn q(phi: f64, e: f64, e2: f64) -> f64 {
    let s = phi.sin();
    (1.0 - e2) * (s / (1.0 - e2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln())
}

fn wrap_pi(angle: f64) -> f64 {
    use std::f64::consts::PI;
    let mut a = angle;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    const CITIES: [(f64, f64); 4] = [
        (151.2, -33.9),
        (115.8, -31.9),
        (145.0, -42.9),
        (130.8, -12.4),
    ];

    #[test]
    fn test_albers_origin() {
        let albers = AlbersEqualArea::australian_albers();
        let (x, y) = albers.forward(132.0, 0.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_albers_round_trip() {
        let albers = AlbersEqualArea::australian_albers();
        for (lon, lat) in CITIES {
            let (x, y) = albers.forward(lon, lat);
            let (lon2, lat2) = albers.inverse(x, y).unwrap();
            assert!((lon - lon2).abs() < 1e-8, "lon {} vs {}", lon, lon2);
            assert!((lat - lat2).abs() < 1e-8, "lat {} vs {}", lat, lat2);
        }
    }

    #[test]
    fn test_albers_southern_is_negative_northing() {
        // Australian Albers puts the mainland at negative northings
        let albers = AlbersEqualArea::australian_albers();
        let (x, y) = albers.forward(151.2, -33.9);
        assert!(x > 0.0);
        assert!(y < 0.0);
    }

    #[cfg(feature = "proj")]
    #[test]
    fn test_albers_agrees_with_proj() {
        use proj::Proj;

        let albers = AlbersEqualArea::australian_albers();
        let proj = Proj::new_known_crs("EPSG:4326", "EPSG:3577", None).unwrap();
        for (lon, lat) in CITIES {
            let (x, y) = albers.forward(lon, lat);
            let (px, py) = proj.convert((lon, lat)).unwrap();
            // GDA94 and WGS84 differ by about a metre
            assert!((x - px).abs() < 2.0, "x {} vs {}", x, px);
            assert!((y - py).abs() < 2.0, "y {} vs {}", y, py);
        }
    }

    #[test]
    fn test_sinusoidal_round_trip() {
        let (x, y) = sinusoidal_forward(151.2, -33.9);
        let (lon, lat) = sinusoidal_inverse(x, y).unwrap();
        assert!((lon - 151.2).abs() < 1e-9);
        assert!((lat + 33.9).abs() < 1e-9);
    }

    #[test]
    fn test_sinusoidal_off_ellipse() {
        let (_, y) = sinusoidal_forward(0.0, 60.0);
        assert!(sinusoidal_inverse(2.0e7, y).is_none());
    }
}
