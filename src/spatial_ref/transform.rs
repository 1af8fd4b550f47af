use std::f64::consts::PI;

use geo::MapCoords;
use geo_types::Coord;

use crate::errors::{GdalVecError, Result};
use crate::spatial_ref::SpatialRef;
use crate::vector::Geometry;

const EARTH_RADIUS: f64 = 6_378_137.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Identity,
    GeographicToMercator,
    MercatorToGeographic,
}

#[derive(Debug, Clone)]
/// Defines a coordinate transformation from one [`SpatialRef`] to another.
pub struct CoordTransform {
    method: Method,
    from: String,
    to: String,
    target: SpatialRef,
}

impl CoordTransform {
    /// Constructs a new transformation from `source` to `target`.
    pub fn new(source: &SpatialRef, target: &SpatialRef) -> Result<CoordTransform> {
        let method = if source == target {
            Method::Identity
        } else {
            match (source.epsg(), target.epsg()) {
                (Some(4326), Some(3857)) => Method::GeographicToMercator,
                (Some(3857), Some(4326)) => Method::MercatorToGeographic,
                _ => {
                    return Err(GdalVecError::InvalidCoordinateRange {
                        from: source.to_string(),
                        to: target.to_string(),
                        msg: Some("no transformation available".to_string()),
                    })
                }
            }
        };
        Ok(Self {
            method,
            from: source.to_string(),
            to: target.to_string(),
            target: target.clone(),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.method == Method::Identity
    }

    fn transform_one(&self, c: Coord) -> Result<Coord> {
        match self.method {
            Method::Identity => Ok(c),
            Method::GeographicToMercator => {
                if !(-180.0..=180.0).contains(&c.x) || c.y.abs() > MAX_MERCATOR_LAT {
                    return Err(GdalVecError::InvalidCoordinateRange {
                        from: self.from.clone(),
                        to: self.to.clone(),
                        msg: Some(format!("({}, {}) outside of valid range", c.x, c.y)),
                    });
                }
                let x = EARTH_RADIUS * c.x.to_radians();
                let y = EARTH_RADIUS * (PI / 4.0 + c.y.to_radians() / 2.0).tan().ln();
                Ok(Coord { x, y })
            }
            Method::MercatorToGeographic => {
                let lon = (c.x / EARTH_RADIUS).to_degrees();
                let lat = (2.0 * (c.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
                Ok(Coord { x: lon, y: lat })
            }
        }
    }

    /// Transform coordinates in place.
    ///
    /// # Arguments
    /// * `x` - slice of x coordinates
    /// * `y` - slice of y coordinates (must match the length of `x`)
    pub fn transform_coords(&self, x: &mut [f64], y: &mut [f64]) -> Result<()> {
        if x.len() != y.len() {
            return Err(GdalVecError::BadArgument(format!(
                "x and y must have the same length, got {} and {}",
                x.len(),
                y.len()
            )));
        }
        for (xi, yi) in x.iter_mut().zip(y.iter_mut()) {
            let c = self.transform_one(Coord { x: *xi, y: *yi })?;
            *xi = c.x;
            *yi = c.y;
        }
        Ok(())
    }

    /// Transform a geometry, assigning the target spatial reference to the result.
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry> {
        let transformed = geom.inner().try_map_coords(|c| self.transform_one(c))?;
        let mut out = Geometry::from(transformed);
        out.set_spatial_ref(Some(self.target.clone()));
        Ok(out)
    }
}
