use geo::BooleanOps;
use geo_types::{Geometry as GeoGeometry, MultiPolygon};

use crate::errors::{GdalVecError, Result};
use crate::vector::ops::transformations::polygonal_result;
use crate::vector::Geometry;

pub(crate) fn as_multipolygon(g: &GeoGeometry<f64>) -> Option<MultiPolygon<f64>> {
    match g {
        GeoGeometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        GeoGeometry::MultiPolygon(mp) => Some(mp.clone()),
        GeoGeometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        GeoGeometry::Triangle(t) => Some(MultiPolygon::new(vec![t.to_polygon()])),
        _ => None,
    }
}

/// # Set Operations
///
/// These methods provide set operations over two polygonal geometries,
/// producing a new geometry with the spatial reference of `self`.
impl Geometry {
    fn polygonal_op(
        &self,
        other: &Self,
        method_name: &'static str,
        op: impl Fn(&MultiPolygon<f64>, &MultiPolygon<f64>) -> MultiPolygon<f64>,
    ) -> Result<Self> {
        let (a, b) = match (as_multipolygon(self.inner()), as_multipolygon(other.inner())) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(GdalVecError::GeometryEngine {
                    method_name,
                    msg: format!(
                        "only polygonal geometries are supported, got {} and {}",
                        self.geometry_name(),
                        other.geometry_name()
                    ),
                })
            }
        };
        Ok(self.with_inner(polygonal_result(op(&a, &b))))
    }

    /// Compute intersection.
    ///
    /// Generates a new geometry which is the region of intersection of
    /// the two geometries operated on.
    pub fn intersection(&self, other: &Self) -> Result<Self> {
        self.polygonal_op(other, "intersection", |a, b| a.intersection(b))
    }

    pub fn union(&self, other: &Self) -> Result<Self> {
        self.polygonal_op(other, "union", |a, b| a.union(b))
    }

    pub fn difference(&self, other: &Self) -> Result<Self> {
        self.polygonal_op(other, "difference", |a, b| a.difference(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_near;

    #[test]
    fn test_intersection() -> Result<()> {
        let a = Geometry::from_wkt("POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))")?;
        let b = Geometry::from_wkt("POLYGON ((1 1, 3 1, 3 3, 1 3, 1 1))")?;
        assert_near!(a.intersection(&b)?.area(), 1.0, epsilon = 1e-9);
        assert_near!(a.union(&b)?.area(), 7.0, epsilon = 1e-9);
        assert_near!(a.difference(&b)?.area(), 3.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_non_polygonal() {
        let a = Geometry::from_wkt("POINT (0 0)").unwrap();
        assert!(a.intersection(&a).is_err());
    }
}
