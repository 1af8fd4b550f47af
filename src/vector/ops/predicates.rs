use geo::{Area, Intersects};

use crate::vector::Geometry;

/// # Geometric Predicates
///
/// These methods provide common [spatial relations](https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates)
/// and measures between geometries.
impl Geometry {
    /// Tests if two geometries [_intersect_][DE-9IM];
    /// `self` and `other` have at least one point in common.
    ///
    /// [DE-9IM]: https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates
    pub fn intersects(&self, other: &Self) -> bool {
        self.inner().intersects(other.inner())
    }

    /// Tests if this geometry and the other geometry are disjoint.
    pub fn disjoint(&self, other: &Self) -> bool {
        !self.intersects(other)
    }

    /// Compute geometry area in the units of its coordinates. Zero for
    /// points and lines.
    pub fn area(&self) -> f64 {
        self.inner().unsigned_area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_near;

    #[test]
    fn test_intersects() {
        let a = Geometry::from_wkt("POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))").unwrap();
        let b = Geometry::from_wkt("POINT (1 1)").unwrap();
        let c = Geometry::from_wkt("POINT (5 5)").unwrap();
        assert!(a.intersects(&b));
        assert!(a.disjoint(&c));
        assert_near!(a.area(), 4.0);
    }
}
