use geo::{BooleanOps, Buffer, MapCoords};
use geo_types::{
    Coord, Geometry as GeoGeometry, GeometryCollection, LineString, MultiLineString, MultiPolygon,
    Polygon,
};

use crate::errors::{GdalVecError, Result};
use crate::spatial_ref::{CoordTransform, SpatialRef};
use crate::vector::Geometry;

/// # Geometry Transformations
///
/// These methods provide geometric transformations on a `Geometry`. Every
/// result keeps the spatial reference of its input unless stated otherwise.
impl Geometry {
    /// Apply a coordinate transformation on a clone of `Self`.
    ///
    /// The result carries the target spatial reference of `htransform`.
    pub fn transform(&self, htransform: &CoordTransform) -> Result<Geometry> {
        htransform.transform_geometry(self)
    }

    /// Transforms this geometry's coordinates into another [`SpatialRef`].
    ///
    /// Fails when the geometry has no spatial reference assigned.
    pub fn transform_to(&self, spatial_ref: &SpatialRef) -> Result<Geometry> {
        let source = self.spatial_ref().ok_or_else(|| {
            GdalVecError::BadArgument("geometry has no spatial reference to transform from".into())
        })?;
        let transform = CoordTransform::new(source, spatial_ref)?;
        self.transform(&transform)
    }

    /// Compute a simplified geometry (Douglas-Peucker).
    ///
    /// # Arguments
    /// * `tolerance`: the distance tolerance for the simplification.
    ///
    /// Rings reduced below four points are dropped. A polygon whose exterior
    /// collapses becomes empty.
    pub fn simplify(&self, tolerance: f64) -> Result<Self> {
        if !(tolerance >= 0.0) {
            return Err(GdalVecError::BadArgument(format!(
                "simplify tolerance must be positive, got {tolerance}"
            )));
        }
        Ok(self.with_inner(simplify_geo(self.inner(), tolerance)))
    }

    /// Densify by inserting vertices so that no segment is longer than `max_length`.
    pub fn segmentize(&self, max_length: f64) -> Result<Self> {
        if !(max_length > 0.0) {
            return Err(GdalVecError::BadArgument(format!(
                "segment length must be strictly positive, got {max_length}"
            )));
        }
        Ok(self.with_inner(self.inner().map_coords_linestrings(&|ls| {
            segmentize_line(ls, max_length)
        })))
    }

    /// Swap the X and Y coordinates.
    pub fn swap_xy(&self) -> Self {
        self.with_inner(self.inner().map_coords(|Coord { x, y }| Coord { x: y, y: x }))
    }

    /// Compute buffer of geometry
    ///
    /// # Arguments
    /// * `distance`: the buffer distance to be applied. Should be expressed in
    ///   the same unit as the coordinates of the geometry. Negative distances
    ///   shrink polygons and may collapse them to an empty result.
    ///
    /// Returns a `Polygon` when the result has at most one part, a
    /// `MultiPolygon` otherwise.
    pub fn buffer(&self, distance: f64) -> Result<Self> {
        if !distance.is_finite() {
            return Err(GdalVecError::BadArgument(format!(
                "buffer distance must be finite, got {distance}"
            )));
        }
        let buffered = self.inner().buffer(distance);
        Ok(self.with_inner(polygonal_result(buffered)))
    }

    /// Attempts to make an invalid geometry valid without losing vertices.
    ///
    /// Polygonal inputs are re-noded, so self-intersecting rings are split
    /// into separate polygons. Degenerate lines collapse to empty.
    pub fn make_valid(&self) -> Result<Geometry> {
        Ok(self.with_inner(make_valid_geo(self.inner().clone())))
    }
}

/// `Polygon` for zero or one part, `MultiPolygon` otherwise.
pub(crate) fn polygonal_result(mut mp: MultiPolygon<f64>) -> GeoGeometry<f64> {
    match mp.0.len() {
        0 => GeoGeometry::Polygon(Polygon::new(LineString::new(vec![]), vec![])),
        1 => GeoGeometry::Polygon(mp.0.remove(0)),
        _ => GeoGeometry::MultiPolygon(mp),
    }
}

trait MapLineStrings {
    fn map_coords_linestrings(&self, f: &dyn Fn(&LineString<f64>) -> LineString<f64>) -> Self;
}

impl MapLineStrings for GeoGeometry<f64> {
    fn map_coords_linestrings(&self, f: &dyn Fn(&LineString<f64>) -> LineString<f64>) -> Self {
        let poly = |p: &Polygon<f64>| {
            Polygon::new(f(p.exterior()), p.interiors().iter().map(f).collect())
        };
        match self {
            GeoGeometry::LineString(ls) => GeoGeometry::LineString(f(ls)),
            GeoGeometry::Line(l) => {
                GeoGeometry::LineString(f(&LineString::new(vec![l.start, l.end])))
            }
            GeoGeometry::MultiLineString(mls) => {
                GeoGeometry::MultiLineString(MultiLineString::new(mls.0.iter().map(f).collect()))
            }
            GeoGeometry::Polygon(p) => GeoGeometry::Polygon(poly(p)),
            GeoGeometry::Rect(r) => GeoGeometry::Polygon(poly(&r.to_polygon())),
            GeoGeometry::Triangle(t) => GeoGeometry::Polygon(poly(&t.to_polygon())),
            GeoGeometry::MultiPolygon(mp) => {
                GeoGeometry::MultiPolygon(MultiPolygon::new(mp.0.iter().map(poly).collect()))
            }
            GeoGeometry::GeometryCollection(gc) => {
                GeoGeometry::GeometryCollection(GeometryCollection::new_from(
                    gc.0.iter().map(|g| g.map_coords_linestrings(f)).collect(),
                ))
            }
            other => other.clone(),
        }
    }
}

fn segmentize_line(ls: &LineString<f64>, max_length: f64) -> LineString<f64> {
    let mut out = Vec::with_capacity(ls.0.len());
    for w in ls.0.windows(2) {
        let (a, b) = (w[0], w[1]);
        out.push(a);
        let len = (b.x - a.x).hypot(b.y - a.y);
        if len > max_length {
            let n = (len / max_length).ceil() as usize;
            for i in 1..n {
                let t = i as f64 / n as f64;
                out.push(Coord {
                    x: a.x + (b.x - a.x) * t,
                    y: a.y + (b.y - a.y) * t,
                });
            }
        }
    }
    if let Some(last) = ls.0.last() {
        out.push(*last);
    }
    LineString::new(out)
}

fn perpendicular_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = dx.hypot(dy);
    if len == 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len
}

pub(crate) fn douglas_peucker(coords: &[Coord<f64>], tolerance: f64) -> Vec<Coord<f64>> {
    let n = coords.len();
    if n < 3 {
        return coords.to_vec();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;
    let mut stack = vec![(0, n - 1)];
    while let Some((start, end)) = stack.pop() {
        let mut max_dist = 0.0;
        let mut index = start;
        for i in start + 1..end {
            let d = perpendicular_distance(coords[i], coords[start], coords[end]);
            if d > max_dist {
                max_dist = d;
                index = i;
            }
        }
        if max_dist > tolerance {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }
    coords
        .iter()
        .zip(keep)
        .filter_map(|(c, k)| k.then_some(*c))
        .collect()
}

fn simplify_ring(ring: &LineString<f64>, tolerance: f64) -> Option<LineString<f64>> {
    let simplified = douglas_peucker(&ring.0, tolerance);
    (simplified.len() >= 4).then(|| LineString::new(simplified))
}

fn simplify_polygon(p: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    match simplify_ring(p.exterior(), tolerance) {
        Some(exterior) => Polygon::new(
            exterior,
            p.interiors()
                .iter()
                .filter_map(|r| simplify_ring(r, tolerance))
                .collect(),
        ),
        None => Polygon::new(LineString::new(vec![]), vec![]),
    }
}

fn simplify_geo(g: &GeoGeometry<f64>, tolerance: f64) -> GeoGeometry<f64> {
    match g {
        GeoGeometry::LineString(ls) => {
            GeoGeometry::LineString(LineString::new(douglas_peucker(&ls.0, tolerance)))
        }
        GeoGeometry::MultiLineString(mls) => GeoGeometry::MultiLineString(MultiLineString::new(
            mls.0
                .iter()
                .map(|ls| LineString::new(douglas_peucker(&ls.0, tolerance)))
                .collect(),
        )),
        GeoGeometry::Polygon(p) => GeoGeometry::Polygon(simplify_polygon(p, tolerance)),
        GeoGeometry::Rect(r) => GeoGeometry::Polygon(simplify_polygon(&r.to_polygon(), tolerance)),
        GeoGeometry::Triangle(t) => {
            GeoGeometry::Polygon(simplify_polygon(&t.to_polygon(), tolerance))
        }
        GeoGeometry::MultiPolygon(mp) => GeoGeometry::MultiPolygon(MultiPolygon::new(
            mp.0.iter()
                .map(|p| simplify_polygon(p, tolerance))
                .filter(|p| !p.exterior().0.is_empty())
                .collect(),
        )),
        GeoGeometry::GeometryCollection(gc) => {
            GeoGeometry::GeometryCollection(GeometryCollection::new_from(
                gc.0.iter().map(|g| simplify_geo(g, tolerance)).collect(),
            ))
        }
        other => other.clone(),
    }
}

fn make_valid_geo(g: GeoGeometry<f64>) -> GeoGeometry<f64> {
    let renode = |mp: MultiPolygon<f64>| polygonal_result(mp.union(&MultiPolygon::new(vec![])));
    match g {
        GeoGeometry::Polygon(p) => renode(MultiPolygon::new(vec![p])),
        GeoGeometry::MultiPolygon(mp) => match renode(mp) {
            GeoGeometry::Polygon(p) if !p.exterior().0.is_empty() => {
                GeoGeometry::MultiPolygon(MultiPolygon::new(vec![p]))
            }
            GeoGeometry::Polygon(_) => GeoGeometry::MultiPolygon(MultiPolygon::new(vec![])),
            other => other,
        },
        GeoGeometry::LineString(mut ls) => {
            ls.0.dedup();
            if ls.0.len() < 2 {
                GeoGeometry::LineString(LineString::new(vec![]))
            } else {
                GeoGeometry::LineString(ls)
            }
        }
        GeoGeometry::GeometryCollection(gc) => GeoGeometry::GeometryCollection(
            GeometryCollection::new_from(gc.0.into_iter().map(make_valid_geo).collect()),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_near;
    use crate::vector::GeometryType;
    use geo::Area;

    #[test]
    fn test_simplify() -> Result<()> {
        let line = Geometry::from_wkt("LINESTRING(1.2 0.19,1.63 0.58,1.98 0.65,2.17 0.89)")?;
        let expected = Geometry::from_wkt("LINESTRING (1.2 0.19,2.17 0.89)")?;
        assert_eq!(line.simplify(0.5)?, expected);
        assert!(line.simplify(-1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_simplify_collapses_polygon() -> Result<()> {
        let poly = Geometry::from_wkt("POLYGON ((0 0, 1 0.01, 2 0, 1 -0.01, 0 0))")?;
        let simplified = poly.simplify(1.0)?;
        assert_eq!(simplified.geometry_type(), GeometryType::Polygon);
        assert!(simplified.is_empty());
        Ok(())
    }

    #[test]
    fn test_segmentize() -> Result<()> {
        let line = Geometry::from_wkt("LINESTRING (0 0, 10 0)")?;
        let expected = Geometry::from_wkt("LINESTRING (0 0, 2.5 0, 5 0, 7.5 0, 10 0)")?;
        assert_eq!(line.segmentize(3.0)?, expected);
        assert!(line.segmentize(0.0).is_err());
        Ok(())
    }

    #[test]
    fn test_swap_xy() -> Result<()> {
        let g = Geometry::from_wkt("LINESTRING (1 2, 3 4)")?;
        assert_eq!(g.swap_xy(), Geometry::from_wkt("LINESTRING (2 1, 4 3)")?);
        Ok(())
    }

    #[test]
    pub fn test_buffer() -> Result<()> {
        let geom = Geometry::from_wkt("POINT(0 0)")?;
        let buffered = geom.buffer(10.0)?;
        assert_eq!(buffered.geometry_type(), GeometryType::Polygon);
        assert!(buffered.inner().unsigned_area() > 10.0);
        Ok(())
    }

    #[test]
    pub fn test_negative_buffer_collapses() -> Result<()> {
        let geom = Geometry::from_wkt("POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))")?;
        let buffered = geom.buffer(-1.0)?;
        assert!(buffered.is_empty());
        Ok(())
    }

    #[test]
    pub fn test_make_valid_repairable() -> Result<()> {
        let src = Geometry::from_wkt("POLYGON ((0 0, 10 10, 0 10, 10 0, 0 0))")?;
        assert!(!src.is_valid());
        let dst = src.make_valid()?;
        assert!(dst.is_valid());
        assert_near!(dst.inner().unsigned_area(), 50.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    pub fn test_make_valid_clone() -> Result<()> {
        let src = Geometry::from_wkt("POINT (0 0)")?;
        assert_eq!(src.make_valid()?, src);
        Ok(())
    }
}
