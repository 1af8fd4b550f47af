use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, BooleanOps};
use geo_types::{Coord, Geometry as GeoGeometry, Line, LineString, MultiPolygon, Polygon};

use crate::vector::Geometry;

/// Outcome of a validity check, with the first problem found.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityReport {
    pub valid: bool,
    pub reason: Option<String>,
    pub location: Option<(f64, f64)>,
}

impl ValidityReport {
    fn ok() -> Self {
        ValidityReport {
            valid: true,
            reason: None,
            location: None,
        }
    }

    fn invalid(reason: &str, at: Option<Coord<f64>>) -> Self {
        ValidityReport {
            valid: false,
            reason: Some(reason.to_string()),
            location: at.map(|c| (c.x, c.y)),
        }
    }
}

impl Geometry {
    /// Test if the geometry is valid in the OGC simple features sense.
    pub fn is_valid(&self) -> bool {
        self.validity().valid
    }

    /// Check validity and describe the first problem found.
    pub fn validity(&self) -> ValidityReport {
        check_geo(self.inner())
    }
}

fn first_non_finite<'a>(mut coords: impl Iterator<Item = &'a Coord<f64>>) -> Option<Coord<f64>> {
    coords.find(|c| !c.x.is_finite() || !c.y.is_finite()).copied()
}

fn check_geo(g: &GeoGeometry<f64>) -> ValidityReport {
    match g {
        GeoGeometry::Point(p) => {
            if p.x().is_finite() && p.y().is_finite() {
                ValidityReport::ok()
            } else {
                ValidityReport::invalid("Invalid Coordinate", Some(p.0))
            }
        }
        GeoGeometry::MultiPoint(mp) => mp
            .0
            .iter()
            .map(|p| check_geo(&GeoGeometry::Point(*p)))
            .find(|r| !r.valid)
            .unwrap_or_else(ValidityReport::ok),
        GeoGeometry::Line(l) => check_linestring(&LineString::new(vec![l.start, l.end])),
        GeoGeometry::LineString(ls) => check_linestring(ls),
        GeoGeometry::MultiLineString(mls) => mls
            .0
            .iter()
            .map(check_linestring)
            .find(|r| !r.valid)
            .unwrap_or_else(ValidityReport::ok),
        GeoGeometry::Polygon(p) => check_polygon(p),
        GeoGeometry::Rect(_) | GeoGeometry::Triangle(_) => ValidityReport::ok(),
        GeoGeometry::MultiPolygon(mp) => check_multipolygon(mp),
        GeoGeometry::GeometryCollection(gc) => gc
            .0
            .iter()
            .map(check_geo)
            .find(|r| !r.valid)
            .unwrap_or_else(ValidityReport::ok),
    }
}

fn check_linestring(ls: &LineString<f64>) -> ValidityReport {
    if let Some(c) = first_non_finite(ls.0.iter()) {
        return ValidityReport::invalid("Invalid Coordinate", Some(c));
    }
    if ls.0.is_empty() {
        return ValidityReport::ok();
    }
    let distinct = ls.0.windows(2).filter(|w| w[0] != w[1]).count();
    if distinct == 0 {
        return ValidityReport::invalid("Too few points in geometry component", ls.0.first().copied());
    }
    ValidityReport::ok()
}

fn segments(ring: &LineString<f64>) -> Vec<Line<f64>> {
    ring.lines().filter(|l| l.start != l.end).collect()
}

fn check_ring(ring: &LineString<f64>) -> ValidityReport {
    if let Some(c) = first_non_finite(ring.0.iter()) {
        return ValidityReport::invalid("Invalid Coordinate", Some(c));
    }
    if !ring.is_closed() {
        return ValidityReport::invalid("Ring Not Closed", ring.0.first().copied());
    }
    let segs = segments(ring);
    if segs.len() < 3 {
        return ValidityReport::invalid("Too few points in geometry component", ring.0.first().copied());
    }
    let n = segs.len();
    for i in 0..n {
        for j in i + 1..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segs[i], segs[j]) {
                Some(LineIntersection::Collinear { intersection }) => {
                    return ValidityReport::invalid("Self-intersection", Some(intersection.start));
                }
                Some(LineIntersection::SinglePoint { intersection, .. }) if !adjacent => {
                    return ValidityReport::invalid("Ring Self-intersection", Some(intersection));
                }
                _ => {}
            }
        }
    }
    ValidityReport::ok()
}

/// Even-odd point in ring test.
fn point_in_ring(c: Coord<f64>, ring: &LineString<f64>) -> bool {
    let mut inside = false;
    for l in ring.lines() {
        let (a, b) = (l.start, l.end);
        if (a.y > c.y) != (b.y > c.y) {
            let x = a.x + (c.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if c.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

fn check_polygon(p: &Polygon<f64>) -> ValidityReport {
    if p.exterior().0.is_empty() {
        return ValidityReport::ok();
    }
    let rings: Vec<&LineString<f64>> = std::iter::once(p.exterior()).chain(p.interiors()).collect();
    for r in &rings {
        let report = check_ring(r);
        if !report.valid {
            return report;
        }
    }
    for (i, a) in rings.iter().enumerate() {
        for b in rings.iter().skip(i + 1) {
            for sa in segments(a) {
                for sb in segments(b) {
                    match line_intersection(sa, sb) {
                        Some(LineIntersection::SinglePoint {
                            intersection,
                            is_proper: true,
                        }) => {
                            return ValidityReport::invalid("Self-intersection", Some(intersection))
                        }
                        Some(LineIntersection::Collinear { intersection }) => {
                            return ValidityReport::invalid(
                                "Self-intersection",
                                Some(intersection.start),
                            )
                        }
                        _ => {}
                    }
                }
            }
        }
    }
    for hole in p.interiors() {
        let outside = hole
            .0
            .iter()
            .find(|c| !point_in_ring(**c, p.exterior()) && !on_ring(**c, p.exterior()));
        if let Some(c) = outside {
            return ValidityReport::invalid("Hole lies outside shell", Some(*c));
        }
    }
    ValidityReport::ok()
}

fn on_ring(c: Coord<f64>, ring: &LineString<f64>) -> bool {
    ring.lines().any(|l| {
        let cross = (l.end.x - l.start.x) * (c.y - l.start.y) - (l.end.y - l.start.y) * (c.x - l.start.x);
        cross.abs() < 1e-12
            && c.x >= l.start.x.min(l.end.x)
            && c.x <= l.start.x.max(l.end.x)
            && c.y >= l.start.y.min(l.end.y)
            && c.y <= l.start.y.max(l.end.y)
    })
}

fn check_multipolygon(mp: &MultiPolygon<f64>) -> ValidityReport {
    for p in &mp.0 {
        let report = check_polygon(p);
        if !report.valid {
            return report;
        }
    }
    for (i, a) in mp.0.iter().enumerate() {
        for b in mp.0.iter().skip(i + 1) {
            let overlap = a.intersection(b);
            if overlap.unsigned_area() > 0.0 {
                let at = overlap
                    .0
                    .first()
                    .and_then(|p| p.exterior().0.first().copied());
                return ValidityReport::invalid("Self-intersection", at);
            }
        }
    }
    ValidityReport::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_polygon() {
        let g = Geometry::from_wkt("POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0), (2 2, 4 2, 4 4, 2 2))").unwrap();
        assert!(g.is_valid());
    }

    #[test]
    fn test_bowtie() {
        let g = Geometry::from_wkt("POLYGON ((0 0, 10 10, 0 10, 10 0, 0 0))").unwrap();
        let report = g.validity();
        assert!(!report.valid);
        assert_eq!(report.reason.as_deref(), Some("Ring Self-intersection"));
        let (x, y) = report.location.unwrap();
        assert!((x - 5.0).abs() < 1e-9 && (y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_hole_outside() {
        let g = Geometry::from_wkt(
            "POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0), (20 20, 22 20, 22 22, 20 20))",
        )
        .unwrap();
        assert_eq!(g.validity().reason.as_deref(), Some("Hole lies outside shell"));
    }

    #[test]
    fn test_overlapping_multipolygon() {
        let g = Geometry::from_wkt(
            "MULTIPOLYGON (((0 0, 2 0, 2 2, 0 2, 0 0)), ((1 1, 3 1, 3 3, 1 3, 1 1)))",
        )
        .unwrap();
        assert!(!g.is_valid());
    }

    #[test]
    fn test_degenerate_line() {
        let g = Geometry::from_wkt("LINESTRING (0 0, 0 0)").unwrap();
        assert!(!g.is_valid());
    }
}
