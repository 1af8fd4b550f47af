use std::fmt::{Display, Formatter};

use geo::BoundingRect;
use geo_types::{
    Geometry as GeoGeometry, GeometryCollection, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon,
};
use serde::{Deserialize, Serialize};
use wkt::{ToWkt, TryFromWkt};

use crate::errors::{GdalVecError, Result};
use crate::spatial_ref::SpatialRef;
use crate::vector::layer::Envelope;

/// Geometry type of a geometry field or a geometry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    /// Any geometry type.
    Unknown,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
    /// No geometry at all.
    None,
}

impl GeometryType {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryType::Unknown => "Unknown (any)",
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::GeometryCollection => "GeometryCollection",
            GeometryType::None => "None",
        }
    }

    /// Parse a geometry type name as accepted on command lines (case-insensitive).
    pub fn from_name(name: &str) -> Option<GeometryType> {
        let t = match name.to_ascii_uppercase().as_str() {
            "GEOMETRY" | "UNKNOWN" => GeometryType::Unknown,
            "POINT" => GeometryType::Point,
            "LINESTRING" | "LINE" => GeometryType::LineString,
            "POLYGON" => GeometryType::Polygon,
            "MULTIPOINT" => GeometryType::MultiPoint,
            "MULTILINESTRING" => GeometryType::MultiLineString,
            "MULTIPOLYGON" => GeometryType::MultiPolygon,
            "GEOMETRYCOLLECTION" => GeometryType::GeometryCollection,
            "NONE" => GeometryType::None,
            _ => return None,
        };
        Some(t)
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            GeometryType::MultiPoint
                | GeometryType::MultiLineString
                | GeometryType::MultiPolygon
                | GeometryType::GeometryCollection
        )
    }

    pub fn is_polygonal(&self) -> bool {
        matches!(self, GeometryType::Polygon | GeometryType::MultiPolygon)
    }

    /// The multi variant of a single type. Collections map to themselves.
    pub fn to_multi(&self) -> GeometryType {
        match self {
            GeometryType::Point => GeometryType::MultiPoint,
            GeometryType::LineString => GeometryType::MultiLineString,
            GeometryType::Polygon => GeometryType::MultiPolygon,
            other => *other,
        }
    }

    /// The single variant of a multi type. `GeometryCollection` maps to `Unknown`.
    pub fn to_single(&self) -> GeometryType {
        match self {
            GeometryType::MultiPoint => GeometryType::Point,
            GeometryType::MultiLineString => GeometryType::LineString,
            GeometryType::MultiPolygon => GeometryType::Polygon,
            GeometryType::GeometryCollection => GeometryType::Unknown,
            other => *other,
        }
    }
}

impl Display for GeometryType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A 2D geometry value, optionally tagged with its spatial reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    inner: GeoGeometry<f64>,
    spatial_ref: Option<SpatialRef>,
}

impl From<GeoGeometry<f64>> for Geometry {
    fn from(inner: GeoGeometry<f64>) -> Self {
        Geometry {
            inner,
            spatial_ref: None,
        }
    }
}

impl Geometry {
    /// Create a geometry by parsing a
    /// [WKT](https://en.wikipedia.org/wiki/Well-known_text_representation_of_geometry) string.
    pub fn from_wkt(wkt: &str) -> Result<Geometry> {
        let inner = GeoGeometry::<f64>::try_from_wkt_str(wkt)
            .map_err(|e| GdalVecError::Wkt(format!("{wkt}: {e}")))?;
        Ok(Geometry::from(inner))
    }

    /// Creates a rectangular geometry from West, South, East and North values.
    pub fn bbox(w: f64, s: f64, e: f64, n: f64) -> Geometry {
        let rect = geo_types::Rect::new((w, s), (e, n));
        Geometry::from(GeoGeometry::Polygon(rect.to_polygon()))
    }

    /// An empty geometry of the given type.
    pub fn empty(geometry_type: GeometryType) -> Geometry {
        let inner = match geometry_type {
            GeometryType::LineString => GeoGeometry::LineString(LineString::new(vec![])),
            GeometryType::Polygon => {
                GeoGeometry::Polygon(Polygon::new(LineString::new(vec![]), vec![]))
            }
            GeometryType::MultiPoint => GeoGeometry::MultiPoint(MultiPoint::new(vec![])),
            GeometryType::MultiLineString => {
                GeoGeometry::MultiLineString(MultiLineString::new(vec![]))
            }
            GeometryType::MultiPolygon => GeoGeometry::MultiPolygon(MultiPolygon::new(vec![])),
            _ => GeoGeometry::GeometryCollection(GeometryCollection::new_from(vec![])),
        };
        Geometry::from(inner)
    }

    /// Serialize the geometry as WKT.
    pub fn wkt(&self) -> Result<String> {
        Ok(self.inner.wkt_string())
    }

    pub fn inner(&self) -> &GeoGeometry<f64> {
        &self.inner
    }

    pub fn into_inner(self) -> GeoGeometry<f64> {
        self.inner
    }

    pub fn spatial_ref(&self) -> Option<&SpatialRef> {
        self.spatial_ref.as_ref()
    }

    pub fn set_spatial_ref(&mut self, spatial_ref: Option<SpatialRef>) {
        self.spatial_ref = spatial_ref;
    }

    /// Replace the coordinates, keeping the spatial reference.
    pub fn with_inner(&self, inner: GeoGeometry<f64>) -> Geometry {
        Geometry {
            inner,
            spatial_ref: self.spatial_ref.clone(),
        }
    }

    pub fn geometry_type(&self) -> GeometryType {
        match self.inner {
            GeoGeometry::Point(_) => GeometryType::Point,
            GeoGeometry::Line(_) | GeoGeometry::LineString(_) => GeometryType::LineString,
            GeoGeometry::Polygon(_) | GeoGeometry::Rect(_) | GeoGeometry::Triangle(_) => {
                GeometryType::Polygon
            }
            GeoGeometry::MultiPoint(_) => GeometryType::MultiPoint,
            GeoGeometry::MultiLineString(_) => GeometryType::MultiLineString,
            GeoGeometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            GeoGeometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    pub fn geometry_name(&self) -> &'static str {
        self.geometry_type().name()
    }

    pub fn is_empty(&self) -> bool {
        geo_is_empty(&self.inner)
    }

    /// Number of parts of a collection, 0 for single geometries.
    pub fn geometry_count(&self) -> usize {
        match self.inner {
            GeoGeometry::MultiPoint(ref g) => g.0.len(),
            GeoGeometry::MultiLineString(ref g) => g.0.len(),
            GeoGeometry::MultiPolygon(ref g) => g.0.len(),
            GeoGeometry::GeometryCollection(ref g) => g.0.len(),
            _ => 0,
        }
    }

    /// Split a collection into its parts, each carrying this geometry's spatial
    /// reference. A single geometry yields itself.
    pub fn into_parts(self) -> Vec<Geometry> {
        let srs = self.spatial_ref;
        let parts: Vec<GeoGeometry<f64>> = match self.inner {
            GeoGeometry::MultiPoint(g) => g.0.into_iter().map(GeoGeometry::Point).collect(),
            GeoGeometry::MultiLineString(g) => {
                g.0.into_iter().map(GeoGeometry::LineString).collect()
            }
            GeoGeometry::MultiPolygon(g) => g.0.into_iter().map(GeoGeometry::Polygon).collect(),
            GeoGeometry::GeometryCollection(g) => g.0,
            other => vec![other],
        };
        parts
            .into_iter()
            .map(|inner| Geometry {
                inner,
                spatial_ref: srs.clone(),
            })
            .collect()
    }

    /// Computes and returns the axis-aligned 2D bounding envelope for this geometry.
    pub fn envelope(&self) -> Option<Envelope> {
        self.inner.bounding_rect().map(Envelope::from)
    }

    /// Convert to another geometry type where a lossless conversion exists.
    ///
    /// Mirrors `OGRGeometryFactory::forceTo`: single geometries are wrapped
    /// into the matching multi type, one-part collections are unwrapped,
    /// closed linestrings become polygons and polygon rings become linestrings.
    /// When no conversion applies the geometry is returned unchanged, so callers
    /// must check the resulting type.
    pub fn force_to(self, target: GeometryType) -> Geometry {
        let srs = self.spatial_ref;
        let inner = force_geo(self.inner, target);
        Geometry {
            inner,
            spatial_ref: srs,
        }
    }
}

fn geo_is_empty(g: &GeoGeometry<f64>) -> bool {
    match g {
        GeoGeometry::Point(_) | GeoGeometry::Line(_) | GeoGeometry::Rect(_) => false,
        GeoGeometry::Triangle(_) => false,
        GeoGeometry::LineString(ls) => ls.0.is_empty(),
        GeoGeometry::Polygon(p) => p.exterior().0.is_empty(),
        GeoGeometry::MultiPoint(mp) => mp.0.is_empty(),
        GeoGeometry::MultiLineString(mls) => mls.0.iter().all(|ls| ls.0.is_empty()),
        GeoGeometry::MultiPolygon(mp) => mp.0.iter().all(|p| p.exterior().0.is_empty()),
        GeoGeometry::GeometryCollection(gc) => gc.0.iter().all(geo_is_empty),
    }
}

fn normalize(g: GeoGeometry<f64>) -> GeoGeometry<f64> {
    match g {
        GeoGeometry::Line(l) => GeoGeometry::LineString(LineString::new(vec![l.start, l.end])),
        GeoGeometry::Rect(r) => GeoGeometry::Polygon(r.to_polygon()),
        GeoGeometry::Triangle(t) => GeoGeometry::Polygon(t.to_polygon()),
        other => other,
    }
}

fn rings_of(p: Polygon<f64>) -> Vec<LineString<f64>> {
    let (exterior, interiors) = p.into_inner();
    std::iter::once(exterior)
        .chain(interiors)
        .filter(|r| !r.0.is_empty())
        .collect()
}

fn force_geo(g: GeoGeometry<f64>, target: GeometryType) -> GeoGeometry<f64> {
    let g = normalize(g);
    match (target, g) {
        (GeometryType::Point, GeoGeometry::MultiPoint(mut mp)) if mp.0.len() == 1 => {
            GeoGeometry::Point(mp.0.remove(0))
        }
        (GeometryType::MultiPoint, GeoGeometry::Point(p)) => {
            GeoGeometry::MultiPoint(MultiPoint::new(vec![p]))
        }
        (GeometryType::MultiPoint, GeoGeometry::GeometryCollection(gc))
            if gc.0.iter().all(|g| matches!(g, GeoGeometry::Point(_))) =>
        {
            let points: Vec<Point<f64>> = gc
                .0
                .into_iter()
                .filter_map(|g| match g {
                    GeoGeometry::Point(p) => Some(p),
                    _ => None,
                })
                .collect();
            GeoGeometry::MultiPoint(MultiPoint::new(points))
        }
        (GeometryType::LineString, GeoGeometry::MultiLineString(mut mls)) if mls.0.len() == 1 => {
            GeoGeometry::LineString(mls.0.remove(0))
        }
        (GeometryType::LineString, GeoGeometry::Polygon(p)) if p.interiors().is_empty() => {
            GeoGeometry::LineString(p.into_inner().0)
        }
        (GeometryType::MultiLineString, GeoGeometry::LineString(ls)) => {
            GeoGeometry::MultiLineString(MultiLineString::new(vec![ls]))
        }
        (GeometryType::MultiLineString, GeoGeometry::Polygon(p)) => {
            GeoGeometry::MultiLineString(MultiLineString::new(rings_of(p)))
        }
        (GeometryType::MultiLineString, GeoGeometry::MultiPolygon(mp)) => {
            GeoGeometry::MultiLineString(MultiLineString::new(
                mp.0.into_iter().flat_map(rings_of).collect(),
            ))
        }
        (GeometryType::Polygon, GeoGeometry::MultiPolygon(mut mp)) if mp.0.len() == 1 => {
            GeoGeometry::Polygon(mp.0.remove(0))
        }
        (GeometryType::Polygon, GeoGeometry::MultiPolygon(mp)) if mp.0.is_empty() => {
            GeoGeometry::Polygon(Polygon::new(LineString::new(vec![]), vec![]))
        }
        (GeometryType::Polygon, GeoGeometry::LineString(ls)) if ls.is_closed() && ls.0.len() >= 4 => {
            GeoGeometry::Polygon(Polygon::new(ls, vec![]))
        }
        (GeometryType::MultiPolygon, GeoGeometry::Polygon(p)) => {
            if p.exterior().0.is_empty() {
                GeoGeometry::MultiPolygon(MultiPolygon::new(vec![]))
            } else {
                GeoGeometry::MultiPolygon(MultiPolygon::new(vec![p]))
            }
        }
        (GeometryType::MultiPolygon, GeoGeometry::GeometryCollection(gc))
            if gc
                .0
                .iter()
                .all(|g| matches!(g, GeoGeometry::Polygon(_) | GeoGeometry::MultiPolygon(_))) =>
        {
            let polygons = gc
                .0
                .into_iter()
                .flat_map(|g| match g {
                    GeoGeometry::Polygon(p) => vec![p],
                    GeoGeometry::MultiPolygon(mp) => mp.0,
                    _ => vec![],
                })
                .collect();
            GeoGeometry::MultiPolygon(MultiPolygon::new(polygons))
        }
        (GeometryType::GeometryCollection, g @ GeoGeometry::GeometryCollection(_)) => g,
        (GeometryType::GeometryCollection, g) => {
            let parts = Geometry::from(g).into_parts();
            GeoGeometry::GeometryCollection(GeometryCollection::new_from(
                parts.into_iter().map(Geometry::into_inner).collect(),
            ))
        }
        (_, g) => g,
    }
}
