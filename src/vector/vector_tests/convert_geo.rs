use geo_types::{
    line_string, point, polygon, Geometry as GeoGeometry, GeometryCollection,
    MultiLineString, MultiPoint, MultiPolygon,
};

use crate::errors::Result;
use crate::vector::{Geometry, GeometryType};

fn check(wkt: &str, geo: GeoGeometry<f64>, ty: GeometryType) -> Result<()> {
    let parsed = Geometry::from_wkt(wkt)?;
    assert_eq!(parsed.geometry_type(), ty);
    assert_eq!(parsed.clone().into_inner(), geo);
    let converted = Geometry::from(geo);
    assert_eq!(converted, parsed);
    assert_eq!(Geometry::from_wkt(&converted.wkt()?)?, parsed);
    Ok(())
}

#[test]
fn test_import_export_point() -> Result<()> {
    check("POINT (1 2)", point!(x: 1., y: 2.).into(), GeometryType::Point)
}

#[test]
fn test_import_export_multipoint() -> Result<()> {
    let geo = MultiPoint::new(vec![
        point!(x: 0., y: 0.),
        point!(x: 0., y: 1.),
        point!(x: 1., y: 2.),
    ]);
    check(
        "MULTIPOINT ((0 0), (0 1), (1 2))",
        geo.into(),
        GeometryType::MultiPoint,
    )
}

#[test]
fn test_import_export_linestring() -> Result<()> {
    let geo = line_string![(x: 0., y: 0.), (x: 0., y: 1.), (x: 1., y: 2.)];
    check("LINESTRING (0 0, 0 1, 1 2)", geo.into(), GeometryType::LineString)
}

#[test]
fn test_import_export_multilinestring() -> Result<()> {
    let geo = MultiLineString::new(vec![
        line_string![(x: 0., y: 0.), (x: 0., y: 1.), (x: 1., y: 2.)],
        line_string![(x: 3., y: 3.), (x: 3., y: 4.), (x: 4., y: 5.)],
    ]);
    check(
        "MULTILINESTRING ((0 0, 0 1, 1 2), (3 3, 3 4, 4 5))",
        geo.into(),
        GeometryType::MultiLineString,
    )
}

#[test]
fn test_import_export_polygon() -> Result<()> {
    let geo = polygon!(
        exterior: [(x: 0., y: 0.), (x: 0., y: 5.), (x: 5., y: 5.), (x: 5., y: 0.), (x: 0., y: 0.)],
        interiors: [[(x: 1., y: 1.), (x: 1., y: 2.), (x: 2., y: 2.), (x: 2., y: 1.), (x: 1., y: 1.)]]
    );
    check(
        "POLYGON ((0 0, 0 5, 5 5, 5 0, 0 0), (1 1, 1 2, 2 2, 2 1, 1 1))",
        geo.into(),
        GeometryType::Polygon,
    )
}

#[test]
fn test_import_export_multipolygon() -> Result<()> {
    let geo = MultiPolygon::new(vec![
        polygon![(x: 0., y: 0.), (x: 0., y: 1.), (x: 1., y: 1.), (x: 0., y: 0.)],
        polygon![(x: 5., y: 5.), (x: 5., y: 6.), (x: 6., y: 6.), (x: 5., y: 5.)],
    ]);
    check(
        "MULTIPOLYGON (((0 0, 0 1, 1 1, 0 0)), ((5 5, 5 6, 6 6, 5 5)))",
        geo.into(),
        GeometryType::MultiPolygon,
    )
}

#[test]
fn test_import_export_geometrycollection() -> Result<()> {
    let geo = GeometryCollection::from(vec![
        GeoGeometry::Point(point!(x: 1., y: 2.)),
        GeoGeometry::LineString(line_string![(x: 0., y: 0.), (x: 3., y: 4.)]),
    ]);
    let parsed = Geometry::from_wkt("GEOMETRYCOLLECTION (POINT (1 2), LINESTRING (0 0, 3 4))")?;
    assert_eq!(parsed.geometry_count(), 2);
    check(
        "GEOMETRYCOLLECTION (POINT (1 2), LINESTRING (0 0, 3 4))",
        GeoGeometry::GeometryCollection(geo),
        GeometryType::GeometryCollection,
    )
}

#[test]
fn test_rect_is_polygon() {
    let bbox = Geometry::bbox(0., 0., 2., 1.);
    assert_eq!(bbox.geometry_type(), GeometryType::Polygon);
    assert!((bbox.area() - 2.0).abs() < f64::EPSILON);
}
