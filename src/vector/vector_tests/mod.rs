use crate::test_utils::TempFixture;
use crate::vector::{
    Dataset, Envelope, FieldType, FieldValue, Geometry, GeometryType, LayerAccess,
    LayerCaps,
};
use crate::{assert_near, errors::Result};

mod convert_geo;

const ROADS: &str = r#"{
"type": "FeatureCollection",
"name": "roads",
"features": [
{ "type": "Feature", "id": 0, "properties": { "kind": "path", "sort_key": -1.0, "highway": "footway", "lanes": 1 }, "geometry": { "type": "LineString", "coordinates": [ [ 26.1019276, 44.4302748 ], [ 26.1019382, 44.4303191 ], [ 26.1020002, 44.4304202 ] ] } },
{ "type": "Feature", "id": 1, "properties": { "kind": "major_road", "sort_key": 0.5, "highway": "secondary", "lanes": 2 }, "geometry": { "type": "LineString", "coordinates": [ [ 26.100768, 44.4298577 ], [ 26.1035155, 44.4318177 ] ] } },
{ "type": "Feature", "id": 2, "properties": { "kind": "minor_road", "sort_key": 0.0, "highway": "residential", "lanes": null }, "geometry": { "type": "LineString", "coordinates": [ [ 26.1015, 44.4300 ], [ 26.1016, 44.4310 ] ] } },
{ "type": "Feature", "id": 3, "properties": { "kind": "minor_road", "sort_key": 0.0, "highway": "service" }, "geometry": null }
]
}"#;

fn roads() -> (TempFixture, Dataset) {
    let fixture = TempFixture::with_contents("roads.geojson", ROADS.as_bytes());
    let dataset = Dataset::open(fixture.path()).unwrap();
    (fixture, dataset)
}

#[test]
fn test_layer_count() {
    let (_fixture, ds) = roads();
    assert_eq!(ds.layer_count(), 1);
    assert_eq!(ds.layer_names(), vec!["roads"]);
    assert_eq!(ds.driver_name(), "GeoJSON");
}

#[test]
fn test_layer_extent() -> Result<()> {
    let (_fixture, mut ds) = roads();
    let layer = ds.layer(0)?;
    assert!(layer.has_capability(LayerCaps::FAST_GET_EXTENT));
    let extent = layer.extent(0, false)?.unwrap();
    assert_near!(extent.min_x, 26.100768);
    assert_near!(extent.max_x, 26.1035155);
    assert_near!(extent.min_y, 44.4298577);
    assert_near!(extent.max_y, 44.4318177);
    // a layer without geometries has no extent
    let empty = TempFixture::with_contents(
        "empty.geojson",
        br#"{"type":"FeatureCollection","features":[]}"#,
    );
    let mut ds = Dataset::open(empty.path())?;
    assert_eq!(ds.layer(0)?.extent(0, true)?, None::<Envelope>);
    Ok(())
}

#[test]
fn test_layer_spatial_ref() -> Result<()> {
    let (_fixture, mut ds) = roads();
    let srs = ds.layer(0)?.spatial_ref().unwrap();
    assert_eq!(srs.auth_code()?, 4326);
    Ok(())
}

#[test]
fn test_layer_capabilities() -> Result<()> {
    let (_fixture, mut ds) = roads();
    let layer = ds.layer(0)?;
    assert!(layer.has_capability(LayerCaps::FAST_FEATURE_COUNT));
    assert!(layer.has_capability(LayerCaps::RANDOM_READ));
    assert!(layer.has_capability(LayerCaps::STRINGS_AS_UTF8));
    assert!(layer.has_capability(LayerCaps::FAST_FEATURE_COUNT | LayerCaps::RANDOM_READ));
    assert!(!layer.has_capability(LayerCaps::empty()));
    Ok(())
}

#[test]
fn test_schema() -> Result<()> {
    let (_fixture, mut ds) = roads();
    let defn = ds.layer(0)?.defn().clone();
    let fields: Vec<(String, FieldType)> = defn
        .fields()
        .map(|f| (f.name().to_string(), f.field_type()))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("kind".to_string(), FieldType::String),
            ("sort_key".to_string(), FieldType::Real),
            ("highway".to_string(), FieldType::String),
            ("lanes".to_string(), FieldType::Integer),
        ]
    );
    assert_eq!(defn.geom_field_count(), 1);
    assert_eq!(defn.geometry_type(), GeometryType::LineString);
    assert_eq!(defn.field_index("HIGHWAY"), Some(2));
    assert!(defn.require_field_index("speed", "test_schema").is_err());
    Ok(())
}

#[test]
fn test_features() -> Result<()> {
    let (_fixture, mut ds) = roads();
    let layer = ds.layer(0)?;
    assert_eq!(layer.feature_count(false)?, Some(4));

    let highways: Vec<Option<String>> = layer
        .features()
        .map(|f| f.map(|f| f.field("highway").unwrap().cloned().and_then(FieldValue::into_string)))
        .collect::<Result<_>>()?;
    assert_eq!(
        highways,
        vec![
            Some("footway".to_string()),
            Some("secondary".to_string()),
            Some("residential".to_string()),
            Some("service".to_string()),
        ]
    );

    assert_eq!(layer.features().count(), 0);
    layer.reset_reading();
    assert_eq!(layer.features().count(), 4);
    Ok(())
}

#[test]
fn test_feature_by_fid() -> Result<()> {
    let (_fixture, mut ds) = roads();
    let layer = ds.layer(0)?;
    let feature = layer.feature(1)?.unwrap();
    assert_eq!(feature.fid(), Some(1));
    assert_eq!(feature.field("lanes")?, Some(&FieldValue::IntegerValue(2)));
    assert_eq!(feature.field("sort_key")?, Some(&FieldValue::RealValue(0.5)));
    assert!(feature.field("speed").is_err());

    let unset = layer.feature(2)?.unwrap();
    assert_eq!(unset.field("lanes")?, None);
    let no_geometry = layer.feature(3)?.unwrap();
    assert!(no_geometry.geometry().is_none());
    assert!(layer.feature(42)?.is_none());
    Ok(())
}

#[test]
fn test_geometry() -> Result<()> {
    let (_fixture, mut ds) = roads();
    let layer = ds.layer(0)?;
    let feature = layer.feature(1)?.unwrap();
    let geometry = feature.geometry().unwrap();
    assert_eq!(geometry.geometry_type(), GeometryType::LineString);
    assert_eq!(geometry.spatial_ref().map(|s| s.auth_code().ok()), Some(Some(4326)));
    assert_eq!(
        geometry.clone().into_inner(),
        Geometry::from_wkt("LINESTRING (26.100768 44.4298577, 26.1035155 44.4318177)")?
            .into_inner()
    );
    Ok(())
}

#[test]
fn test_layer_by_name() -> Result<()> {
    let (_fixture, mut ds) = roads();
    assert_eq!(ds.layer_by_name("roads")?.name(), "roads");
    assert!(ds.layer_by_name("rivers").is_err());
    assert!(ds.layer(3).is_err());
    Ok(())
}
