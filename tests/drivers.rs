use std::path::Path;

use gdalvec::cpl::CslStringList;
use gdalvec::driver::DriverManager;
use gdalvec::errors::GdalVecError;
use gdalvec::vector::{Dataset, GeometryType, Layer};

const POINTS: &str = r#"{"type":"FeatureCollection","features":[
{"type":"Feature","properties":{"name":"a"},"geometry":{"type":"Point","coordinates":[1,2]}},
{"type":"Feature","properties":{"name":"b"},"geometry":{"type":"Point","coordinates":[3,4]}}
]}"#;

#[test]
fn test_get_driver() {
    let manager = DriverManager::new();
    let driver = manager.get_driver_by_name("geojson").unwrap();
    assert_eq!(driver.short_name(), "GeoJSON");
    assert_eq!(driver.long_name(), "GeoJSON");

    assert_eq!(manager.count(), 3);
    assert!(manager.get_driver(0).is_ok());
    assert!(manager.get_driver(3).is_err());
    assert!(matches!(
        manager.get_driver_by_name("GTiff"),
        Err(GdalVecError::DriverNotFound(_))
    ));
}

#[test]
fn test_output_driver_by_extension() {
    let manager = DriverManager::new();
    let name = |path: &str| {
        manager
            .get_output_driver_for_dataset_name(Path::new(path))
            .map(|d| d.short_name())
    };
    assert_eq!(name("out.geojson"), Some("GeoJSON"));
    assert_eq!(name("OUT.JSON"), Some("GeoJSON"));
    assert_eq!(name("US5TEST.000"), Some("S57"));
    assert_eq!(name("out.shp"), None);
    assert_eq!(name("out"), None);
}

#[test]
fn test_open_sniffs_content() {
    let dir = tempfile::tempdir().unwrap();
    // no telling extension
    let path = dir.path().join("points.txt");
    std::fs::write(&path, POINTS).unwrap();

    let mut dataset = Dataset::open(&path).unwrap();
    assert_eq!(dataset.driver_name(), "GeoJSON");
    let layer = dataset.layer(0).unwrap();
    assert_eq!(layer.defn().geometry_type(), GeometryType::Point);
    assert_eq!(layer.feature_count(true).unwrap(), Some(2));

    // an explicit format wins
    assert!(Dataset::open_ex(&path, Some("S57"), &CslStringList::new()).is_err());
    assert!(Dataset::open(dir.path().join("missing.geojson")).is_err());
}

#[test]
fn test_create_geojson() {
    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("points.geojson");
    std::fs::write(&source_path, POINTS).unwrap();
    let mut source = Dataset::open(&source_path).unwrap();
    let layer = source.layer(0).unwrap();

    let manager = DriverManager::new();
    let out_path = dir.path().join("copy.geojson");
    let mut writer = manager
        .get_driver_by_name("GeoJSON")
        .unwrap()
        .create(&out_path, &CslStringList::new())
        .unwrap();
    let idx = writer.copy_layer_schema("copy", layer.defn(), None).unwrap();
    while let Some(feature) = layer.next_feature().unwrap() {
        writer.write_feature(idx, feature).unwrap();
    }
    let mut written = writer.finish().unwrap();
    assert_eq!(written.layer(0).unwrap().feature_count(true).unwrap(), Some(2));
    assert!(out_path.exists());

    let reopened = Dataset::open(&out_path).unwrap();
    assert_eq!(reopened.layer_count(), 1);
}
