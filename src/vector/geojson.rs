//! GeoJSON reading and writing
//!
//! A GeoJSON file holds a single layer. The schema of that layer is inferred
//! from the properties of all features on open, the way OGR's GeoJSON driver
//! does it. Writing is streaming: features are serialized as soon as they are
//! handed over.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use geo_types::Geometry as GeoGeometry;
use geojson::{feature::Id, GeoJson, JsonObject, JsonValue};
use log::debug;

use crate::config::warn_once;
use crate::errors::*;
use crate::spatial_ref::{CoordTransform, SpatialRef};
use crate::vector::{
    Dataset, Defn, Feature, FieldDefn, FieldType, FieldValue, GeomFieldDefn, Geometry,
    GeometryType, Layer, MemoryLayer,
};

/// Read a GeoJSON file into a dataset with one in-memory layer.
pub(crate) fn read_dataset(path: &Path) -> Result<Dataset> {
    let text = std::fs::read_to_string(path)?;
    let fallback_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "OGRGeoJSON".to_string());
    let layer = parse_layer(&text, &fallback_name).map_err(|e| GdalVecError::OpenFailed {
        path: path.display().to_string(),
        msg: e.to_string(),
    })?;
    let mut dataset = Dataset::new(&path.display().to_string());
    dataset.set_driver_name("GeoJSON");
    dataset.add_layer(Box::new(layer));
    Ok(dataset)
}

fn feature_list(geojson: GeoJson) -> (Vec<geojson::Feature>, Option<JsonObject>) {
    match geojson {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(f) => (vec![f], None),
        GeoJson::Geometry(g) => (
            vec![geojson::Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            None,
        ),
    }
}

fn crs_of(foreign_members: Option<&JsonObject>) -> Result<SpatialRef> {
    let name = foreign_members
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|p| p.get("name"))
        .and_then(JsonValue::as_str);
    match name {
        Some(name) => SpatialRef::from_definition(name),
        None => SpatialRef::from_epsg(4326),
    }
}

/// Build a memory layer from the text of a GeoJSON document.
pub(crate) fn parse_layer(text: &str, fallback_name: &str) -> Result<MemoryLayer> {
    let geojson: GeoJson = text.parse()?;
    let (features, foreign_members) = feature_list(geojson);
    let name = foreign_members
        .as_ref()
        .and_then(|m| m.get("name"))
        .and_then(JsonValue::as_str)
        .unwrap_or(fallback_name)
        .to_string();
    let srs = crs_of(foreign_members.as_ref())?;

    let mut geometries = Vec::with_capacity(features.len());
    let mut geometry_type: Option<GeometryType> = None;
    for f in &features {
        let geom = match &f.geometry {
            Some(g) => Some(GeoGeometry::<f64>::try_from(g.clone())?),
            None => None,
        };
        if let Some(g) = &geom {
            let t = Geometry::from(g.clone()).geometry_type();
            geometry_type = match geometry_type {
                None => Some(t),
                Some(prev) if prev == t => Some(prev),
                Some(_) => Some(GeometryType::Unknown),
            };
        }
        geometries.push(geom);
    }

    let mut defn = Defn::new(&name);
    let mut field_types: Vec<(String, Option<FieldType>)> = Vec::new();
    for f in &features {
        for (key, value) in f.properties.iter().flatten() {
            let inferred = infer_type(value);
            match field_types.iter_mut().find(|(k, _)| k == key) {
                Some((_, t)) => *t = merge_types(*t, inferred),
                None => field_types.push((key.clone(), inferred)),
            }
        }
    }
    for (key, t) in &field_types {
        defn.add_field(FieldDefn::new(key, t.unwrap_or(FieldType::String)));
    }
    defn.add_geom_field(
        GeomFieldDefn::new("", geometry_type.unwrap_or(GeometryType::Unknown))
            .with_spatial_ref(Some(srs.clone())),
    );
    debug!(
        "GeoJSON layer '{name}': {} features, {} fields",
        features.len(),
        defn.field_count()
    );

    let defn = Arc::new(defn);
    let mut layer = MemoryLayer::new(defn.clone());
    for (f, geom) in features.into_iter().zip(geometries) {
        let mut feature = Feature::new(defn.clone());
        feature.set_fid(match &f.id {
            Some(Id::Number(n)) => n.as_i64(),
            _ => None,
        });
        for (key, value) in f.properties.into_iter().flatten() {
            if let Some(idx) = defn.field_index(&key) {
                let is_string = defn.field(idx).map(|f| f.field_type()) == Some(FieldType::String);
                let value = match value {
                    JsonValue::String(s) if is_string => Some(FieldValue::StringValue(s)),
                    other => json_to_field(other),
                };
                feature.set_field_by_index(idx, value)?;
            }
        }
        if let Some(g) = geom {
            let mut g = Geometry::from(g);
            g.set_spatial_ref(Some(srs.clone()));
            feature.set_geometry(g)?;
        }
        layer.create_feature(feature)?;
    }
    Ok(layer)
}

fn infer_type(value: &JsonValue) -> Option<FieldType> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(_) => Some(FieldType::Integer),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => Some(FieldType::Integer),
            Some(_) => Some(FieldType::Integer64),
            None => Some(FieldType::Real),
        },
        JsonValue::String(s) => {
            if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
                Some(FieldType::Date)
            } else if DateTime::parse_from_rfc3339(s).is_ok() {
                Some(FieldType::DateTime)
            } else {
                Some(FieldType::String)
            }
        }
        JsonValue::Array(items) => {
            let mut t = None;
            for item in items {
                let item_type = match infer_type(item) {
                    Some(FieldType::Integer) => Some(FieldType::IntegerList),
                    Some(FieldType::Integer64) => Some(FieldType::Integer64List),
                    Some(FieldType::Real) => Some(FieldType::RealList),
                    Some(_) => Some(FieldType::StringList),
                    None => None,
                };
                t = merge_types(t, item_type);
            }
            Some(t.unwrap_or(FieldType::StringList))
        }
        JsonValue::Object(_) => Some(FieldType::String),
    }
}

fn merge_types(a: Option<FieldType>, b: Option<FieldType>) -> Option<FieldType> {
    use FieldType::*;
    let (a, b) = match (a, b) {
        (None, t) | (t, None) => return t,
        (Some(a), Some(b)) => (a, b),
    };
    let merged = match (a, b) {
        (a, b) if a == b => a,
        (Integer, Integer64) | (Integer64, Integer) => Integer64,
        (Integer | Integer64 | Real, Integer | Integer64 | Real) => Real,
        (IntegerList, Integer64List) | (Integer64List, IntegerList) => Integer64List,
        (
            IntegerList | Integer64List | RealList,
            IntegerList | Integer64List | RealList,
        ) => RealList,
        (a, b) if a.is_list() && b.is_list() => StringList,
        _ => String,
    };
    Some(merged)
}

fn json_to_field(value: JsonValue) -> Option<FieldValue> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(FieldValue::IntegerValue(b as i32)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Some(FieldValue::Integer64Value(i)),
            None => n.as_f64().map(FieldValue::RealValue),
        },
        JsonValue::String(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                Some(FieldValue::DateValue(d))
            } else if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                Some(FieldValue::DateTimeValue(dt))
            } else {
                Some(FieldValue::StringValue(s))
            }
        }
        JsonValue::Array(items) => {
            if items.iter().all(|v| v.is_i64()) {
                Some(FieldValue::Integer64ListValue(
                    items.iter().filter_map(JsonValue::as_i64).collect(),
                ))
            } else if items.iter().all(JsonValue::is_number) {
                Some(FieldValue::RealListValue(
                    items.iter().filter_map(JsonValue::as_f64).collect(),
                ))
            } else {
                Some(FieldValue::StringListValue(
                    items
                        .into_iter()
                        .map(|v| match v {
                            JsonValue::String(s) => s,
                            other => other.to_string(),
                        })
                        .collect(),
                ))
            }
        }
        other @ JsonValue::Object(_) => Some(FieldValue::StringValue(other.to_string())),
    }
}

fn field_to_json(value: &FieldValue) -> JsonValue {
    match value {
        FieldValue::IntegerValue(v) => JsonValue::from(*v),
        FieldValue::Integer64Value(v) => JsonValue::from(*v),
        FieldValue::RealValue(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        FieldValue::StringValue(v) => JsonValue::from(v.as_str()),
        FieldValue::IntegerListValue(v) => JsonValue::from(v.clone()),
        FieldValue::Integer64ListValue(v) => JsonValue::from(v.clone()),
        FieldValue::RealListValue(v) => JsonValue::Array(
            v.iter()
                .map(|x| {
                    serde_json::Number::from_f64(*x)
                        .map(JsonValue::Number)
                        .unwrap_or(JsonValue::Null)
                })
                .collect(),
        ),
        FieldValue::StringListValue(v) => JsonValue::from(v.clone()),
        FieldValue::DateValue(d) => JsonValue::from(d.format("%Y-%m-%d").to_string()),
        FieldValue::DateTimeValue(dt) => JsonValue::from(dt.to_rfc3339()),
    }
}

/// Streaming writer of a single-layer FeatureCollection.
pub(crate) struct GeoJsonWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    defn: Option<Arc<Defn>>,
    to_wgs84: Option<CoordTransform>,
    written: usize,
}

impl GeoJsonWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(GeoJsonWriter {
            path: path.to_path_buf(),
            out: Some(BufWriter::new(File::create(path)?)),
            defn: None,
            to_wgs84: None,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defn(&self) -> Option<&Arc<Defn>> {
        self.defn.as_ref()
    }

    /// Start the single layer of the file.
    pub fn start_layer(&mut self, defn: Defn) -> Result<()> {
        if self.defn.is_some() {
            return Err(GdalVecError::DriverCapability {
                driver: "GeoJSON",
                capability: "more than one layer",
            });
        }
        let mut defn = defn;
        let wgs84 = SpatialRef::from_epsg(4326)?;
        if let Some(srs) = defn.geom_field(0).and_then(|g| g.spatial_ref()).cloned() {
            if srs != wgs84 {
                self.to_wgs84 = Some(CoordTransform::new(&srs, &wgs84)?);
            }
        }
        if let Some(g) = defn.geom_field_mut(0) {
            g.set_spatial_ref(Some(wgs84));
        }
        let out = self.writer()?;
        let name = serde_json::to_string(defn.name())?;
        write!(out, "{{\n\"type\": \"FeatureCollection\",\n\"name\": {name},\n\"features\": [\n")?;
        self.defn = Some(Arc::new(defn));
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.out.as_mut().ok_or_else(|| {
            GdalVecError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "GeoJSON writer already closed",
            ))
        })
    }

    pub fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        let defn = self
            .defn
            .clone()
            .ok_or_else(|| GdalVecError::LayerNotFound("0".to_string()))?;
        let mut properties = JsonObject::new();
        for (idx, field) in defn.fields().enumerate() {
            let value = feature
                .field_by_index(idx)?
                .map(field_to_json)
                .unwrap_or(JsonValue::Null);
            properties.insert(field.name().to_string(), value);
        }
        if feature.geometries().len() > 1 {
            warn_once("GeoJSON supports a single geometry field; others are dropped");
        }
        let geometry = match feature.geometry() {
            Some(g) => {
                let g = match &self.to_wgs84 {
                    Some(ct) => ct.transform_geometry(g)?,
                    None => g.clone(),
                };
                Some(geojson::Geometry::new(geojson::Value::from(g.inner())))
            }
            None => None,
        };
        let out_feature = geojson::Feature {
            bbox: None,
            geometry,
            id: feature.fid().map(|fid| Id::Number(fid.into())),
            properties: Some(properties),
            foreign_members: None,
        };
        let text = serde_json::to_string(&out_feature)?;
        let separator = if self.written == 0 { "" } else { ",\n" };
        let out = self.writer()?;
        write!(out, "{separator}{text}")?;
        self.written += 1;
        Ok(())
    }

    /// Close the collection and flush the file.
    pub fn finish(&mut self) -> Result<()> {
        if self.defn.is_none() {
            self.start_layer(Defn::new(
                &self
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ))?;
        }
        if let Some(mut out) = self.out.take() {
            out.write_all(b"\n]\n}\n")?;
            out.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TempFixture;

    const ROADS: &str = r#"{
        "type": "FeatureCollection",
        "name": "roads",
        "features": [
            {"type": "Feature", "id": 7, "properties": {"highway": "primary", "lanes": 2, "sort_key": 1},
             "geometry": {"type": "LineString", "coordinates": [[26.1, 44.4], [26.2, 44.5]]}},
            {"type": "Feature", "properties": {"highway": "service", "lanes": null, "sort_key": 1.5,
             "opened": "2020-05-01"},
             "geometry": {"type": "LineString", "coordinates": [[26.3, 44.6], [26.4, 44.7]]}}
        ]
    }"#;

    #[test]
    fn test_schema_inference() -> Result<()> {
        let mut layer = parse_layer(ROADS, "fallback")?;
        assert_eq!(layer.name(), "roads");
        let defn = layer.defn().clone();
        let types: Vec<_> = defn.fields().map(|f| (f.name().to_string(), f.field_type())).collect();
        assert_eq!(
            types,
            vec![
                ("highway".to_string(), FieldType::String),
                ("lanes".to_string(), FieldType::Integer),
                ("sort_key".to_string(), FieldType::Real),
                ("opened".to_string(), FieldType::Date),
            ]
        );
        assert_eq!(defn.geometry_type(), GeometryType::LineString);

        let first = layer.next_feature()?.unwrap();
        assert_eq!(first.fid(), Some(7));
        assert_eq!(first.field("lanes")?, Some(&FieldValue::IntegerValue(2)));
        assert_eq!(first.field("sort_key")?, Some(&FieldValue::RealValue(1.0)));
        let second = layer.next_feature()?.unwrap();
        assert_eq!(second.fid(), Some(8));
        assert_eq!(second.field("lanes")?, None);
        assert_eq!(
            second.geometry().unwrap().spatial_ref(),
            Some(&SpatialRef::from_epsg(4326)?)
        );
        Ok(())
    }

    #[test]
    fn test_merge_types() {
        use FieldType::*;
        assert_eq!(merge_types(Some(Integer), Some(Real)), Some(Real));
        assert_eq!(merge_types(Some(Integer), Some(Integer64)), Some(Integer64));
        assert_eq!(merge_types(Some(Integer), Some(String)), Some(String));
        assert_eq!(merge_types(None, Some(Date)), Some(Date));
        assert_eq!(merge_types(Some(IntegerList), Some(StringList)), Some(StringList));
    }

    #[test]
    fn test_write_then_read() -> Result<()> {
        let fixture = TempFixture::empty("out.geojson");
        let mut layer = parse_layer(ROADS, "fallback")?;
        let mut writer = GeoJsonWriter::create(fixture.path())?;
        writer.start_layer((**layer.defn()).clone())?;
        while let Some(f) = layer.next_feature()? {
            writer.write_feature(&f)?;
        }
        writer.finish()?;

        let mut dataset = read_dataset(fixture.path())?;
        let layer = dataset.layer(0)?;
        assert_eq!(layer.name(), "roads");
        assert_eq!(layer.feature_count(true)?, Some(2));
        let f = layer.feature(7)?.unwrap();
        assert_eq!(f.field_as_string(0)?, Some("primary".to_string()));
        Ok(())
    }

    #[test]
    fn test_field_order_survives_round_trip() -> Result<()> {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"zone": "a", "kind": "road", "mass": 1.5, "b": 3},
             "geometry": {"type": "Point", "coordinates": [1, 2]}}
        ]}"#;
        let expected = vec!["zone", "kind", "mass", "b"];
        let mut layer = parse_layer(text, "ordered")?;
        fn names(defn: &Defn) -> Vec<String> {
            defn.fields().map(|f| f.name().to_string()).collect()
        }
        assert_eq!(names(layer.defn()), expected);

        let fixture = TempFixture::empty("ordered.geojson");
        let mut writer = GeoJsonWriter::create(fixture.path())?;
        writer.start_layer((**layer.defn()).clone())?;
        while let Some(f) = layer.next_feature()? {
            writer.write_feature(&f)?;
        }
        writer.finish()?;

        let mut dataset = read_dataset(fixture.path())?;
        let reread = dataset.layer(0)?;
        assert_eq!(names(reread.defn()), expected);
        let f = reread.next_feature()?.unwrap();
        assert_eq!(f.field_as_string(0)?, Some("a".to_string()));
        Ok(())
    }

    #[test]
    fn test_multiple_layers_rejected() -> Result<()> {
        let fixture = TempFixture::empty("out.geojson");
        let mut writer = GeoJsonWriter::create(fixture.path())?;
        writer.start_layer(Defn::new("a"))?;
        assert!(matches!(
            writer.start_layer(Defn::new("b")),
            Err(GdalVecError::DriverCapability { .. })
        ));
        Ok(())
    }
}
