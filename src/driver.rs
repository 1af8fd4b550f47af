//! Format drivers
//!
//! A [`Driver`] knows how to recognize, open and optionally create datasets
//! of one format. The [`DriverManager`] holds the registered drivers and
//! picks one for a path.

use std::fmt::{Debug, Formatter};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::cpl::CslStringList;
use crate::errors::*;
use crate::s57;
use crate::vector::geojson::{self, GeoJsonWriter};
use crate::vector::{
    Dataset, Defn, Feature, FieldDefn, FieldMap, GeomFieldDefn, GeometryType, Layer,
    LayerOptions, MemoryLayer,
};

/// A vector format driver.
pub trait Driver {
    /// Short name, as accepted by `--of` / `--if`.
    fn short_name(&self) -> &'static str;

    fn long_name(&self) -> &'static str;

    /// File name extensions recognized by this driver, lower case, without dot.
    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the first bytes of a file look like this format.
    fn identify(&self, _header: &[u8]) -> bool {
        false
    }

    fn open(&self, path: &Path, open_options: &CslStringList) -> Result<Dataset>;

    /// Create a new dataset at `path`.
    fn create(
        &self,
        _path: &Path,
        _creation_options: &CslStringList,
    ) -> Result<Box<dyn DatasetWriter>> {
        Err(GdalVecError::DriverCapability {
            driver: self.short_name(),
            capability: "dataset creation",
        })
    }
}

impl Debug for dyn Driver + '_ {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("short_name", &self.short_name())
            .finish()
    }
}

/// Sink of a dataset being created.
///
/// Layers are created first, then fields are added to them, then features are
/// written. Features are matched to the layer definition by field name.
pub trait DatasetWriter {
    fn create_layer(&mut self, options: LayerOptions<'_>) -> Result<usize>;

    fn create_field(&mut self, layer: usize, field: &FieldDefn) -> Result<()>;

    fn create_geom_field(&mut self, _layer: usize, _field: &GeomFieldDefn) -> Result<()> {
        Err(GdalVecError::DriverCapability {
            driver: "writer",
            capability: "multiple geometry fields",
        })
    }

    /// The definition of a created layer, as features will be written.
    fn layer_defn(&self, layer: usize) -> Result<Arc<Defn>>;

    fn write_feature(&mut self, layer: usize, feature: Feature) -> Result<()>;

    /// Flush everything and give back the written dataset.
    fn finish(self: Box<Self>) -> Result<Dataset>;

    /// Create a layer with the schema of `defn` under the name `name`.
    fn copy_layer_schema(
        &mut self,
        name: &str,
        defn: &Defn,
        options: Option<&CslStringList>,
    ) -> Result<usize> {
        let first_geom = defn.geom_field(0);
        let idx = self.create_layer(LayerOptions {
            name,
            srs: first_geom.and_then(|g| g.spatial_ref()),
            ty: first_geom
                .map(|g| g.geometry_type())
                .unwrap_or(GeometryType::None),
            geometry_name: first_geom.map(|g| g.name()).unwrap_or("geom"),
            options,
        })?;
        for field in defn.fields() {
            self.create_field(idx, field)?;
        }
        for geom_field in defn.geom_fields().skip(1) {
            self.create_geom_field(idx, geom_field)?;
        }
        Ok(idx)
    }
}

fn layer_defn_from_options(options: &LayerOptions<'_>) -> Defn {
    if options.ty == GeometryType::None {
        Defn::new(options.name)
    } else {
        Defn::with_geometry(
            options.name,
            options.geometry_name,
            options.ty,
            options.srs.cloned(),
        )
    }
}

/// In-memory datasets.
#[derive(Debug, Default)]
pub struct MemDriver;

impl Driver for MemDriver {
    fn short_name(&self) -> &'static str {
        "MEM"
    }

    fn long_name(&self) -> &'static str {
        "In Memory dataset"
    }

    fn open(&self, path: &Path, _open_options: &CslStringList) -> Result<Dataset> {
        Err(GdalVecError::OpenFailed {
            path: path.display().to_string(),
            msg: "MEM datasets cannot be opened from a path".to_string(),
        })
    }

    fn create(
        &self,
        path: &Path,
        _creation_options: &CslStringList,
    ) -> Result<Box<dyn DatasetWriter>> {
        Ok(Box::new(MemWriter {
            description: path.display().to_string(),
            layers: Vec::new(),
        }))
    }
}

struct MemWriter {
    description: String,
    layers: Vec<(Defn, Vec<Feature>)>,
}

impl MemWriter {
    fn slot(&mut self, layer: usize) -> Result<&mut (Defn, Vec<Feature>)> {
        self.layers
            .get_mut(layer)
            .ok_or_else(|| GdalVecError::LayerNotFound(layer.to_string()))
    }
}

impl DatasetWriter for MemWriter {
    fn create_layer(&mut self, options: LayerOptions<'_>) -> Result<usize> {
        self.layers
            .push((layer_defn_from_options(&options), Vec::new()));
        Ok(self.layers.len() - 1)
    }

    fn create_field(&mut self, layer: usize, field: &FieldDefn) -> Result<()> {
        let (defn, features) = self.slot(layer)?;
        if !features.is_empty() {
            return Err(GdalVecError::BadArgument(
                "fields must be created before writing features".to_string(),
            ));
        }
        defn.add_field(field.clone());
        Ok(())
    }

    fn create_geom_field(&mut self, layer: usize, field: &GeomFieldDefn) -> Result<()> {
        let (defn, _) = self.slot(layer)?;
        defn.add_geom_field(field.clone());
        Ok(())
    }

    fn layer_defn(&self, layer: usize) -> Result<Arc<Defn>> {
        self.layers
            .get(layer)
            .map(|(defn, _)| Arc::new(defn.clone()))
            .ok_or_else(|| GdalVecError::LayerNotFound(layer.to_string()))
    }

    fn write_feature(&mut self, layer: usize, feature: Feature) -> Result<()> {
        let (_, features) = self.slot(layer)?;
        features.push(feature);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Dataset> {
        let mut dataset = Dataset::new(&self.description);
        for (defn, features) in self.layers {
            let mut layer = MemoryLayer::new(Arc::new(defn));
            for f in features {
                layer.create_feature(f)?;
            }
            dataset.add_layer(Box::new(layer));
        }
        Ok(dataset)
    }
}

/// GeoJSON FeatureCollection files.
#[derive(Debug, Default)]
pub struct GeoJsonDriver;

impl Driver for GeoJsonDriver {
    fn short_name(&self) -> &'static str {
        "GeoJSON"
    }

    fn long_name(&self) -> &'static str {
        "GeoJSON"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["geojson", "json"]
    }

    fn identify(&self, header: &[u8]) -> bool {
        let text = String::from_utf8_lossy(header);
        text.trim_start().starts_with('{')
            && (text.contains("\"FeatureCollection\"") || text.contains("\"Feature\""))
    }

    fn open(&self, path: &Path, _open_options: &CslStringList) -> Result<Dataset> {
        geojson::read_dataset(path)
    }

    fn create(
        &self,
        path: &Path,
        _creation_options: &CslStringList,
    ) -> Result<Box<dyn DatasetWriter>> {
        Ok(Box::new(GeoJsonDatasetWriter {
            writer: GeoJsonWriter::create(path)?,
            pending: None,
            map: None,
        }))
    }
}

struct GeoJsonDatasetWriter {
    writer: GeoJsonWriter,
    // schema being built, until the first feature starts the collection
    pending: Option<Defn>,
    map: Option<(Arc<Defn>, FieldMap)>,
}

impl GeoJsonDatasetWriter {
    fn check_layer(&self, layer: usize) -> Result<()> {
        if layer != 0 || (self.pending.is_none() && self.writer.defn().is_none()) {
            return Err(GdalVecError::LayerNotFound(layer.to_string()));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if let Some(defn) = self.pending.take() {
            self.writer.start_layer(defn)?;
        }
        Ok(())
    }
}

impl DatasetWriter for GeoJsonDatasetWriter {
    fn create_layer(&mut self, options: LayerOptions<'_>) -> Result<usize> {
        if self.pending.is_some() || self.writer.defn().is_some() {
            return Err(GdalVecError::DriverCapability {
                driver: "GeoJSON",
                capability: "more than one layer",
            });
        }
        self.pending = Some(layer_defn_from_options(&options));
        Ok(0)
    }

    fn create_field(&mut self, layer: usize, field: &FieldDefn) -> Result<()> {
        self.check_layer(layer)?;
        match self.pending.as_mut() {
            Some(defn) => {
                defn.add_field(field.clone());
                Ok(())
            }
            None => Err(GdalVecError::BadArgument(
                "fields must be created before writing features".to_string(),
            )),
        }
    }

    fn layer_defn(&self, layer: usize) -> Result<Arc<Defn>> {
        self.check_layer(layer)?;
        match (&self.pending, self.writer.defn()) {
            (Some(defn), _) => Ok(Arc::new(defn.clone())),
            (None, Some(defn)) => Ok(defn.clone()),
            (None, None) => Err(GdalVecError::LayerNotFound(layer.to_string())),
        }
    }

    fn write_feature(&mut self, layer: usize, feature: Feature) -> Result<()> {
        self.check_layer(layer)?;
        self.start()?;
        let target = self.layer_defn(layer)?;
        let reuse = matches!(&self.map, Some((src, _)) if Arc::ptr_eq(src, feature.defn()));
        if !reuse {
            self.map = Some((
                feature.defn().clone(),
                FieldMap::by_name(feature.defn(), &target),
            ));
        }
        let feature = match &self.map {
            Some((_, map)) => feature.remap(target, map),
            None => feature,
        };
        self.writer.write_feature(&feature)
    }

    fn finish(mut self: Box<Self>) -> Result<Dataset> {
        self.start()?;
        self.writer.finish()?;
        geojson::read_dataset(self.writer.path())
    }
}

/// S-57 ENC cells (read only).
#[derive(Debug, Default)]
pub struct S57Driver;

impl Driver for S57Driver {
    fn short_name(&self) -> &'static str {
        "S57"
    }

    fn long_name(&self) -> &'static str {
        "IHO S-57 (ENC)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["000"]
    }

    fn identify(&self, header: &[u8]) -> bool {
        s57::looks_like_s57(header)
    }

    fn open(&self, path: &Path, open_options: &CslStringList) -> Result<Dataset> {
        s57::open_dataset(path, open_options)
    }
}

/// Registry of the available drivers.
pub struct DriverManager {
    drivers: Vec<Box<dyn Driver>>,
}

impl DriverManager {
    /// A manager with all built-in drivers registered.
    pub fn new() -> Self {
        DriverManager {
            drivers: vec![
                Box::new(MemDriver),
                Box::new(GeoJsonDriver),
                Box::new(S57Driver),
            ],
        }
    }

    /// Returns the number of registered drivers.
    pub fn count(&self) -> usize {
        self.drivers.len()
    }

    /// Returns the driver at the given index.
    pub fn get_driver(&self, index: usize) -> Result<&dyn Driver> {
        self.drivers
            .get(index)
            .map(|d| d.as_ref())
            .ok_or_else(|| GdalVecError::DriverNotFound(index.to_string()))
    }

    /// Get one of the registered drivers by its short name, case-insensitively.
    pub fn get_driver_by_name(&self, name: &str) -> Result<&dyn Driver> {
        self.drivers
            .iter()
            .find(|d| d.short_name().eq_ignore_ascii_case(name))
            .map(|d| d.as_ref())
            .ok_or_else(|| GdalVecError::DriverNotFound(name.to_string()))
    }

    /// Get the driver able to write a dataset named `filename`, judging by the
    /// extension only.
    pub fn get_output_driver_for_dataset_name(&self, filename: &Path) -> Option<&dyn Driver> {
        let ext = filename.extension()?.to_string_lossy().to_ascii_lowercase();
        self.drivers
            .iter()
            .find(|d| d.extensions().contains(&ext.as_str()))
            .map(|d| d.as_ref())
    }

    /// Pick the driver for `path`.
    ///
    /// An explicit `driver_name` wins. Otherwise the file extension is tried,
    /// then the first bytes of the file.
    pub fn identify(&self, path: &Path, driver_name: Option<&str>) -> Result<&dyn Driver> {
        if let Some(name) = driver_name {
            return self.get_driver_by_name(name);
        }
        if let Some(driver) = self.get_output_driver_for_dataset_name(path) {
            return Ok(driver);
        }
        let mut header = Vec::with_capacity(1024);
        std::fs::File::open(path)
            .map_err(|e| GdalVecError::OpenFailed {
                path: path.display().to_string(),
                msg: e.to_string(),
            })?
            .take(1024)
            .read_to_end(&mut header)?;
        let found = self.drivers.iter().find(|d| d.identify(&header));
        match found {
            Some(driver) => {
                debug!("'{}' identified as {}", path.display(), driver.short_name());
                Ok(driver.as_ref())
            }
            None => Err(GdalVecError::DriverNotFound(path.display().to_string())),
        }
    }
}

impl Default for DriverManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{wkt_layer, TempFixture};
    use crate::vector::LayerAccess;

    #[test]
    fn test_driver_lookup() {
        let manager = DriverManager::new();
        assert_eq!(manager.count(), 3);
        assert_eq!(manager.get_driver_by_name("geojson").unwrap().short_name(), "GeoJSON");
        assert!(manager.get_driver_by_name("GPKG").is_err());
        let by_ext = manager
            .get_output_driver_for_dataset_name(Path::new("a/b.GeoJSON"))
            .unwrap();
        assert_eq!(by_ext.short_name(), "GeoJSON");
        assert!(manager
            .get_output_driver_for_dataset_name(Path::new("cell.000"))
            .is_some());
    }

    #[test]
    fn test_identify_by_content() -> Result<()> {
        let fixture = TempFixture::with_contents(
            "noext",
            br#"{"type": "FeatureCollection", "features": []}"#,
        );
        let manager = DriverManager::new();
        assert_eq!(manager.identify(fixture.path(), None)?.short_name(), "GeoJSON");
        let garbage = TempFixture::with_contents("garbage", b"hello");
        assert!(matches!(
            manager.identify(garbage.path(), None),
            Err(GdalVecError::DriverNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_mem_writer() -> Result<()> {
        let mut source = wkt_layer("pts", GeometryType::Point, &["POINT (1 2)", "POINT (3 4)"]);
        let driver = DriverManager::new();
        let mut writer = driver
            .get_driver_by_name("MEM")?
            .create(Path::new("out"), &CslStringList::new())?;
        let idx = writer.copy_layer_schema("copy", source.defn(), None)?;
        for f in source.features() {
            writer.write_feature(idx, f?)?;
        }
        let mut out = writer.finish()?;
        let layer = out.layer_by_name("copy")?;
        assert_eq!(layer.defn().field_count(), 2);
        assert_eq!(layer.feature_count(false)?, Some(2));
        Ok(())
    }

    #[test]
    fn test_s57_is_read_only() {
        let manager = DriverManager::new();
        let driver = manager.get_driver_by_name("S57").unwrap();
        assert!(matches!(
            driver.create(Path::new("x.000"), &CslStringList::new()),
            Err(GdalVecError::DriverCapability { .. })
        ));
    }
}
