use std::fmt::{Debug, Formatter};
use std::path::Path;

use crate::cpl::CslStringList;
use crate::driver::DriverManager;
use crate::errors::*;
use crate::vector::Layer;

/// Vector dataset
///
/// An ordered collection of named layers. The dataset owns its layers; a
/// pipeline step consuming a dataset takes the layers out with
/// [`Dataset::into_layers`] and wraps them, so a decorator always outlives
/// nothing it depends on.
///
/// ```
/// use gdalvec::vector::{Dataset, Defn, GeometryType, MemoryLayer};
/// use std::sync::Arc;
///
/// let mut dataset = Dataset::new("mem");
/// let defn = Defn::with_geometry("points", "geom", GeometryType::Point, None);
/// dataset.add_layer(Box::new(MemoryLayer::new(Arc::new(defn))));
/// assert_eq!(dataset.layer_count(), 1);
/// ```
pub struct Dataset {
    description: String,
    driver_name: String,
    layers: Vec<Box<dyn Layer>>,
}

impl Dataset {
    pub fn new(description: &str) -> Dataset {
        Dataset {
            description: description.to_string(),
            driver_name: "MEM".to_string(),
            layers: Vec::new(),
        }
    }

    /// Open the dataset at `path`, picking the driver from the file name or content.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Dataset> {
        Self::open_ex(path, None, &CslStringList::new())
    }

    /// Open the dataset at `path` with an explicit driver name and open options.
    pub fn open_ex<P: AsRef<Path>>(
        path: P,
        driver_name: Option<&str>,
        open_options: &CslStringList,
    ) -> Result<Dataset> {
        let manager = DriverManager::new();
        let driver = manager.identify(path.as_ref(), driver_name)?;
        driver.open(path.as_ref(), open_options)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn set_driver_name(&mut self, name: &str) {
        self.driver_name = name.to_string();
    }

    pub fn add_layer(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(layer);
    }

    /// Get number of layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&mut self, idx: usize) -> Result<&mut dyn Layer> {
        match self.layers.get_mut(idx) {
            Some(layer) => Ok(layer.as_mut()),
            None => Err(GdalVecError::LayerNotFound(idx.to_string())),
        }
    }

    pub fn layer_by_name(&mut self, name: &str) -> Result<&mut dyn Layer> {
        match self.layers.iter_mut().find(|l| l.name() == name) {
            Some(layer) => Ok(layer.as_mut()),
            None => Err(GdalVecError::LayerNotFound(name.to_string())),
        }
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name().to_string()).collect()
    }

    pub fn layers_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Layer>> {
        self.layers.iter_mut()
    }

    /// Give up the dataset, handing ownership of its layers to the caller.
    pub fn into_layers(self) -> Vec<Box<dyn Layer>> {
        self.layers
    }

    /// Keep only the layers named in `names`, in that order.
    pub fn retain_layers(&mut self, names: &[String]) -> Result<()> {
        let mut layers: Vec<Option<Box<dyn Layer>>> = self.layers.drain(..).map(Some).collect();
        let mut kept = Vec::with_capacity(names.len());
        for name in names {
            let pos = layers
                .iter()
                .position(|l| l.as_ref().is_some_and(|l| l.name() == name))
                .ok_or_else(|| GdalVecError::LayerNotFound(name.clone()))?;
            if let Some(layer) = layers[pos].take() {
                kept.push(layer);
            }
        }
        self.layers = kept;
        Ok(())
    }
}

impl Debug for Dataset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("description", &self.description)
            .field("driver_name", &self.driver_name)
            .field("layers", &self.layer_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{Defn, GeometryType, MemoryLayer};
    use std::sync::Arc;

    fn ds() -> Dataset {
        let mut ds = Dataset::new("test");
        for name in ["a", "b", "c"] {
            let defn = Defn::with_geometry(name, "geom", GeometryType::Point, None);
            ds.add_layer(Box::new(MemoryLayer::new(Arc::new(defn))));
        }
        ds
    }

    #[test]
    fn test_layer_access() -> Result<()> {
        let mut ds = ds();
        assert_eq!(ds.layer(1)?.name(), "b");
        assert_eq!(ds.layer_by_name("c")?.name(), "c");
        assert!(ds.layer(3).is_err());
        assert!(ds.layer_by_name("z").is_err());
        Ok(())
    }

    #[test]
    fn test_retain_layers() -> Result<()> {
        let mut ds = ds();
        ds.retain_layers(&["c".to_string(), "a".to_string()])?;
        assert_eq!(ds.layer_names(), vec!["c", "a"]);
        assert!(ds.retain_layers(&["b".to_string()]).is_err());
        Ok(())
    }
}
