use std::path::{Path, PathBuf};

use log::debug;

use crate::config::get_config_option;
use crate::cpl::CslStringList;
use crate::errors::*;
use crate::vector::Dataset;

const DEFAULT_POOL_SIZE: usize = 100;

struct PoolEntry {
    path: PathBuf,
    dataset: Dataset,
}

/// A bounded set of open datasets.
///
/// At most `capacity` datasets are open at once. Acquiring a dataset that is
/// not open evicts the least recently used one and opens it again.
pub struct LayerPool {
    capacity: usize,
    open_options: CslStringList,
    /// Least recently used first.
    entries: Vec<PoolEntry>,
    opened: usize,
}

impl LayerPool {
    pub fn new(capacity: usize) -> Self {
        LayerPool {
            capacity: capacity.max(1),
            open_options: CslStringList::new(),
            entries: Vec::new(),
            opened: 0,
        }
    }

    /// A pool sized by the `GDALVEC_LAYER_POOL_SIZE` option.
    pub fn from_config() -> Result<Self> {
        let size = get_config_option("GDALVEC_LAYER_POOL_SIZE", "")?;
        let capacity = if size.is_empty() {
            DEFAULT_POOL_SIZE
        } else {
            size.parse().map_err(|_| {
                GdalVecError::BadArgument(format!("Invalid GDALVEC_LAYER_POOL_SIZE '{size}'"))
            })?
        };
        Ok(Self::new(capacity))
    }

    pub fn with_open_options(mut self, open_options: CslStringList) -> Self {
        self.open_options = open_options;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of datasets currently open.
    pub fn open_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of times a dataset was opened, reopens included.
    pub fn opened(&self) -> usize {
        self.opened
    }

    /// The open dataset at `path`, opening it when needed.
    ///
    /// The flag is `true` when the dataset was (re)opened by this call, in
    /// which case its layers start at their first feature.
    pub fn acquire(&mut self, path: &Path) -> Result<(&mut Dataset, bool)> {
        let reopened = match self.entries.iter().position(|e| e.path == path) {
            Some(pos) => {
                let entry = self.entries.remove(pos);
                self.entries.push(entry);
                false
            }
            None => {
                if self.entries.len() >= self.capacity {
                    let evicted = self.entries.remove(0);
                    debug!("layer pool: closing '{}'", evicted.path.display());
                }
                let dataset = Dataset::open_ex(path, None, &self.open_options)?;
                self.opened += 1;
                self.entries.push(PoolEntry {
                    path: path.to_path_buf(),
                    dataset,
                });
                true
            }
        };
        let entry = self
            .entries
            .last_mut()
            .ok_or_else(|| GdalVecError::OpenFailed {
                path: path.display().to_string(),
                msg: "layer pool is empty".to_string(),
            })?;
        Ok((&mut entry.dataset, reopened))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TempFixture;

    fn point_file(name: &str, x: f64) -> TempFixture {
        let text = format!(
            r#"{{"type":"FeatureCollection","features":[{{"type":"Feature","properties":{{"v":1}},"geometry":{{"type":"Point","coordinates":[{x},0]}}}}]}}"#
        );
        TempFixture::with_contents(name, text.as_bytes())
    }

    #[test]
    fn test_lru_eviction() -> Result<()> {
        let a = point_file("a.geojson", 1.0);
        let b = point_file("b.geojson", 2.0);
        let c = point_file("c.geojson", 3.0);
        let mut pool = LayerPool::new(2);

        assert!(pool.acquire(a.path())?.1);
        assert!(pool.acquire(b.path())?.1);
        assert!(!pool.acquire(a.path())?.1);
        // b is the least recently used
        assert!(pool.acquire(c.path())?.1);
        assert_eq!(pool.open_count(), 2);
        assert!(!pool.acquire(a.path())?.1);
        assert!(pool.acquire(b.path())?.1);
        assert_eq!(pool.opened(), 4);

        let (dataset, _) = pool.acquire(b.path())?;
        assert_eq!(dataset.layer_names(), vec!["b"]);
        Ok(())
    }

    #[test]
    fn test_capacity_from_config() -> Result<()> {
        assert_eq!(LayerPool::from_config()?.capacity(), DEFAULT_POOL_SIZE);
        crate::config::set_thread_local_config_option("GDALVEC_LAYER_POOL_SIZE", "3")?;
        assert_eq!(LayerPool::from_config()?.capacity(), 3);
        crate::config::set_thread_local_config_option("GDALVEC_LAYER_POOL_SIZE", "x")?;
        assert!(LayerPool::from_config().is_err());
        crate::config::clear_thread_local_config_option("GDALVEC_LAYER_POOL_SIZE")?;
        Ok(())
    }
}
