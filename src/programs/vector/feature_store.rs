//! Buffering of whole layers for non-streaming steps
//!
//! Features are either kept in memory or serialized to an anonymous scratch
//! file. The scratch file is unlinked as soon as it is created, so the
//! operating system reclaims it even when the process dies.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::str::FromStr;
use std::sync::Arc;

use log::debug;

use crate::config::get_config_option;
use crate::errors::*;
use crate::vector::{Defn, Feature, StoredFeature};

/// Where a [`FeatureStore`] keeps its features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    #[default]
    Memory,
    TempFile,
}

impl StorageKind {
    /// The storage selected by the `GDALVEC_NON_STREAMING_STORAGE` option,
    /// memory when unset.
    pub fn from_config() -> Result<Self> {
        get_config_option("GDALVEC_NON_STREAMING_STORAGE", "memory")?.parse()
    }
}

impl FromStr for StorageKind {
    type Err = GdalVecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "temp-file" | "tempfile" => Ok(StorageKind::TempFile),
            _ => Err(GdalVecError::BadArgument(format!(
                "Invalid storage '{s}'. Expected memory or temp-file"
            ))),
        }
    }
}

/// A byte range of the scratch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Region {
    pub offset: u64,
    pub len: u64,
}

struct TempFileStore {
    file: File,
    /// End of the used part of the file.
    end: u64,
    entries: Vec<Option<Region>>,
    /// Released regions, sorted by offset.
    free: Vec<Region>,
    buf: Vec<u8>,
}

impl TempFileStore {
    fn new() -> Result<Self> {
        let dir = get_config_option("CPL_TMPDIR", "")?;
        let file = if dir.is_empty() {
            tempfile::tempfile()?
        } else {
            tempfile::tempfile_in(&dir)?
        };
        Ok(TempFileStore {
            file,
            end: 0,
            entries: Vec::new(),
            free: Vec::new(),
            buf: Vec::new(),
        })
    }

    /// First free region large enough for `len` bytes, else the end of file.
    fn allocate(&mut self, len: u64) -> u64 {
        if let Some(pos) = self.free.iter().position(|r| r.len >= len) {
            let region = self.free[pos];
            if region.len == len {
                self.free.remove(pos);
            } else {
                self.free[pos] = Region {
                    offset: region.offset + len,
                    len: region.len - len,
                };
            }
            return region.offset;
        }
        let offset = self.end;
        self.end += len;
        offset
    }

    fn release(&mut self, region: Region) {
        let pos = self.free.partition_point(|r| r.offset < region.offset);
        self.free.insert(pos, region);
        // coalesce with neighbours
        if pos + 1 < self.free.len() {
            let next = self.free[pos + 1];
            if region.offset + region.len == next.offset {
                self.free[pos].len += next.len;
                self.free.remove(pos + 1);
            }
        }
        if pos > 0 {
            let prev = self.free[pos - 1];
            if prev.offset + prev.len == self.free[pos].offset {
                self.free[pos - 1].len += self.free[pos].len;
                self.free.remove(pos);
            }
        }
    }

    fn push(&mut self, parts: &StoredFeature) -> Result<()> {
        self.buf.clear();
        bincode::serialize_into(&mut self.buf, parts)?;
        let len = self.buf.len() as u64;
        let offset = self.allocate(len);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&self.buf)?;
        self.entries.push(Some(Region { offset, len }));
        Ok(())
    }

    fn take(&mut self, idx: usize) -> Result<Option<StoredFeature>> {
        let Some(region) = self.entries.get_mut(idx).and_then(Option::take) else {
            return Ok(None);
        };
        self.buf.resize(region.len as usize, 0);
        self.file.seek(SeekFrom::Start(region.offset))?;
        self.file.read_exact(&mut self.buf)?;
        let parts = bincode::deserialize(&self.buf)?;
        self.release(region);
        Ok(Some(parts))
    }

    fn clear(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.end = 0;
        self.entries.clear();
        self.free.clear();
        Ok(())
    }
}

enum Storage {
    Memory(Vec<Option<StoredFeature>>),
    TempFile(TempFileStore),
}

/// Indexed buffer of features.
///
/// Features are stored without their definition and rebound to one when
/// taken back. Each feature can be taken once; taking it releases its
/// storage.
pub struct FeatureStore {
    storage: Storage,
}

impl FeatureStore {
    pub fn new(kind: StorageKind) -> Result<Self> {
        let storage = match kind {
            StorageKind::Memory => Storage::Memory(Vec::new()),
            StorageKind::TempFile => Storage::TempFile(TempFileStore::new()?),
        };
        debug!("created {kind:?} feature store");
        Ok(FeatureStore { storage })
    }

    pub fn kind(&self) -> StorageKind {
        match self.storage {
            Storage::Memory(_) => StorageKind::Memory,
            Storage::TempFile(_) => StorageKind::TempFile,
        }
    }

    /// Append a feature, returning its index.
    pub fn push(&mut self, feature: Feature) -> Result<usize> {
        let parts = feature.into_parts();
        match &mut self.storage {
            Storage::Memory(features) => {
                features.push(Some(parts));
                Ok(features.len() - 1)
            }
            Storage::TempFile(store) => {
                store.push(&parts)?;
                Ok(store.entries.len() - 1)
            }
        }
    }

    /// Remove the feature at `idx`, bound to `defn`. `None` when it was
    /// already taken or never stored.
    pub fn take(&mut self, idx: usize, defn: &Arc<Defn>) -> Result<Option<Feature>> {
        let parts = match &mut self.storage {
            Storage::Memory(features) => features.get_mut(idx).and_then(Option::take),
            Storage::TempFile(store) => store.take(idx)?,
        };
        Ok(parts.map(|p| Feature::from_parts(defn.clone(), p)))
    }

    /// Number of features pushed, taken ones included.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Memory(features) => features.len(),
            Storage::TempFile(store) => store.entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) -> Result<()> {
        match &mut self.storage {
            Storage::Memory(features) => {
                features.clear();
                Ok(())
            }
            Storage::TempFile(store) => store.clear(),
        }
    }

    #[cfg(test)]
    pub(crate) fn region(&self, idx: usize) -> Option<Region> {
        match &self.storage {
            Storage::Memory(_) => None,
            Storage::TempFile(store) => store.entries.get(idx).copied().flatten(),
        }
    }

    #[cfg(test)]
    pub(crate) fn file_end(&self) -> u64 {
        match &self.storage {
            Storage::Memory(_) => 0,
            Storage::TempFile(store) => store.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{clear_thread_local_config_option, set_thread_local_config_option};
    use crate::test_utils::wkt_layer;
    use crate::vector::{FieldValue, GeometryType, Layer};

    fn features() -> (Arc<Defn>, Vec<Feature>) {
        let mut layer = wkt_layer(
            "pts",
            GeometryType::Point,
            &["POINT (0 0)", "POINT (1 1)", "POINT (2 2)"],
        );
        let defn = layer.defn().clone();
        let mut out = Vec::new();
        while let Some(f) = layer.next_feature().unwrap() {
            out.push(f);
        }
        (defn, out)
    }

    #[test]
    fn test_storage_kind() -> Result<()> {
        assert_eq!("memory".parse::<StorageKind>()?, StorageKind::Memory);
        assert_eq!("Temp-File".parse::<StorageKind>()?, StorageKind::TempFile);
        assert!("disk".parse::<StorageKind>().is_err());

        set_thread_local_config_option("GDALVEC_NON_STREAMING_STORAGE", "temp-file")?;
        assert_eq!(StorageKind::from_config()?, StorageKind::TempFile);
        clear_thread_local_config_option("GDALVEC_NON_STREAMING_STORAGE")?;
        Ok(())
    }

    #[test]
    fn test_take_once() -> Result<()> {
        for kind in [StorageKind::Memory, StorageKind::TempFile] {
            let (defn, input) = features();
            let mut store = FeatureStore::new(kind)?;
            for f in input.iter().cloned() {
                store.push(f)?;
            }
            assert_eq!(store.len(), 3);
            let f = store.take(1, &defn)?.unwrap();
            assert_eq!(f, input[1]);
            assert_eq!(f.field("name")?, Some(&FieldValue::StringValue("f1".into())));
            assert!(store.take(1, &defn)?.is_none());
            assert!(store.take(7, &defn)?.is_none());
            assert_eq!(store.take(2, &defn)?.unwrap(), input[2]);
        }
        Ok(())
    }

    #[test]
    fn test_temp_file_reuses_released_regions() -> Result<()> {
        let (defn, input) = features();
        let mut store = FeatureStore::new(StorageKind::TempFile)?;
        store.push(input[0].clone())?;
        store.push(input[1].clone())?;
        let first = store.region(0).unwrap();
        let end = store.file_end();

        store.take(0, &defn)?;
        assert!(store.region(0).is_none());
        // same size, first fit lands on the released region
        let idx = store.push(input[2].clone())?;
        assert_eq!(store.region(idx).unwrap().offset, first.offset);
        assert_eq!(store.file_end(), end);
        assert_eq!(store.take(idx, &defn)?.unwrap(), input[2]);
        assert_eq!(store.take(1, &defn)?.unwrap(), input[1]);
        Ok(())
    }
}
