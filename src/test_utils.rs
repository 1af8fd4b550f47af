use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{pop_quiet, push_quiet};
use crate::vector::{Dataset, Defn, FieldDefn, FieldType, Geometry, GeometryType, MemoryLayer};
use crate::vector::{Feature, Layer};

/// A struct that contains a temporary directory and a path to a file in that directory.
pub struct TempFixture {
    _temp_dir: tempfile::TempDir,
    temp_path: PathBuf,
}

impl TempFixture {
    /// Creates a temporary directory and path to a non-existent file with given `name`.
    /// Useful for writing results to during testing
    ///
    /// Returns the struct `TempFixture` that contains the temp dir (for clean-up on `drop`)
    /// as well as the empty file path.
    pub fn empty(name: &str) -> Self {
        let _temp_dir = tempfile::tempdir().unwrap();
        let temp_path = _temp_dir.path().join(name);
        Self {
            _temp_dir,
            temp_path,
        }
    }

    /// Creates a file named `name` holding `contents` in a temporary directory.
    pub fn with_contents(name: &str, contents: &[u8]) -> Self {
        let staging = Self::empty(name);
        std::fs::write(&staging.temp_path, contents).unwrap();
        staging
    }

    pub fn path(&self) -> &Path {
        &self.temp_path
    }
}

impl AsRef<Path> for TempFixture {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

/// Scoped value for temporarily suppressing thread-local error log messages.
///
/// Useful for tests that expect errors and want to keep the output log clean
/// of distracting yet expected error messages. The last error slot is still
/// updated.
pub(crate) struct SuppressErrorLog {
    // Make !Sync and !Send, and force use of `new`.
    _private: PhantomData<*mut ()>,
}

impl SuppressErrorLog {
    pub(crate) fn new() -> Self {
        push_quiet();
        SuppressErrorLog {
            _private: PhantomData,
        }
    }
}

impl Drop for SuppressErrorLog {
    fn drop(&mut self) {
        pop_quiet();
    }
}

/// A memory layer named `name` with a `name` string field, an `id` integer
/// field and one geometry field, holding one feature per WKT string.
pub fn wkt_layer(name: &str, geometry_type: GeometryType, wkts: &[&str]) -> MemoryLayer {
    let mut defn = Defn::with_geometry(name, "geom", geometry_type, None);
    defn.add_field(FieldDefn::new("name", FieldType::String));
    defn.add_field(FieldDefn::new("id", FieldType::Integer));
    let mut layer = MemoryLayer::new(Arc::new(defn));
    for (i, wkt) in wkts.iter().enumerate() {
        let mut feature = Feature::new(layer.defn().clone());
        feature.set_field_string("name", &format!("f{i}")).unwrap();
        feature.set_field_integer("id", i as i32).unwrap();
        feature.set_geometry(Geometry::from_wkt(wkt).unwrap()).unwrap();
        layer.create_feature(feature).unwrap();
    }
    layer
}

/// A memory dataset holding a single [`wkt_layer`].
pub fn wkt_dataset(name: &str, geometry_type: GeometryType, wkts: &[&str]) -> Dataset {
    let mut dataset = Dataset::new("mem");
    dataset.add_layer(Box::new(wkt_layer(name, geometry_type, wkts)));
    dataset
}

/// Drain a layer into `(fid, wkt of first geometry)` pairs.
pub fn collect_wkt(layer: &mut dyn Layer) -> Vec<(Option<i64>, Option<String>)> {
    layer.reset_reading();
    let mut out = Vec::new();
    while let Some(f) = layer.next_feature().unwrap() {
        out.push((f.fid(), f.geometry().map(|g| g.wkt().unwrap())));
    }
    out
}

/// Assert numerical difference between two expressions is less than
/// 64-bit machine epsilon or a specified epsilon.
///
/// # Examples:
/// ```rust, ignore
/// use gdalvec::assert_near;
/// use std::f64::consts::{PI, E};
/// assert_near!(PI / E, 1.1557273497909217);
/// // with specified epsilon
/// assert_near!(PI / E, 1.15572734, epsilon = 1e-8);
/// ```
#[macro_export]
macro_rules! assert_near {
    ($left:expr, $right:expr) => {
        assert_near!($left, $right, epsilon = f64::EPSILON)
    };
    ($left:expr, $right:expr, epsilon = $ep:expr) => {
        assert!(
            ($left - $right).abs() < $ep,
            "|{} - {}| = {} is greater than epsilon {:.4e}",
            $left,
            $right,
            ($left - $right).abs(),
            $ep
        )
    };
    ($left:expr, $right:expr, epsilon = $ep:expr, field = $field:expr) => {
        assert!(
            ($left - $right).abs() < $ep,
            "field {}: |{} - {}| = {} is greater than epsilon {:.4e}",
            $field,
            $left,
            $right,
            ($left - $right).abs(),
            $ep
        )
    };
    // Pseudo-specialization
    (Envelope, $left:expr, $right:expr, epsilon = $ep:expr) => {
        assert_near!($left.min_x, $right.min_x, epsilon = $ep, field = "min_x");
        assert_near!($left.max_x, $right.max_x, epsilon = $ep, field = "max_x");
        assert_near!($left.min_y, $right.min_y, epsilon = $ep, field = "min_y");
        assert_near!($left.max_y, $right.max_y, epsilon = $ep, field = "max_y");
    };
}
