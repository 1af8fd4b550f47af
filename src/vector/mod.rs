//! Vector data model
//!
//! Datasets hold named layers, layers produce features on demand, and features
//! carry attribute values plus zero or more geometries bound to a shared
//! [`Defn`].
//!
//! ## Reading
//!
//! ```
//! use gdalvec::vector::{Dataset, LayerAccess};
//!
//! # fn main() -> gdalvec::errors::Result<()> {
//! let mut dataset = Dataset::new("empty");
//! for layer in dataset.layers_mut() {
//!     for feature in layer.features() {
//!         let feature = feature?;
//!         println!("{:?}", feature.fid());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub use crate::vector::dataset::Dataset;
pub use crate::vector::defn::{Defn, FieldDefn, FieldMap, FieldType, GeomFieldDefn};
pub use crate::vector::feature::{Feature, FieldValue};
pub use crate::vector::geometry::{Geometry, GeometryType};
pub use crate::vector::options::LayerOptions;
pub use crate::vector::layer::{
    Envelope, FeatureIterator, Layer, LayerAccess, LayerCaps, MemoryLayer,
};

pub(crate) use crate::vector::feature::StoredFeature;

mod dataset;
mod defn;
mod feature;
pub(crate) mod geojson;
mod geometry;
mod layer;
mod options;
pub mod ops;

#[cfg(test)]
mod vector_tests;
