//! Streaming vector pipelines and an S-57 reader, in pure Rust.
//!
//! The crate has two halves sharing one OGR-style data model ([`vector`]):
//!
//! * [`programs::vector`]: chains of processing steps (`read ! buffer ! write`)
//!   that transform datasets lazily, layer by layer, falling back to batch
//!   processing for algorithms that need the whole input at once.
//! * [`s57`]: a reader for IHO S-57 electronic navigational charts, built on the
//!   ISO 8211 record layer in [`iso8211`].
//!
//! ## Use
//!
//! ```no_run
//! use gdalvec::programs::vector::VectorPipeline;
//! use gdalvec::progress::Progress;
//!
//! # fn main() -> gdalvec::errors::Result<()> {
//! let mut pipeline = VectorPipeline::new();
//! pipeline.parse("read roads.geojson ! buffer --distance 10 ! write buffered.geojson")?;
//! pipeline.run(&mut Progress::none())?;
//! # Ok(())
//! # }
//! ```
//!
//! Reading a chart:
//!
//! ```no_run
//! use gdalvec::vector::{Dataset, LayerAccess};
//!
//! # fn main() -> gdalvec::errors::Result<()> {
//! let mut dataset = Dataset::open("US5MA22M.000")?;
//! for layer in dataset.layers_mut() {
//!     for feature in layer.features() {
//!         let feature = feature?;
//!         println!("{:?} {:?}", feature.fid(), feature.geometry().map(|g| g.geometry_type()));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![crate_name = "gdalvec"]
#![crate_type = "lib"]

pub mod config;
pub mod cpl;
pub mod driver;
pub mod errors;
pub mod iso8211;
pub mod programs;
pub mod progress;
pub mod s57;
pub mod spatial_ref;
pub mod vector;

pub use driver::DriverManager;
pub use vector::Dataset;

#[cfg(test)]
pub(crate) mod test_utils;
