//! Vector pipeline
//!
//! A pipeline is a chain of steps separated by `!`, starting with `read` and
//! ending with `write`:
//!
//! ```text
//! read roads.geojson ! reproject --dst-crs EPSG:3857 ! buffer --distance 10 ! write out.geojson
//! ```
//!
//! Each step consumes the dataset published by the previous one and publishes
//! a new one. Streaming steps wrap the input layers in decorators that
//! translate features as they are pulled ([`PipelineOutputLayer`],
//! [`GeomOneToOneLayer`]); nothing happens until the final `write` drains
//! them. Steps that need the whole input first (coverage operations, spatial
//! sort, collect) buffer it in a [`FeatureStore`] and run a
//! [`BatchAlgorithm`] over it through a [`NonStreamingLayer`].
//!
//! ```
//! use gdalvec::programs::vector::VectorPipeline;
//! use gdalvec::progress::Progress;
//!
//! # fn main() -> gdalvec::errors::Result<()> {
//! let mut pipeline = VectorPipeline::new();
//! // `read` must come first
//! assert!(pipeline.parse("swap-xy ! read in.geojson ! write out.geojson").is_err());
//! # Ok(())
//! # }
//! ```

pub mod feature_store;
mod geos_batch;
mod layer_pool;
mod non_streaming;
mod one_to_one;
mod output_layer;
mod pipeline;
mod registry;
mod step;
pub mod steps;

pub use feature_store::{FeatureStore, StorageKind};
pub use geos_batch::{CoverageOperation, GeosBatch};
pub use layer_pool::LayerPool;
pub use non_streaming::{BatchAlgorithm, BatchPlan, NonStreamingLayer};
pub use one_to_one::{
    GeomFieldSelection, GeomOneToOneAlgorithm, GeomOneToOneLayer, GeomOneToOneTranslator,
};
pub use output_layer::{FeatureTranslator, PipelineOutputLayer};
pub use pipeline::{tokenize, PipelineState, VectorPipeline};
pub use registry::StepRegistry;
pub use step::{map_layers, InputKind, PipelineStep, StandaloneIo, StepAlgorithm};

#[cfg(test)]
mod pipeline_tests;
