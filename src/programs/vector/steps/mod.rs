//! Built-in pipeline steps
//!
//! Every step parses its arguments with `structopt`, the step name standing
//! in for the program name, so `buffer --help` style errors name the step.

mod check_geometry;
mod collect;
mod concat;
mod coverage;
mod explode;
mod filter;
mod geometry;
mod read;
mod select;
mod sort;
mod write;

use structopt::StructOpt;

pub use check_geometry::CheckGeometryStep;
pub use collect::CollectStep;
pub use concat::{ConcatLayer, ConcatStep};
pub use coverage::{CheckCoverageStep, CleanCoverageStep};
pub use explode::{ExplodeCollectionsStep, ExplodeTranslator};
pub use filter::FilterStep;
pub use geometry::{
    BufferStep, MakeValidStep, ReprojectStep, SegmentizeStep, SetGeomTypeStep, SimplifyStep,
    SwapXyStep,
};
pub use read::ReadStep;
pub use select::SelectStep;
pub use sort::{SortMethod, SortStep};
pub use write::WriteStep;

/// Layer and geometry field a step works on.
#[derive(Debug, Clone, Default, StructOpt)]
pub struct ActiveArgs {
    /// Layer to process, all layers when unset
    #[structopt(long)]
    pub active_layer: Option<String>,

    /// Geometry field to process, all geometry fields when unset
    #[structopt(long)]
    pub active_geometry: Option<String>,
}
