//! Geometry operations
//!
//! Unary operations are methods on [`Geometry`](crate::vector::Geometry).
//! Batch operations over many geometries (coverage checks and cleaning) run
//! inside a [`GeometryContext`].

mod context;
pub mod coverage;
mod predicates;
mod set;
mod transformations;
mod validity;

pub use context::{GeomHandle, GeometryContext};
pub use validity::ValidityReport;
