//! Spatial references and coordinate transformations
//!
//! Only geographic WGS 84 (`EPSG:4326`) and spherical Web Mercator (`EPSG:3857`)
//! can be transformed between. Any other definition is carried through the
//! pipeline untouched and compared by its textual definition.

mod srs;
mod transform;

pub use srs::SpatialRef;
pub use transform::CoordTransform;
