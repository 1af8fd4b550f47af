//! S-57 electronic navigational charts
//!
//! An S-57 cell is an ISO 8211 module holding feature records, which carry
//! attributes and point at spatial primitives (nodes, edges), and vector
//! records holding the coordinates of those primitives. [`S57Reader`] indexes
//! both kinds of record and assembles features with geometries on demand.
//!
//! Cells are normally opened through [`Dataset::open`], which yields a `DSID`
//! layer, one layer per object class (or one per primitive in generic mode)
//! and optionally the primitive layers.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use crate::cpl::CslStringList;
use crate::errors::Result;
use crate::iso8211::looks_like_iso8211;
use crate::progress::Progress;
use crate::vector::Dataset;

mod class_registrar;
pub mod feature_defns;
mod layer;
mod polygon;
mod reader;
mod record_index;

pub use class_registrar::{AttributeInfo, AttributeType, ObjectClassInfo, Primitive, S57ClassRegistrar};
pub use layer::S57Layer;
pub use polygon::build_polygon_from_edges;
pub use reader::{S57Options, S57Reader};
pub use record_index::RecordIndex;

/// Record name of isolated nodes.
pub const RCNM_VI: i32 = 110;
/// Record name of connected nodes.
pub const RCNM_VC: i32 = 120;
/// Record name of edges.
pub const RCNM_VE: i32 = 130;
/// Record name of faces.
pub const RCNM_VF: i32 = 140;

pub const PRIM_P: i64 = 1;
pub const PRIM_L: i64 = 2;
pub const PRIM_A: i64 = 3;
pub const PRIM_N: i64 = 255;

/// Whether `header` looks like the start of an S-57 cell.
pub fn looks_like_s57(header: &[u8]) -> bool {
    looks_like_iso8211(header) && header.windows(4).any(|w| w == b"DSID")
}

/// Open the cell at `path` as a dataset.
pub fn open_dataset(path: &Path, open_options: &CslStringList) -> Result<Dataset> {
    let options = S57Options::from_csl(open_options);
    let mut reader = S57Reader::new(options);
    reader.open(path)?;
    dataset_from_reader(reader, &path.display().to_string())
}

/// Build the layers of an opened reader.
///
/// Attaches the class catalogue unless the reader is in generic mode, then
/// ingests the cell.
pub fn dataset_from_reader(mut reader: S57Reader, description: &str) -> Result<Dataset> {
    if reader.options().class_registrar && reader.class_registrar().is_none() {
        reader.set_class_registrar(Some(Arc::new(S57ClassRegistrar::load()?)));
    }
    reader.ingest(&mut Progress::none())?;
    let defns = reader.generate_feature_defns()?;
    let return_primitives = reader.options().return_primitives;

    let reader = Rc::new(RefCell::new(reader));
    let mut dataset = Dataset::new(description);
    dataset.set_driver_name("S57");
    dataset.add_layer(Box::new(S57Layer::dsid(reader.clone())));
    for defn in defns {
        dataset.add_layer(Box::new(S57Layer::features(reader.clone(), defn)));
    }
    if return_primitives {
        for rcnm in [RCNM_VI, RCNM_VC, RCNM_VE] {
            dataset.add_layer(Box::new(S57Layer::primitives(reader.clone(), rcnm)));
        }
    }
    Ok(dataset)
}
