//! ISO 8211 modules
//!
//! The exchange format underneath S-57. A module starts with a data
//! descriptive record (DDR) declaring every field and its subfields, followed
//! by data records made of tagged fields.
//!
//! ```
//! use std::io::Cursor;
//! use gdalvec::iso8211::{FieldDefn, Module, ModuleWriter, RecordBuilder, SubfieldValue};
//!
//! # fn main() -> gdalvec::errors::Result<()> {
//! let defns = vec![FieldDefn::new("PNTS", "Points", "*X!Y", "(2b24)")?];
//! let mut writer = ModuleWriter::create(Vec::new(), "demo", defns)?;
//! let mut record = RecordBuilder::new();
//! record.add(&writer, "PNTS", &[vec![SubfieldValue::Int(1), SubfieldValue::Int(2)]])?;
//! writer.write_record(&record)?;
//!
//! let mut module = Module::from_reader(Box::new(Cursor::new(writer.into_inner())), "demo")?;
//! let record = module.read_record()?.unwrap();
//! assert_eq!(record.int_subfield("PNTS", "Y", 0), Some(2));
//! # Ok(())
//! # }
//! ```

mod field_defn;
mod module;
mod record;
mod writer;

pub use field_defn::{
    split_format_controls, DataStructCode, DataTypeCode, FieldDefn, SubfieldDefn, SubfieldFormat,
    SubfieldValue,
};
pub use module::{Module, ReadSeek};
pub use record::{Field, Record};
pub use writer::{ModuleWriter, RecordBuilder};

pub const DDF_LEADER_SIZE: usize = 24;
pub const DDF_FIELD_TERMINATOR: u8 = 0x1e;
pub const DDF_UNIT_TERMINATOR: u8 = 0x1f;

/// Whether `header` starts with a plausible DDR leader.
pub fn looks_like_iso8211(header: &[u8]) -> bool {
    if header.len() < DDF_LEADER_SIZE {
        return false;
    }
    header[..5].iter().all(u8::is_ascii_digit)
        && b"123 ".contains(&header[5])
        && header[6] == b'L'
        && (header[8] == b'1' || header[8] == b' ')
        && header[20..22].iter().all(u8::is_ascii_digit)
        && header[23].is_ascii_digit()
}
