use std::sync::Arc;

use crate::errors::{GdalVecError, Result};
use crate::iso8211::{FieldDefn, SubfieldValue};

/// One field of a data record: its definition and its raw bytes, without
/// the trailing field terminator.
#[derive(Debug, Clone)]
pub struct Field {
    defn: Arc<FieldDefn>,
    data: Vec<u8>,
}

impl Field {
    pub(crate) fn new(defn: Arc<FieldDefn>, data: Vec<u8>) -> Self {
        Field { defn, data }
    }

    pub fn tag(&self) -> &str {
        self.defn.tag()
    }

    pub fn defn(&self) -> &FieldDefn {
        &self.defn
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decode every subfield group of the field.
    ///
    /// A non-repeating field has at most one group.
    pub fn decode(&self) -> Result<Vec<Vec<SubfieldValue>>> {
        let subfields = self.defn.subfields();
        if subfields.is_empty() {
            return Ok(vec![]);
        }
        let mut groups = Vec::new();
        let mut offset = 0;
        while offset < self.data.len() {
            let start = offset;
            let mut group = Vec::with_capacity(subfields.len());
            for sub in subfields {
                let (value, consumed) = sub.extract(&self.data[offset..]).map_err(|e| {
                    GdalVecError::Iso8211(format!("Field '{}': {e}", self.tag()))
                })?;
                group.push(value);
                offset += consumed;
            }
            groups.push(group);
            if !self.defn.is_repeating() || offset == start {
                break;
            }
        }
        Ok(groups)
    }

    /// Number of subfield groups in the field.
    pub fn repeat_count(&self) -> usize {
        if !self.defn.is_repeating() {
            return usize::from(!self.data.is_empty());
        }
        match self.defn.fixed_width() {
            Some(w) if w > 0 => self.data.len() / w,
            _ => self.decode().map(|g| g.len()).unwrap_or_default(),
        }
    }

    /// Value of subfield `name` in group `iteration`.
    pub fn subfield(&self, name: &str, iteration: usize) -> Result<Option<SubfieldValue>> {
        let Some(idx) = self.defn.find_subfield(name) else {
            return Ok(None);
        };
        Ok(self
            .decode()?
            .into_iter()
            .nth(iteration)
            .and_then(|mut group| (idx < group.len()).then(|| group.swap_remove(idx))))
    }

    pub fn int_subfield(&self, name: &str, iteration: usize) -> Option<i64> {
        self.subfield(name, iteration).ok().flatten()?.as_int()
    }

    pub fn float_subfield(&self, name: &str, iteration: usize) -> Option<f64> {
        self.subfield(name, iteration).ok().flatten()?.as_float()
    }

    pub fn string_subfield(&self, name: &str, iteration: usize) -> Option<String> {
        Some(self.subfield(name, iteration).ok().flatten()?.as_text())
    }

    pub fn bytes_subfield(&self, name: &str, iteration: usize) -> Option<Vec<u8>> {
        match self.subfield(name, iteration).ok().flatten()? {
            SubfieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// A data record: an ordered list of fields.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    pub(crate) fn new(fields: Vec<Field>) -> Self {
        Record { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// The `occurrence`-th field with the given tag.
    pub fn find_field(&self, tag: &str, occurrence: usize) -> Option<&Field> {
        self.fields.iter().filter(|f| f.tag() == tag).nth(occurrence)
    }

    pub fn has_field(&self, tag: &str) -> bool {
        self.find_field(tag, 0).is_some()
    }

    pub fn int_subfield(&self, tag: &str, subfield: &str, iteration: usize) -> Option<i64> {
        self.find_field(tag, 0)?.int_subfield(subfield, iteration)
    }

    pub fn float_subfield(&self, tag: &str, subfield: &str, iteration: usize) -> Option<f64> {
        self.find_field(tag, 0)?.float_subfield(subfield, iteration)
    }

    pub fn string_subfield(&self, tag: &str, subfield: &str, iteration: usize) -> Option<String> {
        self.find_field(tag, 0)?.string_subfield(subfield, iteration)
    }

    pub fn bytes_subfield(&self, tag: &str, subfield: &str, iteration: usize) -> Option<Vec<u8>> {
        self.find_field(tag, 0)?.bytes_subfield(subfield, iteration)
    }
}
