use std::io::Write;
use std::sync::Arc;

use crate::errors::{GdalVecError, Result};
use crate::iso8211::{FieldDefn, SubfieldValue, DDF_FIELD_TERMINATOR, DDF_LEADER_SIZE};

fn digits(n: usize) -> usize {
    n.max(1).to_string().len()
}

/// Lay out a record: leader, directory and field area.
fn encode_record(ddr: bool, fields: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let lengths: Vec<usize> = fields.iter().map(|(_, d)| d.len() + 1).collect();
    let area_len: usize = lengths.iter().sum();
    let size_field_length = digits(lengths.iter().copied().max().unwrap_or(0));
    let size_field_pos = digits(area_len);
    let size_field_tag = 4;
    if size_field_length > 9 || size_field_pos > 9 {
        return Err(GdalVecError::Iso8211("Record too large".to_string()));
    }

    let entry_width = size_field_tag + size_field_length + size_field_pos;
    let field_area_start = DDF_LEADER_SIZE + fields.len() * entry_width + 1;
    let record_length = field_area_start + area_len;
    if record_length > 99_999 {
        return Err(GdalVecError::Iso8211(format!(
            "Record of {record_length} bytes does not fit a 5 digit leader"
        )));
    }

    let leader = if ddr {
        format!(
            "{record_length:05}3LE1 09{field_area_start:05} ! {size_field_length}{size_field_pos}0{size_field_tag}"
        )
    } else {
        format!(
            "{record_length:05} D     {field_area_start:05}   {size_field_length}{size_field_pos}0{size_field_tag}"
        )
    };
    debug_assert_eq!(leader.len(), DDF_LEADER_SIZE);

    let mut out = Vec::with_capacity(record_length);
    out.extend_from_slice(leader.as_bytes());
    let mut pos = 0;
    for ((tag, _), len) in fields.iter().zip(&lengths) {
        if tag.len() != size_field_tag {
            return Err(GdalVecError::Iso8211(format!("Invalid field tag '{tag}'")));
        }
        out.extend_from_slice(tag.as_bytes());
        out.extend_from_slice(format!("{len:0size_field_length$}").as_bytes());
        out.extend_from_slice(format!("{pos:0size_field_pos$}").as_bytes());
        pos += len;
    }
    out.push(DDF_FIELD_TERMINATOR);
    for (_, data) in fields {
        out.extend_from_slice(data);
        out.push(DDF_FIELD_TERMINATOR);
    }
    Ok(out)
}

/// Writes an ISO 8211 module: the data descriptive record on creation, then
/// one data record per [`ModuleWriter::write_record`].
pub struct ModuleWriter<W: Write> {
    out: W,
    field_defns: Vec<Arc<FieldDefn>>,
}

impl<W: Write> ModuleWriter<W> {
    pub fn create(mut out: W, title: &str, field_defns: Vec<FieldDefn>) -> Result<Self> {
        let mut control = b"0000;&   ".to_vec();
        control.extend_from_slice(title.as_bytes());
        let mut fields = vec![("0000".to_string(), control)];
        for defn in &field_defns {
            let mut ddr = defn.to_ddr();
            ddr.pop();
            fields.push((defn.tag().to_string(), ddr));
        }
        out.write_all(&encode_record(true, &fields)?)?;
        Ok(ModuleWriter {
            out,
            field_defns: field_defns.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn find_field_defn(&self, tag: &str) -> Option<&Arc<FieldDefn>> {
        self.field_defns.iter().find(|d| d.tag() == tag)
    }

    pub fn write_record(&mut self, record: &RecordBuilder) -> Result<()> {
        if let Some((tag, _)) = record
            .fields
            .iter()
            .find(|(tag, _)| self.find_field_defn(tag).is_none())
        {
            return Err(GdalVecError::Iso8211(format!(
                "Field '{tag}' is not defined in this module"
            )));
        }
        self.out.write_all(&encode_record(false, &record.fields)?)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Accumulates the encoded fields of one data record.
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder {
    fields: Vec<(String, Vec<u8>)>,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a field from its subfield groups, in subfield order.
    pub fn add_field(&mut self, defn: &FieldDefn, groups: &[Vec<SubfieldValue>]) -> Result<&mut Self> {
        if groups.len() > 1 && !defn.is_repeating() {
            return Err(GdalVecError::Iso8211(format!(
                "Field '{}' does not repeat",
                defn.tag()
            )));
        }
        let mut data = Vec::new();
        for group in groups {
            if group.len() != defn.subfields().len() {
                return Err(GdalVecError::Iso8211(format!(
                    "Field '{}' has {} subfields, got {} values",
                    defn.tag(),
                    defn.subfields().len(),
                    group.len()
                )));
            }
            for (sub, value) in defn.subfields().iter().zip(group) {
                sub.encode(value, &mut data)?;
            }
        }
        self.fields.push((defn.tag().to_string(), data));
        Ok(self)
    }

    /// Encode a field whose definition is held by `writer`.
    pub fn add<W: Write>(
        &mut self,
        writer: &ModuleWriter<W>,
        tag: &str,
        groups: &[Vec<SubfieldValue>],
    ) -> Result<&mut Self> {
        let defn = writer
            .find_field_defn(tag)
            .cloned()
            .ok_or_else(|| GdalVecError::Iso8211(format!("Field '{tag}' is not defined")))?;
        self.add_field(&defn, groups)
    }
}
