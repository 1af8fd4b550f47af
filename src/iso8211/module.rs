use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::errors::{GdalVecError, Result};
use crate::iso8211::{
    looks_like_iso8211, Field, FieldDefn, Record, DDF_FIELD_TERMINATOR, DDF_LEADER_SIZE,
};

/// Any seekable byte source a module can be read from.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// The fixed 24 byte leader starting every record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Leader {
    pub record_length: usize,
    pub leader_id: u8,
    pub field_control_length: usize,
    pub field_area_start: usize,
    pub size_field_length: usize,
    pub size_field_pos: usize,
    pub size_field_tag: usize,
}

pub(crate) fn scan_int(bytes: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| GdalVecError::Iso8211("Non-ASCII number in record".to_string()))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse()
        .map_err(|_| GdalVecError::Iso8211(format!("Invalid number '{text}' in record")))
}

impl Leader {
    pub(crate) fn parse(buf: &[u8]) -> Result<Leader> {
        if buf.len() < DDF_LEADER_SIZE {
            return Err(GdalVecError::Iso8211("Record leader is truncated".to_string()));
        }
        let leader = Leader {
            record_length: scan_int(&buf[0..5])?,
            leader_id: buf[6],
            field_control_length: scan_int(&buf[10..12])?,
            field_area_start: scan_int(&buf[12..17])?,
            size_field_length: scan_int(&buf[20..21])?,
            size_field_pos: scan_int(&buf[21..22])?,
            size_field_tag: scan_int(&buf[23..24])?,
        };
        if leader.record_length < DDF_LEADER_SIZE
            || leader.field_area_start < DDF_LEADER_SIZE
            || leader.field_area_start > leader.record_length
            || leader.size_field_length == 0
            || leader.size_field_pos == 0
            || leader.size_field_tag == 0
        {
            return Err(GdalVecError::Iso8211(format!(
                "Corrupt record leader '{}'",
                String::from_utf8_lossy(&buf[..DDF_LEADER_SIZE])
            )));
        }
        Ok(leader)
    }

    /// Split a complete record into `(tag, field data)` pairs using its
    /// directory. The field terminator is stripped from the data.
    pub(crate) fn fields<'a>(&self, record: &'a [u8]) -> Result<Vec<(String, &'a [u8])>> {
        let entry_width = self.size_field_tag + self.size_field_length + self.size_field_pos;
        let mut out = Vec::new();
        let mut pos = DDF_LEADER_SIZE;
        while pos + entry_width <= self.field_area_start && record[pos] != DDF_FIELD_TERMINATOR {
            let tag_end = pos + self.size_field_tag;
            let len_end = tag_end + self.size_field_length;
            let tag = String::from_utf8_lossy(&record[pos..tag_end]).into_owned();
            let length = scan_int(&record[tag_end..len_end])?;
            let offset = scan_int(&record[len_end..pos + entry_width])?;

            let start = self.field_area_start + offset;
            let end = start + length;
            if end > record.len() {
                return Err(GdalVecError::Iso8211(format!(
                    "Field '{tag}' extends past the end of the record"
                )));
            }
            let mut data = &record[start..end];
            if data.last() == Some(&DDF_FIELD_TERMINATOR) {
                data = &data[..data.len() - 1];
            }
            out.push((tag, data));
            pos += entry_width;
        }
        Ok(out)
    }
}

/// Read as many bytes as available into `buf`, stopping early only at end of file.
fn read_up_to(reader: &mut dyn ReadSeek, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// An open ISO 8211 module.
///
/// The data descriptive record is parsed on open; data records are then read
/// one at a time with [`Module::read_record`].
pub struct Module {
    reader: Box<dyn ReadSeek>,
    description: String,
    field_defns: Vec<Arc<FieldDefn>>,
    first_record_offset: u64,
    offset: u64,
    length: u64,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("description", &self.description)
            .field("field_defns", &self.field_defns.len())
            .field("offset", &self.offset)
            .finish()
    }
}

impl Module {
    /// Open the module stored at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Module> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| GdalVecError::OpenFailed {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;
        Self::from_reader(Box::new(BufReader::new(file)), &path.display().to_string())
    }

    /// Read a module from any seekable source.
    pub fn from_reader(mut reader: Box<dyn ReadSeek>, description: &str) -> Result<Module> {
        let length = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut leader_buf = [0u8; DDF_LEADER_SIZE];
        if read_up_to(reader.as_mut(), &mut leader_buf)? < DDF_LEADER_SIZE
            || !looks_like_iso8211(&leader_buf)
        {
            return Err(GdalVecError::Iso8211(format!(
                "'{description}' does not appear to be an ISO 8211 file"
            )));
        }
        let leader = Leader::parse(&leader_buf)?;
        let mut record = leader_buf.to_vec();
        record.resize(leader.record_length, 0);
        if read_up_to(reader.as_mut(), &mut record[DDF_LEADER_SIZE..])?
            < leader.record_length - DDF_LEADER_SIZE
        {
            return Err(GdalVecError::Iso8211(format!(
                "Data descriptive record of '{description}' is truncated"
            )));
        }

        let field_control_length = match leader.field_control_length {
            0 => 9,
            n => n,
        };
        let mut field_defns = Vec::new();
        for (tag, data) in leader.fields(&record)? {
            if tag == "0000" {
                continue;
            }
            field_defns.push(Arc::new(FieldDefn::from_ddr(
                &tag,
                data,
                field_control_length,
            )?));
        }
        debug!(
            "ISO 8211 module '{description}': {} field definitions",
            field_defns.len()
        );

        Ok(Module {
            reader,
            description: description.to_string(),
            field_defns,
            first_record_offset: leader.record_length as u64,
            offset: leader.record_length as u64,
            length,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn field_defns(&self) -> &[Arc<FieldDefn>] {
        &self.field_defns
    }

    pub fn find_field_defn(&self, tag: &str) -> Option<&Arc<FieldDefn>> {
        self.field_defns.iter().find(|d| d.tag() == tag)
    }

    /// Byte offset of the next record.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total size of the module in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Position the reader on the first data record.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(self.first_record_offset))?;
        self.offset = self.first_record_offset;
        Ok(())
    }

    /// Read the next data record, or `None` at the end of the module.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let mut leader_buf = [0u8; DDF_LEADER_SIZE];
        match read_up_to(self.reader.as_mut(), &mut leader_buf)? {
            0 => return Ok(None),
            n if n < DDF_LEADER_SIZE => {
                return Err(GdalVecError::Iso8211(format!(
                    "Truncated record leader at offset {}",
                    self.offset
                )))
            }
            _ => {}
        }
        let leader = Leader::parse(&leader_buf)?;
        if leader.leader_id != b'D' && leader.leader_id != b'R' {
            return Err(GdalVecError::Iso8211(format!(
                "Unexpected leader identifier '{}' at offset {}",
                leader.leader_id as char, self.offset
            )));
        }
        let mut buf = leader_buf.to_vec();
        buf.resize(leader.record_length, 0);
        if read_up_to(self.reader.as_mut(), &mut buf[DDF_LEADER_SIZE..])?
            < leader.record_length - DDF_LEADER_SIZE
        {
            return Err(GdalVecError::Iso8211(format!(
                "Truncated data record at offset {}",
                self.offset
            )));
        }
        self.offset += leader.record_length as u64;

        let mut fields = Vec::new();
        for (tag, data) in leader.fields(&buf)? {
            let defn = self.find_field_defn(&tag).cloned().ok_or_else(|| {
                GdalVecError::Iso8211(format!("Undefined field '{tag}' in data record"))
            })?;
            fields.push(Field::new(defn, data.to_vec()));
        }
        Ok(Some(Record::new(fields)))
    }
}
