use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{GdalVecError, Result};
use crate::iso8211::{DDF_FIELD_TERMINATOR, DDF_UNIT_TERMINATOR};

/// Structure of a field, as declared by the first field control character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStructCode {
    Elementary,
    Vector,
    Array,
    Concatenated,
}

impl DataStructCode {
    fn from_byte(b: u8) -> DataStructCode {
        match b {
            b'1' => DataStructCode::Vector,
            b'2' => DataStructCode::Array,
            b'3' => DataStructCode::Concatenated,
            _ => DataStructCode::Elementary,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            DataStructCode::Elementary => b'0',
            DataStructCode::Vector => b'1',
            DataStructCode::Array => b'2',
            DataStructCode::Concatenated => b'3',
        }
    }
}

/// Type of the data held by a field, as declared by the second field control character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTypeCode {
    CharString,
    ImplicitPoint,
    ExplicitPoint,
    ExplicitPointScaled,
    CharBitString,
    BitString,
    MixedDataType,
}

impl DataTypeCode {
    fn from_byte(b: u8) -> DataTypeCode {
        match b {
            b'1' => DataTypeCode::ImplicitPoint,
            b'2' => DataTypeCode::ExplicitPoint,
            b'3' => DataTypeCode::ExplicitPointScaled,
            b'4' => DataTypeCode::CharBitString,
            b'5' => DataTypeCode::BitString,
            b'6' => DataTypeCode::MixedDataType,
            _ => DataTypeCode::CharString,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            DataTypeCode::CharString => b'0',
            DataTypeCode::ImplicitPoint => b'1',
            DataTypeCode::ExplicitPoint => b'2',
            DataTypeCode::ExplicitPointScaled => b'3',
            DataTypeCode::CharBitString => b'4',
            DataTypeCode::BitString => b'5',
            DataTypeCode::MixedDataType => b'6',
        }
    }
}

/// Binary representation of a subfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubfieldFormat {
    /// `A` or `A(n)`: character data.
    String(Option<usize>),
    /// `I` or `I(n)`: integer written as characters.
    Int(Option<usize>),
    /// `R` or `R(n)`: real written as characters.
    Float(Option<usize>),
    /// `B(n)`: bit string of `n` bits, kept as raw bytes.
    BitString(usize),
    /// `b1n`: little-endian unsigned integer of `n` bytes.
    UInt(usize),
    /// `b2n`: little-endian signed integer of `n` bytes.
    SInt(usize),
    /// `b3n`/`b4n`: little-endian IEEE float of `n` bytes.
    Real(usize),
}

impl SubfieldFormat {
    /// Parse a single format control such as `A(8)`, `b14` or `B(40)`.
    pub fn parse(format: &str) -> Result<SubfieldFormat> {
        let bad = || GdalVecError::Iso8211(format!("Unsupported subfield format '{format}'"));
        let width = |rest: &str| -> Result<Option<usize>> {
            if rest.is_empty() {
                return Ok(None);
            }
            let inner = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(bad)?;
            inner.trim().parse::<usize>().map(Some).map_err(|_| bad())
        };

        let mut chars = format.chars();
        let kind = chars.next().ok_or_else(bad)?;
        let rest = chars.as_str();
        Ok(match kind {
            'A' | 'C' => SubfieldFormat::String(width(rest)?),
            'I' | 'S' => SubfieldFormat::Int(width(rest)?),
            'R' => SubfieldFormat::Float(width(rest)?),
            'B' => {
                let bits = width(rest)?.ok_or_else(bad)?;
                if bits % 8 != 0 {
                    return Err(bad());
                }
                SubfieldFormat::BitString(bits / 8)
            }
            'b' => {
                let mut digits = rest.chars();
                let code = digits.next().ok_or_else(bad)?;
                let size: usize = digits.as_str().parse().map_err(|_| bad())?;
                match (code, size) {
                    ('1', 1 | 2 | 4 | 8) => SubfieldFormat::UInt(size),
                    ('2', 1 | 2 | 4 | 8) => SubfieldFormat::SInt(size),
                    ('3' | '4', 4 | 8) => SubfieldFormat::Real(size),
                    _ => return Err(bad()),
                }
            }
            _ => return Err(bad()),
        })
    }

    /// Width in bytes, or `None` for variable-length subfields.
    pub fn fixed_width(&self) -> Option<usize> {
        match *self {
            SubfieldFormat::String(w) | SubfieldFormat::Int(w) | SubfieldFormat::Float(w) => w,
            SubfieldFormat::BitString(n)
            | SubfieldFormat::UInt(n)
            | SubfieldFormat::SInt(n)
            | SubfieldFormat::Real(n) => Some(n),
        }
    }

    fn is_binary(&self) -> bool {
        !matches!(
            self,
            SubfieldFormat::String(_) | SubfieldFormat::Int(_) | SubfieldFormat::Float(_)
        )
    }
}

/// A decoded subfield value.
#[derive(Debug, Clone, PartialEq)]
pub enum SubfieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SubfieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SubfieldValue::Int(v) => Some(*v),
            SubfieldValue::Float(v) => Some(*v as i64),
            SubfieldValue::Text(s) => s.trim().parse().ok(),
            SubfieldValue::Bytes(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            SubfieldValue::Int(v) => Some(*v as f64),
            SubfieldValue::Float(v) => Some(*v),
            SubfieldValue::Text(s) => s.trim().parse().ok(),
            SubfieldValue::Bytes(_) => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            SubfieldValue::Int(v) => v.to_string(),
            SubfieldValue::Float(v) => v.to_string(),
            SubfieldValue::Text(s) => s.clone(),
            SubfieldValue::Bytes(b) => latin1_decode(b),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SubfieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn latin1_encode(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Name and format of one subfield of a field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct SubfieldDefn {
    name: String,
    format: SubfieldFormat,
}

impl SubfieldDefn {
    pub fn new(name: &str, format: SubfieldFormat) -> Self {
        SubfieldDefn {
            name: name.to_string(),
            format,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> SubfieldFormat {
        self.format
    }

    /// Decode this subfield from the start of `data`.
    ///
    /// Returns the value and the number of bytes consumed, including the unit
    /// terminator of variable-length subfields.
    pub fn extract(&self, data: &[u8]) -> Result<(SubfieldValue, usize)> {
        let (raw, consumed) = match self.format.fixed_width() {
            Some(width) => {
                if data.len() < width {
                    return Err(GdalVecError::Iso8211(format!(
                        "Subfield '{}' needs {width} bytes, {} left",
                        self.name,
                        data.len()
                    )));
                }
                (&data[..width], width)
            }
            None => {
                let end = data
                    .iter()
                    .position(|&b| b == DDF_UNIT_TERMINATOR || b == DDF_FIELD_TERMINATOR);
                match end {
                    Some(end) => (&data[..end], end + 1),
                    None => (data, data.len()),
                }
            }
        };

        let text = || latin1_decode(raw);
        let value = match self.format {
            SubfieldFormat::String(_) => SubfieldValue::Text(text()),
            SubfieldFormat::Int(_) => {
                SubfieldValue::Int(text().trim().parse::<i64>().unwrap_or_default())
            }
            SubfieldFormat::Float(_) => {
                SubfieldValue::Float(text().trim().parse::<f64>().unwrap_or_default())
            }
            SubfieldFormat::BitString(_) => SubfieldValue::Bytes(raw.to_vec()),
            SubfieldFormat::UInt(n) => {
                let mut rdr = Cursor::new(raw);
                SubfieldValue::Int(match n {
                    1 => rdr.read_u8()? as i64,
                    2 => rdr.read_u16::<LittleEndian>()? as i64,
                    4 => rdr.read_u32::<LittleEndian>()? as i64,
                    _ => rdr.read_u64::<LittleEndian>()? as i64,
                })
            }
            SubfieldFormat::SInt(n) => {
                let mut rdr = Cursor::new(raw);
                SubfieldValue::Int(match n {
                    1 => rdr.read_i8()? as i64,
                    2 => rdr.read_i16::<LittleEndian>()? as i64,
                    4 => rdr.read_i32::<LittleEndian>()? as i64,
                    _ => rdr.read_i64::<LittleEndian>()?,
                })
            }
            SubfieldFormat::Real(n) => {
                let mut rdr = Cursor::new(raw);
                SubfieldValue::Float(match n {
                    4 => rdr.read_f32::<LittleEndian>()? as f64,
                    _ => rdr.read_f64::<LittleEndian>()?,
                })
            }
        };
        Ok((value, consumed))
    }

    /// Append the encoded form of `value` to `out`.
    pub fn encode(&self, value: &SubfieldValue, out: &mut Vec<u8>) -> Result<()> {
        let mismatch = || {
            GdalVecError::Iso8211(format!(
                "Value {value:?} does not fit subfield '{}' ({:?})",
                self.name, self.format
            ))
        };
        let fit = |mut bytes: Vec<u8>, width: Option<usize>, pad: u8, out: &mut Vec<u8>| {
            match width {
                Some(w) => {
                    bytes.resize(w, pad);
                    out.extend_from_slice(&bytes);
                }
                None => {
                    out.extend_from_slice(&bytes);
                    out.push(DDF_UNIT_TERMINATOR);
                }
            }
        };

        match self.format {
            SubfieldFormat::String(w) => fit(latin1_encode(&value.as_text()), w, b' ', out),
            SubfieldFormat::Int(w) => {
                let v = value.as_int().ok_or_else(mismatch)?;
                let s = match w {
                    Some(w) => format!("{v:0w$}"),
                    None => v.to_string(),
                };
                fit(s.into_bytes(), w, b' ', out)
            }
            SubfieldFormat::Float(w) => {
                let v = value.as_float().ok_or_else(mismatch)?;
                fit(v.to_string().into_bytes(), w, b' ', out)
            }
            SubfieldFormat::BitString(n) => {
                let bytes = value.as_bytes().ok_or_else(mismatch)?.to_vec();
                fit(bytes, Some(n), 0, out)
            }
            SubfieldFormat::UInt(n) | SubfieldFormat::SInt(n) => {
                let v = value.as_int().ok_or_else(mismatch)?;
                match n {
                    1 => out.write_u8(v as u8)?,
                    2 => out.write_u16::<LittleEndian>(v as u16)?,
                    4 => out.write_u32::<LittleEndian>(v as u32)?,
                    _ => out.write_i64::<LittleEndian>(v)?,
                }
            }
            SubfieldFormat::Real(n) => {
                let v = value.as_float().ok_or_else(mismatch)?;
                match n {
                    4 => out.write_f32::<LittleEndian>(v as f32)?,
                    _ => out.write_f64::<LittleEndian>(v)?,
                }
            }
        }
        Ok(())
    }
}

/// Definition of a field, as declared in the data descriptive record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefn {
    tag: String,
    name: String,
    struct_code: DataStructCode,
    type_code: DataTypeCode,
    repeating: bool,
    array_descriptor: String,
    format_controls: String,
    subfields: Vec<SubfieldDefn>,
}

impl FieldDefn {
    /// Build a field definition from its subfield descriptor (`*YCOO!XCOO`,
    /// a leading `*` marks a repeating group) and format controls (`(2b24)`).
    pub fn new(tag: &str, name: &str, descriptor: &str, format_controls: &str) -> Result<Self> {
        let repeating = descriptor.starts_with('*');
        let subfields = build_subfields(descriptor, format_controls)?;
        let struct_code = if tag == "0001" || subfields.is_empty() {
            DataStructCode::Elementary
        } else if repeating {
            DataStructCode::Array
        } else {
            DataStructCode::Vector
        };
        let binary = subfields.iter().filter(|s| s.format.is_binary()).count();
        let type_code = if binary == 0 {
            DataTypeCode::CharString
        } else if binary == subfields.len() {
            DataTypeCode::BitString
        } else {
            DataTypeCode::MixedDataType
        };
        Ok(FieldDefn {
            tag: tag.to_string(),
            name: name.to_string(),
            struct_code,
            type_code,
            repeating,
            array_descriptor: descriptor.to_string(),
            format_controls: format_controls.to_string(),
            subfields,
        })
    }

    /// Parse a field description from the field area of the DDR.
    pub(crate) fn from_ddr(tag: &str, data: &[u8], field_control_length: usize) -> Result<Self> {
        if data.len() < field_control_length {
            return Err(GdalVecError::Iso8211(format!(
                "Field description of '{tag}' is truncated"
            )));
        }
        let struct_code = DataStructCode::from_byte(data[0]);
        let type_code = DataTypeCode::from_byte(data.get(1).copied().unwrap_or(b'0'));

        let mut parts = data[field_control_length..]
            .split(|&b| b == DDF_UNIT_TERMINATOR || b == DDF_FIELD_TERMINATOR)
            .map(latin1_decode);
        let name = parts.next().unwrap_or_default();
        let descriptor = parts.next().unwrap_or_default();
        let format_controls = parts.next().unwrap_or_default();

        let subfields = build_subfields(&descriptor, &format_controls)?;
        Ok(FieldDefn {
            tag: tag.to_string(),
            name,
            struct_code,
            type_code,
            repeating: descriptor.starts_with('*'),
            array_descriptor: descriptor,
            format_controls,
            subfields,
        })
    }

    /// Encode the DDR form of this definition, including the field terminator.
    pub(crate) fn to_ddr(&self) -> Vec<u8> {
        let mut out = vec![self.struct_code.to_byte(), self.type_code.to_byte()];
        out.extend_from_slice(b"00;&   ");
        out.extend_from_slice(&latin1_encode(&self.name));
        out.push(DDF_UNIT_TERMINATOR);
        out.extend_from_slice(&latin1_encode(&self.array_descriptor));
        out.push(DDF_UNIT_TERMINATOR);
        out.extend_from_slice(&latin1_encode(&self.format_controls));
        out.push(DDF_FIELD_TERMINATOR);
        out
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn struct_code(&self) -> DataStructCode {
        self.struct_code
    }

    pub fn type_code(&self) -> DataTypeCode {
        self.type_code
    }

    /// Whether the subfield group may occur several times in one field.
    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    pub fn subfields(&self) -> &[SubfieldDefn] {
        &self.subfields
    }

    pub fn find_subfield(&self, name: &str) -> Option<usize> {
        self.subfields.iter().position(|s| s.name == name)
    }

    /// Width of one subfield group when every subfield is fixed-width.
    pub fn fixed_width(&self) -> Option<usize> {
        self.subfields
            .iter()
            .map(|s| s.format.fixed_width())
            .sum::<Option<usize>>()
    }
}

fn build_subfields(descriptor: &str, format_controls: &str) -> Result<Vec<SubfieldDefn>> {
    let names: Vec<&str> = match descriptor.trim_start_matches('*') {
        "" => vec![],
        d => d.split('!').collect(),
    };
    let formats = split_format_controls(format_controls)?;
    if formats.is_empty() {
        return Ok(vec![]);
    }
    // An elementary field has a single anonymous subfield.
    let names = if names.is_empty() && formats.len() == 1 {
        vec![""]
    } else {
        names
    };
    if names.len() != formats.len() {
        return Err(GdalVecError::Iso8211(format!(
            "Descriptor '{descriptor}' names {} subfields but format '{format_controls}' has {}",
            names.len(),
            formats.len()
        )));
    }
    names
        .into_iter()
        .zip(formats)
        .map(|(name, f)| Ok(SubfieldDefn::new(name, SubfieldFormat::parse(&f)?)))
        .collect()
}

/// Split format controls such as `(b11,2b12,3(A,I(2)))` into one format per
/// subfield, expanding repetition factors.
pub fn split_format_controls(format_controls: &str) -> Result<Vec<String>> {
    let trimmed = format_controls.trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);
    let expanded = expand_format(inner)?;
    Ok(split_top_level(&expanded)
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

/// Split on commas that are not nested in parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

/// Content of the parenthesised group opening at `open`, and the index just
/// past its closing parenthesis.
fn group_at(s: &str, open: usize) -> Result<(&str, usize)> {
    let mut depth = 0i32;
    for (i, c) in s[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&s[open + 1..open + i], open + i + 1));
                }
            }
            _ => {}
        }
    }
    Err(GdalVecError::Iso8211(format!("Unbalanced format controls '{s}'")))
}

fn expand_format(s: &str) -> Result<String> {
    let items = split_top_level(s);
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let digits = item.chars().take_while(char::is_ascii_digit).count();
        let (repeat, body) = if digits > 0 {
            let n: usize = item[..digits]
                .parse()
                .map_err(|_| GdalVecError::Iso8211(format!("Bad repeat count in '{item}'")))?;
            (n, &item[digits..])
        } else {
            (1, item)
        };
        let body = if body.starts_with('(') {
            let (inner, end) = group_at(body, 0)?;
            if end != body.len() {
                return Err(GdalVecError::Iso8211(format!(
                    "Unexpected text after group in '{item}'"
                )));
            }
            expand_format(inner)?
        } else {
            body.to_string()
        };
        for _ in 0..repeat {
            out.push(body.clone());
        }
    }
    Ok(out.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_format() -> Result<()> {
        assert_eq!(
            split_format_controls("(b11,b14,2b11,3A,2A(8),R(4))")?,
            vec!["b11", "b14", "b11", "b11", "A", "A", "A", "A(8)", "A(8)", "R(4)"]
        );
        assert_eq!(
            split_format_controls("(A,2(b12,I(3)))")?,
            vec!["A", "b12", "I(3)", "b12", "I(3)"]
        );
        assert!(split_format_controls("(A,2(b12)").is_err());
        Ok(())
    }

    #[test]
    fn test_parse_formats() -> Result<()> {
        assert_eq!(SubfieldFormat::parse("B(40)")?, SubfieldFormat::BitString(5));
        assert_eq!(SubfieldFormat::parse("b24")?, SubfieldFormat::SInt(4));
        assert_eq!(SubfieldFormat::parse("b48")?, SubfieldFormat::Real(8));
        assert_eq!(SubfieldFormat::parse("A")?, SubfieldFormat::String(None));
        assert_eq!(SubfieldFormat::parse("I(5)")?, SubfieldFormat::Int(Some(5)));
        assert!(SubfieldFormat::parse("b13").is_err());
        assert!(SubfieldFormat::parse("X").is_err());
        Ok(())
    }

    #[test]
    fn test_extract_encode() -> Result<()> {
        let sub = SubfieldDefn::new("XCOO", SubfieldFormat::SInt(4));
        let mut buf = Vec::new();
        sub.encode(&SubfieldValue::Int(-1234567), &mut buf)?;
        assert_eq!(buf.len(), 4);
        assert_eq!(sub.extract(&buf)?, (SubfieldValue::Int(-1234567), 4));

        let text = SubfieldDefn::new("ATVL", SubfieldFormat::String(None));
        let mut buf = Vec::new();
        text.encode(&SubfieldValue::Text("Dover".into()), &mut buf)?;
        assert_eq!(buf, b"Dover\x1f");
        assert_eq!(text.extract(&buf)?, (SubfieldValue::Text("Dover".into()), 6));

        let fixed = SubfieldDefn::new("EDTN", SubfieldFormat::Int(Some(3)));
        let mut buf = Vec::new();
        fixed.encode(&SubfieldValue::Int(7), &mut buf)?;
        assert_eq!(buf, b"007");
        Ok(())
    }

    #[test]
    fn test_field_defn_ddr() -> Result<()> {
        let defn = FieldDefn::new("SG2D", "2-D coordinate", "*YCOO!XCOO", "(2b24)")?;
        assert!(defn.is_repeating());
        assert_eq!(defn.struct_code(), DataStructCode::Array);
        assert_eq!(defn.type_code(), DataTypeCode::BitString);
        assert_eq!(defn.fixed_width(), Some(8));

        let parsed = FieldDefn::from_ddr("SG2D", &defn.to_ddr(), 9)?;
        assert_eq!(parsed, defn);

        let record_id = FieldDefn::new("0001", "Record identifier", "", "(b12)")?;
        assert_eq!(record_id.subfields().len(), 1);
        assert_eq!(record_id.struct_code(), DataStructCode::Elementary);
        Ok(())
    }
}
