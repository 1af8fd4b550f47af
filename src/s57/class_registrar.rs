use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use csv::Trim;
use log::debug;
use serde::Deserialize;

use crate::config::get_config_option;
use crate::errors::{GdalVecError, Result};
use crate::vector::FieldType;

/// Spatial primitives an object class may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Point,
    Line,
    Area,
}

/// Value type of an attribute in the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    /// `E`: enumerated.
    Enumerated,
    /// `L`: list of enumerated values.
    List,
    /// `F`: float.
    Float,
    /// `I`: integer.
    Integer,
    /// `A`: coded string.
    Coded,
    /// `S`: free text.
    FreeText,
}

impl AttributeType {
    fn from_code(code: &str) -> Option<AttributeType> {
        Some(match code.trim() {
            "E" => AttributeType::Enumerated,
            "L" => AttributeType::List,
            "F" => AttributeType::Float,
            "I" => AttributeType::Integer,
            "A" => AttributeType::Coded,
            "S" => AttributeType::FreeText,
            _ => return None,
        })
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            AttributeType::Enumerated | AttributeType::Integer => FieldType::Integer,
            AttributeType::Float => FieldType::Real,
            AttributeType::List => FieldType::StringList,
            AttributeType::Coded | AttributeType::FreeText => FieldType::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub code: u16,
    pub name: String,
    pub acronym: String,
    pub attribute_type: AttributeType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectClassInfo {
    pub code: u16,
    pub name: String,
    pub acronym: String,
    /// Attribute acronyms, in catalogue order.
    pub attributes: Vec<String>,
    pub primitives: Vec<Primitive>,
}

#[derive(Debug, Deserialize)]
struct ObjectClassRow {
    #[serde(rename = "Code")]
    code: u16,
    #[serde(rename = "ObjectClass")]
    name: String,
    #[serde(rename = "Acronym")]
    acronym: String,
    #[serde(rename = "Attribute_A", default)]
    attribute_a: String,
    #[serde(rename = "Attribute_B", default)]
    attribute_b: String,
    #[serde(rename = "Attribute_C", default)]
    attribute_c: String,
    #[serde(rename = "Primitives", default)]
    primitives: String,
}

#[derive(Debug, Deserialize)]
struct AttributeRow {
    #[serde(rename = "Code")]
    code: u16,
    #[serde(rename = "Attribute")]
    name: String,
    #[serde(rename = "Acronym")]
    acronym: String,
    #[serde(rename = "Attributetype")]
    attribute_type: String,
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(';').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_primitives(s: &str) -> Vec<Primitive> {
    split_list(s)
        .filter_map(|p| match p {
            "Point" => Some(Primitive::Point),
            "Line" => Some(Primitive::Line),
            "Area" => Some(Primitive::Area),
            _ => None,
        })
        .collect()
}

// (code, name, acronym, attributes, primitives)
const BUILTIN_CLASSES: &[(u16, &str, &str, &str, &str)] = &[
    (4, "Anchorage area", "ACHARE", "CATACH;OBJNAM;NOBJNM;SCAMIN;INFORM", "Point;Area;"),
    (7, "Beacon, lateral", "BCNLAT", "BCNSHP;CATLAM;COLOUR;COLPAT;HEIGHT;OBJNAM;NOBJNM;SCAMIN;INFORM", "Point;"),
    (17, "Buoy, lateral", "BOYLAT", "BOYSHP;CATLAM;COLOUR;COLPAT;OBJNAM;NOBJNM;SCAMIN;INFORM", "Point;"),
    (30, "Coastline", "COALNE", "CATCOA;COLOUR;OBJNAM;NOBJNM;SCAMIN;INFORM", "Line;"),
    (42, "Depth area", "DEPARE", "DRVAL1;DRVAL2;QUASOU;SOUACC;VERDAT;INFORM", "Line;Area;"),
    (43, "Depth contour", "DEPCNT", "VALDCO;VERDAT;SCAMIN;INFORM", "Line;"),
    (71, "Land area", "LNDARE", "CONDTN;OBJNAM;NOBJNM;SCAMIN;INFORM", "Point;Line;Area;"),
    (75, "Light", "LIGHTS", "CATLIT;COLOUR;HEIGHT;LITCHR;ORIENT;SIGPER;VALNMR;OBJNAM;SCAMIN;INFORM", "Point;"),
    (86, "Obstruction", "OBSTRN", "CATOBS;EXPSOU;VALSOU;WATLEV;OBJNAM;SCAMIN;INFORM", "Point;Line;Area;"),
    (112, "Restricted area", "RESARE", "CATREA;RESTRN;OBJNAM;NOBJNM;SCAMIN;INFORM", "Area;"),
    (119, "Sea area / named water area", "SEAARE", "CATSEA;OBJNAM;NOBJNM;SCAMIN;INFORM", "Point;Area;"),
    (129, "Sounding", "SOUNDG", "EXPSOU;QUASOU;SOUACC;TECSOU;VERDAT;SCAMIN;INFORM", "Point;"),
    (153, "Underwater rock / awash rock", "UWTROC", "EXPSOU;VALSOU;WATLEV;OBJNAM;SCAMIN;INFORM", "Point;"),
    (159, "Wreck", "WRECKS", "CATWRK;EXPSOU;VALSOU;WATLEV;OBJNAM;SCAMIN;INFORM", "Point;Area;"),
    (302, "Coverage", "M_COVR", "CATCOV;INFORM", "Area;"),
    (308, "Quality of data", "M_QUAL", "CATZOC;POSACC;SOUACC;SUREND;SURSTA;INFORM", "Area;"),
];

// (code, name, acronym, type)
const BUILTIN_ATTRIBUTES: &[(u16, &str, &str, &str)] = &[
    (2, "Beacon shape", "BCNSHP", "E"),
    (4, "Buoy shape", "BOYSHP", "E"),
    (8, "Category of anchorage", "CATACH", "L"),
    (11, "Category of coastline", "CATCOA", "E"),
    (18, "Category of coverage", "CATCOV", "E"),
    (36, "Category of lateral mark", "CATLAM", "E"),
    (37, "Category of light", "CATLIT", "L"),
    (42, "Category of obstruction", "CATOBS", "E"),
    (56, "Category of restricted area", "CATREA", "L"),
    (60, "Category of sea area", "CATSEA", "E"),
    (71, "Category of wreck", "CATWRK", "E"),
    (72, "Category of zone of confidence", "CATZOC", "E"),
    (75, "Colour", "COLOUR", "L"),
    (76, "Colour pattern", "COLPAT", "L"),
    (81, "Condition", "CONDTN", "E"),
    (87, "Depth range value 1", "DRVAL1", "F"),
    (88, "Depth range value 2", "DRVAL2", "F"),
    (93, "Exposition of sounding", "EXPSOU", "E"),
    (95, "Height", "HEIGHT", "F"),
    (102, "Information", "INFORM", "S"),
    (107, "Light characteristic", "LITCHR", "E"),
    (116, "Object name", "OBJNAM", "S"),
    (117, "Orientation", "ORIENT", "F"),
    (125, "Quality of sounding measurement", "QUASOU", "L"),
    (131, "Restriction", "RESTRN", "L"),
    (133, "Scale minimum", "SCAMIN", "I"),
    (141, "Signal period", "SIGPER", "F"),
    (152, "Positional accuracy", "POSACC", "F"),
    (156, "Technique of sounding measurement", "TECSOU", "L"),
    (166, "Sounding accuracy", "SOUACC", "F"),
    (174, "Value of depth contour", "VALDCO", "F"),
    (178, "Value of nominal range", "VALNMR", "F"),
    (179, "Value of sounding", "VALSOU", "F"),
    (187, "Water level effect", "WATLEV", "E"),
    (189, "Vertical datum", "VERDAT", "E"),
    (301, "Object name in national language", "NOBJNM", "S"),
    (310, "Survey date - end", "SUREND", "A"),
    (311, "Survey date - start", "SURSTA", "A"),
];

/// Catalogue of S-57 object classes and attributes.
///
/// A small built-in subset covers common chart content; the full catalogue
/// is loaded from `s57objectclasses.csv` and `s57attributes.csv`.
#[derive(Debug, Clone, Default)]
pub struct S57ClassRegistrar {
    classes: BTreeMap<u16, ObjectClassInfo>,
    attributes: BTreeMap<u16, AttributeInfo>,
    attribute_codes: HashMap<String, u16>,
}

impl S57ClassRegistrar {
    pub fn builtin() -> Self {
        let mut registrar = S57ClassRegistrar::default();
        for (code, name, acronym, attrs, prims) in BUILTIN_CLASSES {
            registrar.add_class(ObjectClassInfo {
                code: *code,
                name: name.to_string(),
                acronym: acronym.to_string(),
                attributes: split_list(attrs).map(str::to_string).collect(),
                primitives: parse_primitives(prims),
            });
        }
        for (code, name, acronym, ty) in BUILTIN_ATTRIBUTES {
            if let Some(attribute_type) = AttributeType::from_code(ty) {
                registrar.add_attribute(AttributeInfo {
                    code: *code,
                    name: name.to_string(),
                    acronym: acronym.to_string(),
                    attribute_type,
                });
            }
        }
        registrar
    }

    /// Load the catalogue CSV files from `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut registrar = S57ClassRegistrar::default();

        let mut rdr = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(dir.join("s57objectclasses.csv"))?;
        for row in rdr.deserialize() {
            let row: ObjectClassRow = row?;
            let attributes = [&row.attribute_a, &row.attribute_b, &row.attribute_c]
                .into_iter()
                .flat_map(|s| split_list(s))
                .map(str::to_string)
                .collect();
            registrar.add_class(ObjectClassInfo {
                code: row.code,
                name: row.name,
                acronym: row.acronym,
                attributes,
                primitives: parse_primitives(&row.primitives),
            });
        }

        let mut rdr = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(dir.join("s57attributes.csv"))?;
        for row in rdr.deserialize() {
            let row: AttributeRow = row?;
            let Some(attribute_type) = AttributeType::from_code(&row.attribute_type) else {
                debug!("Skipping attribute {} with type '{}'", row.acronym, row.attribute_type);
                continue;
            };
            registrar.add_attribute(AttributeInfo {
                code: row.code,
                name: row.name,
                acronym: row.acronym,
                attribute_type,
            });
        }

        if registrar.classes.is_empty() {
            return Err(GdalVecError::S57(format!(
                "No object classes found in '{}'",
                dir.display()
            )));
        }
        debug!(
            "Loaded {} object classes and {} attributes from {}",
            registrar.classes.len(),
            registrar.attributes.len(),
            dir.display()
        );
        Ok(registrar)
    }

    /// The catalogue named by the `S57_CSV` configuration option, or the
    /// built-in subset when the option is unset.
    pub fn load() -> Result<Self> {
        let dir = get_config_option("S57_CSV", "")?;
        if dir.is_empty() {
            Ok(Self::builtin())
        } else {
            Self::from_dir(dir)
        }
    }

    pub fn add_class(&mut self, class: ObjectClassInfo) {
        self.classes.insert(class.code, class);
    }

    pub fn add_attribute(&mut self, attribute: AttributeInfo) {
        self.attribute_codes
            .insert(attribute.acronym.clone(), attribute.code);
        self.attributes.insert(attribute.code, attribute);
    }

    pub fn class(&self, code: u16) -> Option<&ObjectClassInfo> {
        self.classes.get(&code)
    }

    pub fn attribute(&self, code: u16) -> Option<&AttributeInfo> {
        self.attributes.get(&code)
    }

    pub fn attribute_by_acronym(&self, acronym: &str) -> Option<&AttributeInfo> {
        self.attribute_codes
            .get(acronym)
            .and_then(|c| self.attributes.get(c))
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TempFixture;

    #[test]
    fn test_builtin() {
        let registrar = S57ClassRegistrar::builtin();
        let soundg = registrar.class(129).unwrap();
        assert_eq!(soundg.acronym, "SOUNDG");
        assert_eq!(soundg.primitives, vec![Primitive::Point]);
        let drval1 = registrar.attribute_by_acronym("DRVAL1").unwrap();
        assert_eq!(drval1.attribute_type.field_type(), FieldType::Real);
        assert_eq!(
            registrar.attribute(75).unwrap().attribute_type.field_type(),
            FieldType::StringList
        );
    }

    #[test]
    fn test_from_dir() -> Result<()> {
        let classes = TempFixture::with_contents(
            "s57objectclasses.csv",
            b"\"Code\",\"ObjectClass\",\"Acronym\",\"Attribute_A\",\"Attribute_B\",\"Attribute_C\",\"Class\",\"Primitives\"\n\
              1,Administration area (Named),ADMARE,JRSDTN;NATION;NOBJNM;OBJNAM;,INFORM;NINFOM;,RECDAT;,G,Area;\n",
        );
        let dir = classes.path().parent().unwrap();
        std::fs::write(
            dir.join("s57attributes.csv"),
            "\"Code\",\"Attribute\",\"Acronym\",\"Attributetype\",\"Class\"\n\
             116,Object name,OBJNAM,S,F\n\
             999,Odd,ODDATT,Q,F\n",
        )?;
        let registrar = S57ClassRegistrar::from_dir(dir)?;
        let admare = registrar.class(1).unwrap();
        assert_eq!(
            admare.attributes,
            vec!["JRSDTN", "NATION", "NOBJNM", "OBJNAM", "INFORM", "NINFOM", "RECDAT"]
        );
        assert_eq!(admare.primitives, vec![Primitive::Area]);
        assert!(registrar.attribute_by_acronym("OBJNAM").is_some());
        assert!(registrar.attribute(999).is_none());
        Ok(())
    }
}
