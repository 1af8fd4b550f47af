//! Feature definitions of S-57 layers.

use crate::s57::class_registrar::{ObjectClassInfo, Primitive, S57ClassRegistrar};
use crate::s57::reader::S57Options;
use crate::s57::{RCNM_VC, RCNM_VE, RCNM_VI};
use crate::spatial_ref::SpatialRef;
use crate::vector::{Defn, FieldDefn, FieldType, GeometryType};

/// Name of the geometry field of every S-57 layer.
pub const GEOM_FIELD_NAME: &str = "";

const STANDARD_FIELDS: &[(&str, FieldType)] = &[
    ("RCID", FieldType::Integer),
    ("PRIM", FieldType::Integer),
    ("GRUP", FieldType::Integer),
    ("OBJL", FieldType::Integer),
    ("RVER", FieldType::Integer),
    ("AGEN", FieldType::Integer),
    ("FIDN", FieldType::Integer64),
    ("FIDS", FieldType::Integer),
];

/// `(field, record tag, subfield, type)` of the dataset identification feature.
pub(crate) const DSID_FIELDS: &[(&str, &str, &str, FieldType)] = &[
    ("DSID_EXPP", "DSID", "EXPP", FieldType::Integer),
    ("DSID_INTU", "DSID", "INTU", FieldType::Integer),
    ("DSID_DSNM", "DSID", "DSNM", FieldType::String),
    ("DSID_EDTN", "DSID", "EDTN", FieldType::String),
    ("DSID_UPDN", "DSID", "UPDN", FieldType::String),
    ("DSID_UADT", "DSID", "UADT", FieldType::String),
    ("DSID_ISDT", "DSID", "ISDT", FieldType::String),
    ("DSID_STED", "DSID", "STED", FieldType::Real),
    ("DSID_PRSP", "DSID", "PRSP", FieldType::Integer),
    ("DSID_PSDN", "DSID", "PSDN", FieldType::String),
    ("DSID_PRED", "DSID", "PRED", FieldType::String),
    ("DSID_PROF", "DSID", "PROF", FieldType::Integer),
    ("DSID_AGEN", "DSID", "AGEN", FieldType::Integer),
    ("DSID_COMT", "DSID", "COMT", FieldType::String),
    ("DSSI_DSTR", "DSSI", "DSTR", FieldType::Integer),
    ("DSSI_AALL", "DSSI", "AALL", FieldType::Integer),
    ("DSSI_NALL", "DSSI", "NALL", FieldType::Integer),
    ("DSSI_NOMR", "DSSI", "NOMR", FieldType::Integer),
    ("DSSI_NOCR", "DSSI", "NOCR", FieldType::Integer),
    ("DSSI_NOGR", "DSSI", "NOGR", FieldType::Integer),
    ("DSSI_NOLR", "DSSI", "NOLR", FieldType::Integer),
    ("DSSI_NOIN", "DSSI", "NOIN", FieldType::Integer),
    ("DSSI_NOCN", "DSSI", "NOCN", FieldType::Integer),
    ("DSSI_NOED", "DSSI", "NOED", FieldType::Integer),
    ("DSSI_NOFA", "DSSI", "NOFA", FieldType::Integer),
    ("DSPM_HDAT", "DSPM", "HDAT", FieldType::Integer),
    ("DSPM_VDAT", "DSPM", "VDAT", FieldType::Integer),
    ("DSPM_SDAT", "DSPM", "SDAT", FieldType::Integer),
    ("DSPM_CSCL", "DSPM", "CSCL", FieldType::Integer),
    ("DSPM_DUNI", "DSPM", "DUNI", FieldType::Integer),
    ("DSPM_HUNI", "DSPM", "HUNI", FieldType::Integer),
    ("DSPM_PUNI", "DSPM", "PUNI", FieldType::Integer),
    ("DSPM_COUN", "DSPM", "COUN", FieldType::Integer),
    ("DSPM_COMF", "DSPM", "COMF", FieldType::Integer),
    ("DSPM_SOMF", "DSPM", "SOMF", FieldType::Integer),
    ("DSPM_COMT", "DSPM", "COMT", FieldType::String),
];

fn wgs84() -> Option<SpatialRef> {
    SpatialRef::from_epsg(4326).ok()
}

fn with_geometry(name: &str, geometry_type: GeometryType) -> Defn {
    if geometry_type == GeometryType::None {
        Defn::new(name)
    } else {
        Defn::with_geometry(name, GEOM_FIELD_NAME, geometry_type, wgs84())
    }
}

fn add_standard_fields(defn: &mut Defn, options: &S57Options) {
    for (name, ty) in STANDARD_FIELDS {
        defn.add_field(FieldDefn::new(name, *ty));
    }
    if options.lnam_refs {
        defn.add_field(FieldDefn::new("LNAM", FieldType::String).with_width(16));
        defn.add_field(FieldDefn::new("LNAM_REFS", FieldType::StringList));
        defn.add_field(FieldDefn::new("FFPT_RIND", FieldType::IntegerList));
    }
}

/// Name of the generic layer holding features of primitive `prim`.
pub fn generic_layer_name(prim: i64) -> &'static str {
    match prim {
        1 => "Point",
        2 => "Line",
        3 => "Area",
        _ => "Meta",
    }
}

/// Definition of a generic layer, used when no class catalogue applies.
pub fn generic_defn(prim: i64, options: &S57Options) -> Defn {
    let geometry_type = match prim {
        1 => GeometryType::Point,
        2 => GeometryType::LineString,
        3 => GeometryType::Polygon,
        _ => GeometryType::None,
    };
    let mut defn = with_geometry(generic_layer_name(prim), geometry_type);
    add_standard_fields(&mut defn, options);
    defn
}

/// Definition of the layer of one object class.
pub fn class_defn(
    registrar: &S57ClassRegistrar,
    class: &ObjectClassInfo,
    options: &S57Options,
) -> Defn {
    let has = |p| class.primitives.contains(&p);
    let geometry_type = if class.acronym == "SOUNDG" {
        if options.split_multipoint {
            GeometryType::Point
        } else {
            GeometryType::MultiPoint
        }
    } else {
        match (has(Primitive::Point), has(Primitive::Line), has(Primitive::Area)) {
            (false, false, false) => GeometryType::None,
            (true, false, false) => GeometryType::Point,
            (false, true, false) => GeometryType::LineString,
            (false, false, true) => GeometryType::Polygon,
            _ => GeometryType::Unknown,
        }
    };

    let mut defn = with_geometry(&class.acronym, geometry_type);
    add_standard_fields(&mut defn, options);
    for acronym in &class.attributes {
        let ty = registrar
            .attribute_by_acronym(acronym)
            .map(|a| a.attribute_type.field_type())
            .unwrap_or(FieldType::String);
        if defn.field_index(acronym).is_none() {
            defn.add_field(FieldDefn::new(acronym, ty));
        }
    }
    if class.acronym == "SOUNDG" && options.add_soundg_depth {
        let ty = if options.split_multipoint {
            FieldType::Real
        } else {
            FieldType::RealList
        };
        defn.add_field(FieldDefn::new("DEPTH", ty));
    }
    defn
}

/// Definition of the dataset identification layer.
pub fn dsid_defn() -> Defn {
    let mut defn = Defn::new("DSID");
    for (name, _, _, ty) in DSID_FIELDS {
        defn.add_field(FieldDefn::new(name, *ty));
    }
    defn
}

/// Layer name of a spatial primitive record type.
pub fn primitive_layer_name(rcnm: i32) -> &'static str {
    match rcnm {
        RCNM_VI => "IsolatedNode",
        RCNM_VC => "ConnectedNode",
        RCNM_VE => "Edge",
        _ => "Face",
    }
}

/// Definition of a primitive layer.
pub fn primitive_defn(rcnm: i32) -> Defn {
    let geometry_type = match rcnm {
        RCNM_VE => GeometryType::LineString,
        RCNM_VI => GeometryType::Unknown,
        _ => GeometryType::Point,
    };
    let mut defn = with_geometry(primitive_layer_name(rcnm), geometry_type);
    for name in ["RCNM", "RCID", "RVER", "RUIN"] {
        defn.add_field(FieldDefn::new(name, FieldType::Integer));
    }
    if rcnm == RCNM_VE {
        for name in ["NAME_RCNM_0", "NAME_RCID_0", "NAME_RCNM_1", "NAME_RCID_1"] {
            defn.add_field(FieldDefn::new(name, FieldType::Integer));
        }
    }
    defn
}
