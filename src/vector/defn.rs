use serde::{Deserialize, Serialize};

use crate::errors::*;
use crate::spatial_ref::SpatialRef;
use crate::vector::GeometryType;

/// Attribute field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    IntegerList,
    Integer64,
    Integer64List,
    Real,
    RealList,
    String,
    StringList,
    Date,
    DateTime,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Integer => "Integer",
            FieldType::IntegerList => "IntegerList",
            FieldType::Integer64 => "Integer64",
            FieldType::Integer64List => "Integer64List",
            FieldType::Real => "Real",
            FieldType::RealList => "RealList",
            FieldType::String => "String",
            FieldType::StringList => "StringList",
            FieldType::Date => "Date",
            FieldType::DateTime => "DateTime",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            FieldType::IntegerList
                | FieldType::Integer64List
                | FieldType::RealList
                | FieldType::StringList
        )
    }
}

/// Attribute field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefn {
    name: String,
    field_type: FieldType,
    width: i32,
    precision: i32,
    nullable: bool,
}

impl FieldDefn {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        FieldDefn {
            name: name.to_string(),
            field_type,
            width: 0,
            precision: 0,
            nullable: true,
        }
    }

    pub fn with_width(mut self, width: i32) -> Self {
        self.width = width;
        self
    }

    pub fn with_precision(mut self, precision: i32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn precision(&self) -> i32 {
        self.precision
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// Geometry field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeomFieldDefn {
    name: String,
    geometry_type: GeometryType,
    spatial_ref: Option<SpatialRef>,
    nullable: bool,
}

impl GeomFieldDefn {
    pub fn new(name: &str, geometry_type: GeometryType) -> Self {
        GeomFieldDefn {
            name: name.to_string(),
            geometry_type,
            spatial_ref: None,
            nullable: true,
        }
    }

    pub fn with_spatial_ref(mut self, spatial_ref: Option<SpatialRef>) -> Self {
        self.spatial_ref = spatial_ref;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    pub fn set_geometry_type(&mut self, geometry_type: GeometryType) {
        self.geometry_type = geometry_type;
    }

    pub fn spatial_ref(&self) -> Option<&SpatialRef> {
        self.spatial_ref.as_ref()
    }

    pub fn set_spatial_ref(&mut self, spatial_ref: Option<SpatialRef>) {
        self.spatial_ref = spatial_ref;
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// Layer definition
///
/// Defines the fields and geometry fields available for features in a layer.
/// Once shared by a layer (behind an `Arc`) a definition is never modified;
/// decorators derive a fresh one instead.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Defn {
    name: String,
    fields: Vec<FieldDefn>,
    geom_fields: Vec<GeomFieldDefn>,
}

impl Defn {
    /// A definition without fields or geometry fields.
    pub fn new(name: &str) -> Self {
        Defn {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// A definition with a single geometry field named `geom_name`.
    pub fn with_geometry(
        name: &str,
        geom_name: &str,
        geometry_type: GeometryType,
        spatial_ref: Option<SpatialRef>,
    ) -> Self {
        let mut defn = Defn::new(name);
        defn.add_geom_field(GeomFieldDefn::new(geom_name, geometry_type).with_spatial_ref(spatial_ref));
        defn
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn add_field(&mut self, field: FieldDefn) {
        self.fields.push(field);
    }

    pub fn add_geom_field(&mut self, field: GeomFieldDefn) {
        self.geom_fields.push(field);
    }

    /// Iterate over the field schema of this layer.
    pub fn fields(&self) -> std::slice::Iter<'_, FieldDefn> {
        self.fields.iter()
    }

    /// Iterate over the geometry field schema of this layer.
    pub fn geom_fields(&self) -> std::slice::Iter<'_, GeomFieldDefn> {
        self.geom_fields.iter()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn geom_field_count(&self) -> usize {
        self.geom_fields.len()
    }

    pub fn field(&self, idx: usize) -> Option<&FieldDefn> {
        self.fields.get(idx)
    }

    pub fn geom_field(&self, idx: usize) -> Option<&GeomFieldDefn> {
        self.geom_fields.get(idx)
    }

    pub fn geom_field_mut(&mut self, idx: usize) -> Option<&mut GeomFieldDefn> {
        self.geom_fields.get_mut(idx)
    }

    /// Index of the field named `name`, compared case-insensitively.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Index of the geometry field named `name`, compared case-insensitively.
    pub fn geom_field_index(&self, name: &str) -> Option<usize> {
        self.geom_fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Like [`Defn::field_index`], failing with [`GdalVecError::InvalidFieldName`].
    pub fn require_field_index(&self, name: &str, method_name: &'static str) -> Result<usize> {
        self.field_index(name)
            .ok_or_else(|| GdalVecError::InvalidFieldName {
                field_name: name.to_string(),
                method_name,
            })
    }

    /// Get the geometry type of the first geometry field
    pub fn geometry_type(&self) -> GeometryType {
        self.geom_fields
            .first()
            .map(|f| f.geometry_type)
            .unwrap_or(GeometryType::None)
    }

    /// A copy of this definition restricted to the given field indices, in that order.
    pub fn select_fields(&self, indices: &[usize]) -> Defn {
        Defn {
            name: self.name.clone(),
            fields: indices
                .iter()
                .filter_map(|&i| self.fields.get(i).cloned())
                .collect(),
            geom_fields: self.geom_fields.clone(),
        }
    }
}

/// Source index for each field and geometry field of a target definition,
/// matched by name. Computed once per decorator and applied to every feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    pub(crate) fields: Vec<Option<usize>>,
    pub(crate) geom_fields: Vec<Option<usize>>,
}

impl FieldMap {
    pub fn by_name(source: &Defn, target: &Defn) -> FieldMap {
        FieldMap {
            fields: target
                .fields()
                .map(|f| source.field_index(f.name()))
                .collect(),
            geom_fields: target
                .geom_fields()
                .map(|f| source.geom_field_index(f.name()))
                .collect(),
        }
    }

    /// Positional mapping between two definitions with identical layouts.
    pub fn identity(defn: &Defn) -> FieldMap {
        FieldMap {
            fields: (0..defn.field_count()).map(Some).collect(),
            geom_fields: (0..defn.geom_field_count()).map(Some).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Defn {
        let mut defn = Defn::with_geometry("roads", "geom", GeometryType::LineString, None);
        defn.add_field(FieldDefn::new("id", FieldType::Integer64));
        defn.add_field(FieldDefn::new("highway", FieldType::String).with_width(32));
        defn
    }

    #[test]
    fn test_lookup() -> Result<()> {
        let defn = fixture();
        assert_eq!(defn.field_index("HIGHWAY"), Some(1));
        assert_eq!(defn.field_index("missing"), None);
        assert_eq!(defn.geom_field_index("geom"), Some(0));
        assert_eq!(defn.geometry_type(), GeometryType::LineString);
        assert_eq!(defn.field(1).unwrap().width(), 32);
        assert!(matches!(
            defn.require_field_index("nope", "test"),
            Err(GdalVecError::InvalidFieldName { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_field_map() {
        let source = fixture();
        let mut target = Defn::with_geometry("out", "geom", GeometryType::LineString, None);
        target.add_field(FieldDefn::new("highway", FieldType::String));
        target.add_field(FieldDefn::new("extra", FieldType::Real));
        let map = FieldMap::by_name(&source, &target);
        assert_eq!(map.fields, vec![Some(1), None]);
        assert_eq!(map.geom_fields, vec![Some(0)]);
    }

    #[test]
    fn test_select_fields() {
        let defn = fixture().select_fields(&[1]);
        assert_eq!(defn.field_count(), 1);
        assert_eq!(defn.field(0).unwrap().name(), "highway");
        assert_eq!(defn.geom_field_count(), 1);
    }
}
