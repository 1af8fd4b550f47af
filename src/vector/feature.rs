use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::*;
use crate::vector::defn::FieldMap;
use crate::vector::{Defn, FieldType, Geometry};

/// Feature in a vector layer
///
/// A feature owns its field values and geometries and is bound to the
/// definition of the layer it was produced for.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    defn: Arc<Defn>,
    fid: Option<i64>,
    fields: Vec<Option<FieldValue>>,
    geometries: Vec<Option<Geometry>>,
}

impl Feature {
    pub fn new(defn: Arc<Defn>) -> Feature {
        let fields = vec![None; defn.field_count()];
        let geometries = vec![None; defn.geom_field_count()];
        Feature {
            defn,
            fid: None,
            fields,
            geometries,
        }
    }

    pub fn defn(&self) -> &Arc<Defn> {
        &self.defn
    }

    /// Get the value of the feature's FID, if any.
    pub fn fid(&self) -> Option<i64> {
        self.fid
    }

    pub fn set_fid(&mut self, fid: Option<i64>) {
        self.fid = fid;
    }

    /// Get the value of a named field. `None` when the field is unset.
    pub fn field(&self, name: &str) -> Result<Option<&FieldValue>> {
        let idx = self.defn.require_field_index(name, "field")?;
        Ok(self.fields[idx].as_ref())
    }

    pub fn field_by_index(&self, idx: usize) -> Result<Option<&FieldValue>> {
        self.fields
            .get(idx)
            .map(Option::as_ref)
            .ok_or(GdalVecError::InvalidFieldIndex {
                index: idx,
                method_name: "field_by_index",
            })
    }

    /// Field value as a string, or `None` if unset.
    pub fn field_as_string(&self, idx: usize) -> Result<Option<String>> {
        Ok(self.field_by_index(idx)?.map(FieldValue::to_string_value))
    }

    pub fn set_field(&mut self, name: &str, value: FieldValue) -> Result<()> {
        let idx = self.defn.require_field_index(name, "set_field")?;
        self.set_field_by_index(idx, Some(value))
    }

    /// Set or unset a field. Values are converted to the field's declared type
    /// where a lossless conversion exists.
    pub fn set_field_by_index(&mut self, idx: usize, value: Option<FieldValue>) -> Result<()> {
        let field_type = self
            .defn
            .field(idx)
            .map(|f| f.field_type())
            .ok_or(GdalVecError::InvalidFieldIndex {
                index: idx,
                method_name: "set_field_by_index",
            })?;
        let value = match value {
            Some(v) => Some(
                v.convert_to(field_type)
                    .ok_or(GdalVecError::UnhandledFieldType {
                        field_type,
                        method_name: "set_field_by_index",
                    })?,
            ),
            None => None,
        };
        self.fields[idx] = value;
        Ok(())
    }

    pub fn set_field_string(&mut self, name: &str, value: &str) -> Result<()> {
        self.set_field(name, FieldValue::StringValue(value.to_string()))
    }

    pub fn set_field_integer(&mut self, name: &str, value: i32) -> Result<()> {
        self.set_field(name, FieldValue::IntegerValue(value))
    }

    pub fn set_field_integer64(&mut self, name: &str, value: i64) -> Result<()> {
        self.set_field(name, FieldValue::Integer64Value(value))
    }

    pub fn set_field_double(&mut self, name: &str, value: f64) -> Result<()> {
        self.set_field(name, FieldValue::RealValue(value))
    }

    /// Get the first geometry, if set.
    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometries.first().and_then(Option::as_ref)
    }

    pub fn geometry_by_index(&self, idx: usize) -> Result<Option<&Geometry>> {
        self.geometries
            .get(idx)
            .map(Option::as_ref)
            .ok_or(GdalVecError::InvalidFieldIndex {
                index: idx,
                method_name: "geometry_by_index",
            })
    }

    pub fn geometry_by_name(&self, name: &str) -> Result<Option<&Geometry>> {
        let idx = self
            .defn
            .geom_field_index(name)
            .ok_or_else(|| GdalVecError::InvalidFieldName {
                field_name: name.to_string(),
                method_name: "geometry_by_name",
            })?;
        self.geometry_by_index(idx)
    }

    /// Set the first geometry.
    pub fn set_geometry(&mut self, geom: Geometry) -> Result<()> {
        self.set_geometry_by_index(0, Some(geom))
    }

    pub fn set_geometry_by_index(&mut self, idx: usize, geom: Option<Geometry>) -> Result<()> {
        match self.geometries.get_mut(idx) {
            Some(slot) => {
                *slot = geom;
                Ok(())
            }
            None => Err(GdalVecError::InvalidFieldIndex {
                index: idx,
                method_name: "set_geometry_by_index",
            }),
        }
    }

    /// Remove and return a geometry, leaving the field unset.
    pub fn take_geometry(&mut self, idx: usize) -> Option<Geometry> {
        self.geometries.get_mut(idx).and_then(Option::take)
    }

    pub fn geometries(&self) -> &[Option<Geometry>] {
        &self.geometries
    }

    pub fn field_values(&self) -> &[Option<FieldValue>] {
        &self.fields
    }

    /// Rebind to another definition, moving values through `map`.
    ///
    /// Values whose type differs from the target field are converted when
    /// possible and dropped otherwise.
    pub fn remap(mut self, defn: Arc<Defn>, map: &FieldMap) -> Feature {
        let mut out = Feature::new(defn);
        out.fid = self.fid;
        for (dst, src) in map.fields.iter().enumerate() {
            if let Some(v) = src.and_then(|s| self.fields.get_mut(s)).and_then(Option::take) {
                let converted = out
                    .defn
                    .field(dst)
                    .and_then(|f| v.convert_to(f.field_type()));
                out.fields[dst] = converted;
            }
        }
        for (dst, src) in map.geom_fields.iter().enumerate() {
            out.geometries[dst] = src
                .and_then(|s| self.geometries.get_mut(s))
                .and_then(Option::take);
        }
        out
    }

    /// Rebind to a definition with the same layout. Values are kept as is.
    pub(crate) fn rebind(mut self, defn: Arc<Defn>) -> Feature {
        self.fields.resize(defn.field_count(), None);
        self.geometries.resize(defn.geom_field_count(), None);
        self.defn = defn;
        self
    }

    pub(crate) fn into_parts(self) -> StoredFeature {
        StoredFeature {
            fid: self.fid,
            fields: self.fields,
            geometries: self.geometries,
        }
    }

    pub(crate) fn from_parts(defn: Arc<Defn>, parts: StoredFeature) -> Feature {
        Feature {
            defn: defn.clone(),
            fid: parts.fid,
            fields: parts.fields,
            geometries: parts.geometries,
        }
        .rebind(defn)
    }
}

/// The schema-free payload of a feature, as written to a feature store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredFeature {
    pub fid: Option<i64>,
    pub fields: Vec<Option<FieldValue>>,
    pub geometries: Vec<Option<Geometry>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    IntegerValue(i32),
    IntegerListValue(Vec<i32>),
    Integer64Value(i64),
    Integer64ListValue(Vec<i64>),
    StringValue(String),
    StringListValue(Vec<String>),
    RealValue(f64),
    RealListValue(Vec<f64>),
    DateValue(NaiveDate),
    DateTimeValue(DateTime<FixedOffset>),
}

impl FieldValue {
    /// Interpret the value as `String`. Returns `None` if the value is something else.
    pub fn into_string(self) -> Option<String> {
        match self {
            FieldValue::StringValue(rv) => Some(rv),
            _ => None,
        }
    }

    /// Interpret the value as `f64`. Integers are widened.
    pub fn into_real(self) -> Option<f64> {
        match self {
            FieldValue::RealValue(rv) => Some(rv),
            FieldValue::IntegerValue(rv) => Some(rv as f64),
            FieldValue::Integer64Value(rv) => Some(rv as f64),
            _ => None,
        }
    }

    /// Interpret the value as `i32`. Returns `None` if out of range or not an integer.
    pub fn into_int(self) -> Option<i32> {
        match self {
            FieldValue::IntegerValue(rv) => Some(rv),
            FieldValue::Integer64Value(rv) => i32::try_from(rv).ok(),
            _ => None,
        }
    }

    pub fn into_int64(self) -> Option<i64> {
        match self {
            FieldValue::IntegerValue(rv) => Some(rv as i64),
            FieldValue::Integer64Value(rv) => Some(rv),
            _ => None,
        }
    }

    pub fn into_date(self) -> Option<NaiveDate> {
        match self {
            FieldValue::DateValue(rv) => Some(rv),
            FieldValue::DateTimeValue(rv) => Some(rv.date_naive()),
            _ => None,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::IntegerValue(_) => FieldType::Integer,
            FieldValue::IntegerListValue(_) => FieldType::IntegerList,
            FieldValue::Integer64Value(_) => FieldType::Integer64,
            FieldValue::Integer64ListValue(_) => FieldType::Integer64List,
            FieldValue::StringValue(_) => FieldType::String,
            FieldValue::StringListValue(_) => FieldType::StringList,
            FieldValue::RealValue(_) => FieldType::Real,
            FieldValue::RealListValue(_) => FieldType::RealList,
            FieldValue::DateValue(_) => FieldType::Date,
            FieldValue::DateTimeValue(_) => FieldType::DateTime,
        }
    }

    /// Textual form, as used for grouping keys and text outputs.
    pub fn to_string_value(&self) -> String {
        fn join<T: ToString>(v: &[T]) -> String {
            let items: Vec<String> = v.iter().map(ToString::to_string).collect();
            format!("({}:{})", items.len(), items.join(","))
        }
        match self {
            FieldValue::IntegerValue(v) => v.to_string(),
            FieldValue::Integer64Value(v) => v.to_string(),
            FieldValue::RealValue(v) => v.to_string(),
            FieldValue::StringValue(v) => v.clone(),
            FieldValue::IntegerListValue(v) => join(v),
            FieldValue::Integer64ListValue(v) => join(v),
            FieldValue::RealListValue(v) => join(v),
            FieldValue::StringListValue(v) => join(v),
            FieldValue::DateValue(v) => v.format("%Y/%m/%d").to_string(),
            FieldValue::DateTimeValue(v) => v.format("%Y/%m/%d %H:%M:%S%:z").to_string(),
        }
    }

    /// Convert to `target`, or `None` if no sensible conversion exists.
    pub fn convert_to(self, target: FieldType) -> Option<FieldValue> {
        if self.field_type() == target {
            return Some(self);
        }
        let converted = match (target, self) {
            (FieldType::String, v) => FieldValue::StringValue(v.to_string_value()),
            (FieldType::Integer64, FieldValue::IntegerValue(v)) => FieldValue::Integer64Value(v as i64),
            (FieldType::Integer, FieldValue::Integer64Value(v)) => {
                FieldValue::IntegerValue(i32::try_from(v).ok()?)
            }
            (FieldType::Real, v @ (FieldValue::IntegerValue(_) | FieldValue::Integer64Value(_))) => {
                FieldValue::RealValue(v.into_real()?)
            }
            (FieldType::Integer, FieldValue::StringValue(s)) => {
                FieldValue::IntegerValue(s.trim().parse().ok()?)
            }
            (FieldType::Integer64, FieldValue::StringValue(s)) => {
                FieldValue::Integer64Value(s.trim().parse().ok()?)
            }
            (FieldType::Real, FieldValue::StringValue(s)) => {
                FieldValue::RealValue(s.trim().parse().ok()?)
            }
            (FieldType::IntegerList, FieldValue::IntegerValue(v)) => {
                FieldValue::IntegerListValue(vec![v])
            }
            (FieldType::Integer64List, FieldValue::Integer64Value(v)) => {
                FieldValue::Integer64ListValue(vec![v])
            }
            (FieldType::Integer64List, FieldValue::IntegerListValue(v)) => {
                FieldValue::Integer64ListValue(v.into_iter().map(i64::from).collect())
            }
            (FieldType::IntegerList, FieldValue::Integer64ListValue(v)) => FieldValue::IntegerListValue(
                v.into_iter()
                    .map(i32::try_from)
                    .collect::<std::result::Result<_, _>>()
                    .ok()?,
            ),
            (FieldType::RealList, FieldValue::RealValue(v)) => FieldValue::RealListValue(vec![v]),
            (FieldType::RealList, FieldValue::IntegerListValue(v)) => {
                FieldValue::RealListValue(v.into_iter().map(f64::from).collect())
            }
            (FieldType::RealList, FieldValue::Integer64ListValue(v)) => {
                FieldValue::RealListValue(v.into_iter().map(|x| x as f64).collect())
            }
            (FieldType::StringList, FieldValue::StringValue(v)) => {
                FieldValue::StringListValue(vec![v])
            }
            (FieldType::Date, FieldValue::DateTimeValue(v)) => FieldValue::DateValue(v.date_naive()),
            _ => return None,
        };
        Some(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{FieldDefn, GeometryType};

    fn defn() -> Arc<Defn> {
        let mut defn = Defn::with_geometry("t", "geom", GeometryType::Point, None);
        defn.add_field(FieldDefn::new("name", FieldType::String));
        defn.add_field(FieldDefn::new("count", FieldType::Integer64));
        Arc::new(defn)
    }

    #[test]
    fn test_set_and_get() -> Result<()> {
        let mut f = Feature::new(defn());
        assert_eq!(f.field("name")?, None);
        f.set_field_string("name", "a")?;
        f.set_field_integer("count", 3)?;
        assert_eq!(f.field("NAME")?, Some(&FieldValue::StringValue("a".into())));
        // widened to the declared type
        assert_eq!(f.field("count")?, Some(&FieldValue::Integer64Value(3)));
        assert!(f.field("missing").is_err());
        assert!(f.set_field_double("count", 1.5).is_err());
        f.set_geometry(Geometry::from_wkt("POINT (1 2)")?)?;
        assert!(f.geometry().is_some());
        assert!(f.set_geometry_by_index(1, None).is_err());
        Ok(())
    }

    #[test]
    fn test_remap() -> Result<()> {
        let mut f = Feature::new(defn());
        f.set_fid(Some(7));
        f.set_field_string("name", "12")?;
        f.set_field_integer64("count", 5)?;
        let mut target = Defn::with_geometry("t2", "geom", GeometryType::Point, None);
        target.add_field(FieldDefn::new("count", FieldType::String));
        target.add_field(FieldDefn::new("name", FieldType::Integer));
        let target = Arc::new(target);
        let map = FieldMap::by_name(f.defn(), &target);
        let out = f.remap(target, &map);
        assert_eq!(out.fid(), Some(7));
        assert_eq!(out.field("count")?, Some(&FieldValue::StringValue("5".into())));
        assert_eq!(out.field("name")?, Some(&FieldValue::IntegerValue(12)));
        Ok(())
    }

    #[test]
    fn test_string_value() {
        assert_eq!(
            FieldValue::IntegerListValue(vec![1, 2]).to_string_value(),
            "(2:1,2)"
        );
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(FieldValue::DateValue(d).to_string_value(), "2024/02/29");
    }
}
