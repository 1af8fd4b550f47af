use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use geo_types::{
    Coord, Geometry as GeoGeometry, LineString, MultiLineString, MultiPoint, Point,
};
use log::{debug, error};

use crate::config::{emit_error, warn_once};
use crate::cpl::CslStringList;
use crate::errors::{CplErrType, CplErrorNum, GdalVecError, Result};
use crate::iso8211::{Field, Module, ReadSeek, Record, SubfieldValue};
use crate::progress::Progress;
use crate::s57::class_registrar::S57ClassRegistrar;
use crate::s57::feature_defns::{self, DSID_FIELDS};
use crate::s57::polygon::build_polygon_from_edges;
use crate::s57::record_index::RecordIndex;
use crate::s57::{PRIM_A, PRIM_L, PRIM_P, RCNM_VC, RCNM_VE, RCNM_VF, RCNM_VI};
use crate::spatial_ref::SpatialRef;
use crate::vector::{Defn, Feature, FieldType, FieldValue, Geometry, GeometryType};

const DEFAULT_COMF: f64 = 10_000_000.0;
const DEFAULT_SOMF: f64 = 10.0;

/// Reading options of an S-57 dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S57Options {
    /// Return one feature per sounding instead of one multipoint.
    pub split_multipoint: bool,
    /// Add a `DEPTH` field to soundings.
    pub add_soundg_depth: bool,
    /// Add `LNAM`, `LNAM_REFS` and `FFPT_RIND` fields.
    pub lnam_refs: bool,
    /// Expose spatial primitives as layers.
    pub return_primitives: bool,
    /// Build one layer per object class from the class catalogue.
    pub class_registrar: bool,
}

impl Default for S57Options {
    fn default() -> Self {
        S57Options {
            split_multipoint: false,
            add_soundg_depth: false,
            lnam_refs: true,
            return_primitives: false,
            class_registrar: true,
        }
    }
}

impl S57Options {
    /// Options from `KEY=VALUE` open options.
    pub fn from_csl(options: &CslStringList) -> Self {
        let default = S57Options::default();
        S57Options {
            split_multipoint: options.fetch_bool("SPLIT_MULTIPOINT", default.split_multipoint),
            add_soundg_depth: options.fetch_bool("ADD_SOUNDG_DEPTH", default.add_soundg_depth),
            lnam_refs: options.fetch_bool("LNAM_REFS", default.lnam_refs),
            return_primitives: options.fetch_bool("RETURN_PRIMITIVES", default.return_primitives),
            class_registrar: !options
                .fetch_name_value("CLASS_REGISTRAR")
                .is_some_and(|v| v.eq_ignore_ascii_case("GENERIC")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Closed,
    Opened,
    Ingested,
}

/// Identifier of a record pointed to by a `NAME` subfield.
fn parse_name(bytes: &[u8]) -> Option<(i32, i32)> {
    if bytes.len() < 5 {
        return None;
    }
    let rcid = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Some((bytes[0] as i32, rcid))
}

/// Long name (`AGEN`, `FIDN`, `FIDS`) as a 16 character hexadecimal string.
fn format_lnam(agen: i64, fidn: i64, fids: i64) -> String {
    format!("{agen:04X}{fidn:08X}{fids:04X}")
}

fn lnam_from_bytes(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 8 {
        return None;
    }
    let agen = u16::from_le_bytes([bytes[0], bytes[1]]);
    let fidn = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let fids = u16::from_le_bytes([bytes[6], bytes[7]]);
    Some(format_lnam(agen.into(), fidn.into(), fids.into()))
}

fn fields_with_tag<'a>(record: &'a Record, tag: &'a str) -> impl Iterator<Item = &'a Field> {
    record.fields().iter().filter(move |f| f.tag() == tag)
}

/// Value of subfield `name` in a decoded group.
fn group_value<'a>(field: &Field, group: &'a [SubfieldValue], name: &str) -> Option<&'a SubfieldValue> {
    field.defn().find_subfield(name).and_then(|i| group.get(i))
}

/// A reference from a feature or edge to a spatial record.
#[derive(Debug, Clone, Copy)]
struct SpatialPointer {
    rcnm: i32,
    rcid: i32,
    ornt: i64,
    topi: i64,
}

fn spatial_pointers(record: &Record, tag: &str) -> Result<Vec<SpatialPointer>> {
    let mut out = Vec::new();
    for field in fields_with_tag(record, tag) {
        for group in field.decode()? {
            let Some((rcnm, rcid)) = group_value(field, &group, "NAME")
                .and_then(SubfieldValue::as_bytes)
                .and_then(parse_name)
            else {
                continue;
            };
            let int = |name| group_value(field, &group, name).and_then(SubfieldValue::as_int);
            out.push(SpatialPointer {
                rcnm,
                rcid,
                ornt: int("ORNT").unwrap_or(1),
                topi: int("TOPI").unwrap_or(0),
            });
        }
    }
    Ok(out)
}

/// Reader of one S-57 cell.
///
/// Opening parses the module's data descriptive record. The first feature
/// read ingests every record into indices keyed by record identifier, after
/// which features are assembled from their spatial primitives on demand.
pub struct S57Reader {
    options: S57Options,
    module: Option<Module>,
    state: ReaderState,
    registrar: Option<Arc<S57ClassRegistrar>>,

    vi_index: RecordIndex,
    vc_index: RecordIndex,
    ve_index: RecordIndex,
    vf_index: RecordIndex,
    fe_index: RecordIndex,
    dsid: Option<Record>,
    dspm: Option<Record>,
    comf: f64,
    somf: f64,

    next_fe_index: usize,
    defns: Vec<Arc<Defn>>,
    pending: VecDeque<Feature>,
    spatial_ref: Option<SpatialRef>,
}

impl std::fmt::Debug for S57Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S57Reader")
            .field("module", &self.module)
            .field("state", &self.state)
            .field("features", &self.fe_index.len())
            .field("next_fe_index", &self.next_fe_index)
            .finish()
    }
}

impl S57Reader {
    pub fn new(options: S57Options) -> Self {
        S57Reader {
            options,
            module: None,
            state: ReaderState::Closed,
            registrar: None,
            vi_index: RecordIndex::new(),
            vc_index: RecordIndex::new(),
            ve_index: RecordIndex::new(),
            vf_index: RecordIndex::new(),
            fe_index: RecordIndex::new(),
            dsid: None,
            dspm: None,
            comf: DEFAULT_COMF,
            somf: DEFAULT_SOMF,
            next_fe_index: 0,
            defns: Vec::new(),
            pending: VecDeque::new(),
            spatial_ref: SpatialRef::from_epsg(4326).ok(),
        }
    }

    pub fn options(&self) -> &S57Options {
        &self.options
    }

    pub fn set_class_registrar(&mut self, registrar: Option<Arc<S57ClassRegistrar>>) {
        self.registrar = registrar;
    }

    pub fn class_registrar(&self) -> Option<&S57ClassRegistrar> {
        self.registrar.as_deref()
    }

    /// Open the cell stored at `path`.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let module = Module::open(path)?;
        self.open_module(module)
    }

    /// Open a cell from any seekable source.
    pub fn open_reader(&mut self, reader: Box<dyn ReadSeek>, description: &str) -> Result<()> {
        let module = Module::from_reader(reader, description)?;
        self.open_module(module)
    }

    fn open_module(&mut self, module: Module) -> Result<()> {
        if module.find_field_defn("DSID").is_none() {
            return Err(GdalVecError::S57(format!(
                "{} is an ISO8211 file, but not an S-57 data file.",
                module.description()
            )));
        }
        self.close();
        self.module = Some(module);
        self.state = ReaderState::Opened;
        Ok(())
    }

    /// Drop the module and everything read from it.
    pub fn close(&mut self) {
        self.module = None;
        self.clear_indices();
        self.state = ReaderState::Closed;
        self.next_fe_index = 0;
        self.pending.clear();
    }

    fn clear_indices(&mut self) {
        self.vi_index.clear();
        self.vc_index.clear();
        self.ve_index.clear();
        self.vf_index.clear();
        self.fe_index.clear();
        self.dsid = None;
        self.dspm = None;
        self.comf = DEFAULT_COMF;
        self.somf = DEFAULT_SOMF;
    }

    pub fn is_ingested(&self) -> bool {
        self.state == ReaderState::Ingested
    }

    /// Read every record of the module into the indices.
    pub fn ingest(&mut self, progress: &mut Progress) -> Result<()> {
        match self.state {
            ReaderState::Ingested => return Ok(()),
            ReaderState::Closed => {
                return Err(GdalVecError::S57("Reader is not open".to_string()))
            }
            ReaderState::Opened => {}
        }
        if let Err(e) = self.ingest_records(progress) {
            self.clear_indices();
            return Err(e);
        }
        for index in [
            &mut self.vi_index,
            &mut self.vc_index,
            &mut self.ve_index,
            &mut self.vf_index,
            &mut self.fe_index,
        ] {
            index.sort();
        }
        self.state = ReaderState::Ingested;
        debug!(
            "Ingested {} features, {} isolated nodes, {} connected nodes, {} edges, {} faces",
            self.fe_index.len(),
            self.vi_index.len(),
            self.vc_index.len(),
            self.ve_index.len(),
            self.vf_index.len()
        );
        Ok(())
    }

    fn ingest_records(&mut self, progress: &mut Progress) -> Result<()> {
        let module = self
            .module
            .as_mut()
            .ok_or_else(|| GdalVecError::S57("Reader is not open".to_string()))?;
        module.rewind()?;
        let length = module.len().max(1) as f64;

        while let Some(record) = module.read_record()? {
            if let Some(vrid) = record.find_field("VRID", 0) {
                let rcnm = vrid.int_subfield("RCNM", 0).unwrap_or_default() as i32;
                let rcid = vrid.int_subfield("RCID", 0).unwrap_or_default() as i32;
                match rcnm {
                    RCNM_VI => self.vi_index.add_record(rcid, record),
                    RCNM_VC => self.vc_index.add_record(rcid, record),
                    RCNM_VE => self.ve_index.add_record(rcid, record),
                    RCNM_VF => self.vf_index.add_record(rcid, record),
                    _ => debug!("Skipping vector record with RCNM {rcnm}"),
                }
            } else if let Some(frid) = record.find_field("FRID", 0) {
                let rcid = frid.int_subfield("RCID", 0).unwrap_or_default() as i32;
                self.fe_index.add_record(rcid, record);
            } else if record.has_field("DSPM") {
                self.comf = record
                    .int_subfield("DSPM", "COMF", 0)
                    .filter(|v| *v > 0)
                    .map_or(DEFAULT_COMF, |v| v as f64);
                self.somf = record
                    .int_subfield("DSPM", "SOMF", 0)
                    .filter(|v| *v > 0)
                    .map_or(DEFAULT_SOMF, |v| v as f64);
                self.dspm = Some(record);
            } else if record.has_field("DSID") {
                self.dsid = Some(record);
            } else {
                let tag = record
                    .fields()
                    .iter()
                    .map(|f| f.tag())
                    .find(|t| *t != "0001")
                    .unwrap_or("?");
                debug!("Skipping {tag} record");
            }
            progress.report(module.offset() as f64 / length, "")?;
        }
        Ok(())
    }

    fn ensure_ingested(&mut self) -> Result<()> {
        if self.state != ReaderState::Ingested {
            self.ingest(&mut Progress::none())?;
        }
        Ok(())
    }

    /// Coordinate multiplication factor.
    pub fn comf(&self) -> f64 {
        self.comf
    }

    /// Sounding multiplication factor.
    pub fn somf(&self) -> f64 {
        self.somf
    }

    pub fn feature_record_count(&self) -> usize {
        self.fe_index.len()
    }

    pub fn next_fe_index(&self) -> usize {
        self.next_fe_index
    }

    pub fn set_next_fe_index(&mut self, index: usize) {
        if index != self.next_fe_index {
            self.pending.clear();
        }
        self.next_fe_index = index;
    }

    pub fn rewind(&mut self) {
        self.set_next_fe_index(0);
    }

    /// Number of feature records per object class code.
    pub fn collect_class_list(&mut self) -> Result<BTreeMap<u16, usize>> {
        self.ensure_ingested()?;
        let mut counts = BTreeMap::new();
        for i in 0..self.fe_index.len() {
            if let Some(objl) = self
                .fe_index
                .record_at(i)
                .and_then(|r| r.int_subfield("FRID", "OBJL", 0))
            {
                *counts.entry(objl as u16).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Register a definition features can be assembled into.
    pub fn add_feature_defn(&mut self, defn: Arc<Defn>) {
        self.defns.push(defn);
    }

    pub fn feature_defns(&self) -> &[Arc<Defn>] {
        &self.defns
    }

    /// Build and register the definitions of all feature layers of the cell:
    /// one per object class when a class catalogue is attached, otherwise one
    /// per primitive. Features of classes missing from the catalogue go to the
    /// generic layer of their primitive.
    pub fn generate_feature_defns(&mut self) -> Result<Vec<Arc<Defn>>> {
        self.ensure_ingested()?;
        let mut by_key: BTreeMap<(u8, i64), Defn> = BTreeMap::new();
        for i in 0..self.fe_index.len() {
            let Some(record) = self.fe_index.record_at(i) else {
                break;
            };
            let objl = record.int_subfield("FRID", "OBJL", 0).unwrap_or_default();
            let prim = record.int_subfield("FRID", "PRIM", 0).unwrap_or(255);
            let class = self
                .registrar
                .as_deref()
                .and_then(|r| r.class(objl as u16).map(|c| (r, c)));
            match class {
                Some((registrar, class)) => {
                    by_key.entry((0, objl)).or_insert_with(|| {
                        feature_defns::class_defn(registrar, class, &self.options)
                    });
                }
                None => {
                    let prim = match prim {
                        PRIM_P | PRIM_L | PRIM_A => prim,
                        _ => 255,
                    };
                    by_key
                        .entry((1, prim))
                        .or_insert_with(|| feature_defns::generic_defn(prim, &self.options));
                }
            }
        }
        let defns: Vec<Arc<Defn>> = by_key.into_values().map(Arc::new).collect();
        self.defns.extend(defns.iter().cloned());
        Ok(defns)
    }

    /// Name of the layer a feature record belongs to.
    fn layer_name_for_record(&self, record: &Record) -> String {
        let objl = record.int_subfield("FRID", "OBJL", 0).unwrap_or_default();
        if let Some(class) = self.registrar.as_deref().and_then(|r| r.class(objl as u16)) {
            return class.acronym.clone();
        }
        let prim = record.int_subfield("FRID", "PRIM", 0).unwrap_or(255);
        feature_defns::generic_layer_name(prim).to_string()
    }

    fn defn_for_record(&self, record: &Record) -> Option<Arc<Defn>> {
        let name = self.layer_name_for_record(record);
        self.defns.iter().find(|d| d.name() == name).cloned()
    }

    /// Read the next feature, optionally restricted to the layer of `target`.
    ///
    /// Soundings split into several features are returned one at a time.
    pub fn read_next_feature(&mut self, target: Option<&Arc<Defn>>) -> Result<Option<Feature>> {
        if let Some(front) = self.pending.front() {
            if target.map_or(true, |t| Arc::ptr_eq(t, front.defn())) {
                return Ok(self.pending.pop_front());
            }
            self.pending.clear();
        }
        let mut parts = self.read_next_features(target)?.into_iter();
        let first = parts.next();
        self.pending.extend(parts);
        Ok(first)
    }

    /// Read the next feature record and return every feature assembled from
    /// it, or an empty vector at the end.
    pub fn read_next_features(&mut self, target: Option<&Arc<Defn>>) -> Result<Vec<Feature>> {
        self.ensure_ingested()?;
        while self.next_fe_index < self.fe_index.len() {
            let idx = self.next_fe_index;
            self.next_fe_index += 1;
            let Some(record) = self.fe_index.record_at(idx) else {
                break;
            };
            let defn = match target {
                Some(t) => {
                    if self.layer_name_for_record(record) != t.name() {
                        continue;
                    }
                    t.clone()
                }
                None => match self.defn_for_record(record) {
                    Some(d) => d,
                    None => continue,
                },
            };
            return self.assemble_parts(record, &defn);
        }
        Ok(vec![])
    }

    /// Read the feature with record identifier `fid` in the layer of `defn`.
    pub fn read_feature(&mut self, fid: i64, defn: &Arc<Defn>) -> Result<Option<Feature>> {
        self.ensure_ingested()?;
        let Ok(rcid) = i32::try_from(fid) else {
            return Ok(None);
        };
        let Some(record) = self.fe_index.lookup(rcid) else {
            return Ok(None);
        };
        if self.layer_name_for_record(record) != defn.name() {
            return Ok(None);
        }
        Ok(self.assemble_parts(record, defn)?.into_iter().next())
    }

    fn assemble_parts(&self, record: &Record, defn: &Arc<Defn>) -> Result<Vec<Feature>> {
        let (feature, depths) = self.assemble(record, defn)?;
        let split = self.options.split_multipoint
            && defn.geometry_type() == GeometryType::Point
            && feature
                .geometry()
                .is_some_and(|g| g.geometry_type() == GeometryType::MultiPoint);
        if split {
            self.split_soundings(feature, depths.unwrap_or_default())
        } else {
            Ok(vec![feature])
        }
    }

    fn split_soundings(&self, mut feature: Feature, depths: Vec<f64>) -> Result<Vec<Feature>> {
        let depth_idx = feature.defn().field_index("DEPTH");
        let Some(geometry) = feature.take_geometry(0) else {
            return Ok(vec![feature]);
        };
        let mut out = Vec::new();
        for (i, point) in geometry.into_parts().into_iter().enumerate() {
            let mut part = feature.clone();
            part.set_geometry_by_index(0, Some(point))?;
            if let (Some(idx), Some(depth)) = (depth_idx, depths.get(i)) {
                part.set_field_by_index(idx, Some(FieldValue::RealValue(*depth)))?;
            }
            out.push(part);
        }
        Ok(out)
    }

    /// Assemble a feature record into a feature of `defn`.
    pub fn assemble_feature(&self, record: &Record, defn: &Arc<Defn>) -> Result<Feature> {
        Ok(self.assemble(record, defn)?.0)
    }

    fn assemble(&self, record: &Record, defn: &Arc<Defn>) -> Result<(Feature, Option<Vec<f64>>)> {
        let frid = record
            .find_field("FRID", 0)
            .ok_or_else(|| GdalVecError::S57("Feature record without FRID".to_string()))?;
        let mut feature = Feature::new(defn.clone());
        let rcid = frid.int_subfield("RCID", 0).unwrap_or_default();
        feature.set_fid(Some(rcid));

        let foid = record.find_field("FOID", 0);
        let agen = foid.and_then(|f| f.int_subfield("AGEN", 0));
        let fidn = foid.and_then(|f| f.int_subfield("FIDN", 0));
        let fids = foid.and_then(|f| f.int_subfield("FIDS", 0));
        let standard = [
            ("RCID", Some(rcid)),
            ("PRIM", frid.int_subfield("PRIM", 0)),
            ("GRUP", frid.int_subfield("GRUP", 0)),
            ("OBJL", frid.int_subfield("OBJL", 0)),
            ("RVER", frid.int_subfield("RVER", 0)),
            ("AGEN", agen),
            ("FIDN", fidn),
            ("FIDS", fids),
        ];
        for (name, value) in standard {
            if let (Some(idx), Some(v)) = (defn.field_index(name), value) {
                feature.set_field_by_index(idx, Some(FieldValue::Integer64Value(v)))?;
            }
        }

        if self.options.lnam_refs {
            self.apply_lnam_refs(record, &mut feature, (agen, fidn, fids))?;
        }
        if self.registrar.is_some() {
            self.apply_attributes(record, &mut feature, "ATTF")?;
            self.apply_attributes(record, &mut feature, "NATF")?;
        }

        let (geometry, depths) = match frid.int_subfield("PRIM", 0) {
            Some(PRIM_P) => self.assemble_point(record, rcid)?,
            Some(PRIM_L) => (Some(self.assemble_line(record)?), None),
            Some(PRIM_A) => (Some(self.assemble_area(record)?), None),
            _ => (None, None),
        };
        if let (Some(mut geometry), true) = (geometry, defn.geom_field_count() > 0) {
            geometry.set_spatial_ref(self.spatial_ref.clone());
            feature.set_geometry_by_index(0, Some(geometry))?;
        }
        if let (Some(idx), Some(depths)) = (defn.field_index("DEPTH"), depths.as_ref()) {
            if defn.field(idx).map(|f| f.field_type()) == Some(FieldType::RealList) {
                feature.set_field_by_index(idx, Some(FieldValue::RealListValue(depths.clone())))?;
            }
        }
        Ok((feature, depths))
    }

    fn apply_lnam_refs(
        &self,
        record: &Record,
        feature: &mut Feature,
        (agen, fidn, fids): (Option<i64>, Option<i64>, Option<i64>),
    ) -> Result<()> {
        let defn = feature.defn().clone();
        if let (Some(idx), Some(agen), Some(fidn), Some(fids)) =
            (defn.field_index("LNAM"), agen, fidn, fids)
        {
            feature.set_field_by_index(idx, Some(FieldValue::StringValue(format_lnam(agen, fidn, fids))))?;
        }

        let mut refs = Vec::new();
        let mut rinds = Vec::new();
        for field in fields_with_tag(record, "FFPT") {
            for group in field.decode()? {
                if let Some(lnam) = group_value(field, &group, "LNAM")
                    .and_then(SubfieldValue::as_bytes)
                    .and_then(lnam_from_bytes)
                {
                    refs.push(lnam);
                    let rind = group_value(field, &group, "RIND").and_then(SubfieldValue::as_int);
                    rinds.push(rind.unwrap_or_default() as i32);
                }
            }
        }
        if refs.is_empty() {
            return Ok(());
        }
        if let Some(idx) = defn.field_index("LNAM_REFS") {
            feature.set_field_by_index(idx, Some(FieldValue::StringListValue(refs)))?;
        }
        if let Some(idx) = defn.field_index("FFPT_RIND") {
            feature.set_field_by_index(idx, Some(FieldValue::IntegerListValue(rinds)))?;
        }
        Ok(())
    }

    fn apply_attributes(&self, record: &Record, feature: &mut Feature, tag: &str) -> Result<()> {
        let Some(registrar) = self.registrar.as_deref() else {
            return Ok(());
        };
        let defn = feature.defn().clone();
        for field in fields_with_tag(record, tag) {
            for group in field.decode()? {
                let Some(code) = group_value(field, &group, "ATTL").and_then(SubfieldValue::as_int)
                else {
                    continue;
                };
                let Some(attribute) = u16::try_from(code).ok().and_then(|c| registrar.attribute(c))
                else {
                    warn_once(&format!(
                        "Illegal feature attribute id ({tag}:ATTL) of {code}, skipping attribute"
                    ));
                    continue;
                };
                let Some(idx) = defn.field_index(&attribute.acronym) else {
                    debug!(
                        "Attribute {} is not part of layer {}",
                        attribute.acronym,
                        defn.name()
                    );
                    continue;
                };
                let raw = group_value(field, &group, "ATVL")
                    .map(SubfieldValue::as_text)
                    .unwrap_or_default();
                let raw = raw.trim();
                if raw.is_empty() {
                    continue;
                }
                let value = match defn.field(idx).map(|f| f.field_type()) {
                    Some(FieldType::Integer) => raw.parse().ok().map(FieldValue::IntegerValue),
                    Some(FieldType::Real) => raw.parse().ok().map(FieldValue::RealValue),
                    Some(FieldType::StringList) => Some(FieldValue::StringListValue(
                        raw.split(',').map(|s| s.trim().to_string()).collect(),
                    )),
                    _ => Some(FieldValue::StringValue(raw.to_string())),
                };
                match value {
                    Some(v) => feature.set_field_by_index(idx, Some(v))?,
                    None => debug!("Unparsable value '{raw}' for attribute {}", attribute.acronym),
                }
            }
        }
        Ok(())
    }

    fn node_index(&self, rcnm: i32) -> Option<&RecordIndex> {
        match rcnm {
            RCNM_VI => Some(&self.vi_index),
            RCNM_VC => Some(&self.vc_index),
            RCNM_VE => Some(&self.ve_index),
            RCNM_VF => Some(&self.vf_index),
            _ => None,
        }
    }

    /// Coordinates of an `SG2D` or `SG3D` field, scaled by `COMF`, plus the
    /// depths of an `SG3D` field scaled by `SOMF`.
    fn coordinates(&self, record: &Record) -> Result<(Vec<Coord<f64>>, Vec<f64>)> {
        let mut coords = Vec::new();
        let mut depths = Vec::new();
        for field in record.fields() {
            let three_d = match field.tag() {
                "SG2D" => false,
                "SG3D" => true,
                _ => continue,
            };
            for group in field.decode()? {
                let int = |name| group_value(field, &group, name).and_then(SubfieldValue::as_int);
                let (Some(y), Some(x)) = (int("YCOO"), int("XCOO")) else {
                    continue;
                };
                coords.push(Coord {
                    x: x as f64 / self.comf,
                    y: y as f64 / self.comf,
                });
                if three_d {
                    depths.push(int("VE3D").unwrap_or_default() as f64 / self.somf);
                }
            }
        }
        Ok((coords, depths))
    }

    fn fetch_point(&self, rcnm: i32, rcid: i32) -> Result<Option<Coord<f64>>> {
        match self.node_index(rcnm).and_then(|i| i.lookup(rcid)) {
            Some(record) => Ok(self.coordinates(record)?.0.first().copied()),
            None => Ok(None),
        }
    }

    fn assemble_point(&self, record: &Record, fid: i64) -> Result<(Option<Geometry>, Option<Vec<f64>>)> {
        let pointers = spatial_pointers(record, "FSPT")?;
        let Some(pointer) = pointers.first() else {
            return Ok((None, None));
        };
        let Some(node) = self.node_index(pointer.rcnm).and_then(|i| i.lookup(pointer.rcid)) else {
            let msg = format!(
                "Failed to fetch spatial record {}/{} for point feature {fid}",
                pointer.rcnm, pointer.rcid
            );
            error!("{msg}");
            return Err(GdalVecError::S57(msg));
        };
        let (coords, depths) = self.coordinates(node)?;
        if node.has_field("SG3D") {
            let points = MultiPoint::new(coords.into_iter().map(Point::from).collect());
            let depths = self.options.add_soundg_depth.then_some(depths);
            return Ok((Some(Geometry::from(GeoGeometry::MultiPoint(points))), depths));
        }
        let geometry = match coords.first() {
            Some(c) => Geometry::from(GeoGeometry::Point(Point::from(*c))),
            None => Geometry::empty(GeometryType::Point),
        };
        Ok((Some(geometry), None))
    }

    /// Vertices of an edge: start node, interior vertices, end node.
    fn edge_coordinates(&self, rcid: i32) -> Result<Option<Vec<Coord<f64>>>> {
        let Some(edge) = self.ve_index.lookup(rcid) else {
            return Ok(None);
        };
        let nodes = spatial_pointers(edge, "VRPT")?;
        let start = nodes
            .iter()
            .find(|n| n.topi == 1)
            .or_else(|| nodes.first())
            .copied();
        let end = nodes
            .iter()
            .find(|n| n.topi == 2)
            .or_else(|| nodes.get(1))
            .copied();

        let mut coords = Vec::new();
        if let Some(c) = match start {
            Some(n) => self.fetch_point(n.rcnm, n.rcid)?,
            None => None,
        } {
            coords.push(c);
        }
        coords.extend(self.coordinates(edge)?.0);
        if let Some(c) = match end {
            Some(n) => self.fetch_point(n.rcnm, n.rcid)?,
            None => None,
        } {
            coords.push(c);
        }
        Ok(Some(coords))
    }

    /// Edges referenced by a feature, oriented as the feature uses them.
    fn feature_edges(&self, record: &Record) -> Result<Vec<Vec<Coord<f64>>>> {
        let mut edges = Vec::new();
        for pointer in spatial_pointers(record, "FSPT")? {
            if pointer.rcnm != RCNM_VE {
                continue;
            }
            match self.edge_coordinates(pointer.rcid)? {
                Some(mut coords) => {
                    if pointer.ornt == 2 {
                        coords.reverse();
                    }
                    edges.push(coords);
                }
                None => emit_error(
                    CplErrType::Warning,
                    CplErrorNum::AppDefined,
                    &format!("Couldn't find spatial record {}/{}", pointer.rcnm, pointer.rcid),
                ),
            }
        }
        Ok(edges)
    }

    fn assemble_line(&self, record: &Record) -> Result<Geometry> {
        let mut lines: Vec<Vec<Coord<f64>>> = Vec::new();
        for edge in self.feature_edges(record)? {
            if edge.is_empty() {
                continue;
            }
            match lines.last_mut() {
                Some(line) if line.last() == edge.first() => line.extend(edge.into_iter().skip(1)),
                _ => lines.push(edge),
            }
        }
        Ok(match lines.len() {
            0 => Geometry::empty(GeometryType::LineString),
            1 => Geometry::from(GeoGeometry::LineString(LineString::new(lines.remove(0)))),
            _ => Geometry::from(GeoGeometry::MultiLineString(MultiLineString::new(
                lines.into_iter().map(LineString::new).collect(),
            ))),
        })
    }

    fn assemble_area(&self, record: &Record) -> Result<Geometry> {
        let edges = self
            .feature_edges(record)?
            .into_iter()
            .map(LineString::new)
            .collect();
        let polygon = build_polygon_from_edges(edges, 0.0);
        Ok(Geometry::from(GeoGeometry::Polygon(polygon)))
    }

    /// The dataset identification feature, from the `DSID` and `DSPM` records.
    pub fn read_dsid_feature(&mut self, defn: &Arc<Defn>) -> Result<Option<Feature>> {
        self.ensure_ingested()?;
        if self.dsid.is_none() && self.dspm.is_none() {
            return Ok(None);
        }
        let mut feature = Feature::new(defn.clone());
        for (name, tag, subfield, ty) in DSID_FIELDS {
            let record = if *tag == "DSPM" { &self.dspm } else { &self.dsid };
            let (Some(idx), Some(field)) = (
                defn.field_index(name),
                record.as_ref().and_then(|r| r.find_field(tag, 0)),
            ) else {
                continue;
            };
            let value = match field.subfield(subfield, 0) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    emit_error(
                        CplErrType::Warning,
                        CplErrorNum::AppDefined,
                        &format!("Unable to read {tag}:{subfield}, leaving {name} unset: {e}"),
                    );
                    continue;
                }
            };
            let value = match ty {
                FieldType::Integer => value.as_int().map(FieldValue::Integer64Value),
                FieldType::Real => value.as_float().map(FieldValue::RealValue),
                _ => Some(FieldValue::StringValue(value.as_text().trim().to_string())),
            };
            if let Some(v) = value {
                feature.set_field_by_index(idx, Some(v))?;
            }
        }
        Ok(Some(feature))
    }

    /// Number of primitive records of type `rcnm`.
    pub fn primitive_count(&self, rcnm: i32) -> usize {
        self.node_index(rcnm).map_or(0, RecordIndex::len)
    }

    /// The `idx`-th primitive record of type `rcnm` as a feature of `defn`.
    pub fn read_vector(&mut self, rcnm: i32, idx: usize, defn: &Arc<Defn>) -> Result<Option<Feature>> {
        self.ensure_ingested()?;
        let Some(record) = self.node_index(rcnm).and_then(|i| i.record_at(idx)) else {
            return Ok(None);
        };
        let vrid = record
            .find_field("VRID", 0)
            .ok_or_else(|| GdalVecError::S57("Vector record without VRID".to_string()))?;
        let rcid = vrid.int_subfield("RCID", 0).unwrap_or_default();
        let mut feature = Feature::new(defn.clone());
        feature.set_fid(Some(rcid));
        for name in ["RCNM", "RCID", "RVER", "RUIN"] {
            if let (Some(i), Some(v)) = (defn.field_index(name), vrid.int_subfield(name, 0)) {
                feature.set_field_by_index(i, Some(FieldValue::Integer64Value(v)))?;
            }
        }

        let geometry = if rcnm == RCNM_VE {
            let nodes = spatial_pointers(record, "VRPT")?;
            for (i, node) in nodes.iter().take(2).enumerate() {
                for (field, value) in [("NAME_RCNM", node.rcnm), ("NAME_RCID", node.rcid)] {
                    if let Some(fi) = defn.field_index(&format!("{field}_{i}")) {
                        feature.set_field_by_index(fi, Some(FieldValue::IntegerValue(value)))?;
                    }
                }
            }
            let coords = self.edge_coordinates(rcid as i32)?.unwrap_or_default();
            Some(GeoGeometry::LineString(LineString::new(coords)))
        } else {
            let (coords, _) = self.coordinates(record)?;
            match coords.len() {
                0 => None,
                1 => Some(GeoGeometry::Point(Point::from(coords[0]))),
                _ => Some(GeoGeometry::MultiPoint(MultiPoint::new(
                    coords.into_iter().map(Point::from).collect(),
                ))),
            }
        };
        if let Some(g) = geometry {
            let mut g = Geometry::from(g);
            g.set_spatial_ref(self.spatial_ref.clone());
            feature.set_geometry_by_index(0, Some(g))?;
        }
        Ok(Some(feature))
    }
}
