use std::collections::HashMap;
use std::sync::Arc;

use geo_types::{Geometry as GeoGeometry, GeometryCollection, MultiLineString, MultiPoint, MultiPolygon};
use structopt::StructOpt;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::feature_store::StorageKind;
use crate::programs::vector::non_streaming::{run_batch_step, BatchAlgorithm, BatchPlan};
use crate::programs::vector::step::{parse_step_args, parsed, required_input, StepAlgorithm};
use crate::programs::vector::steps::ActiveArgs;
use crate::spatial_ref::SpatialRef;
use crate::vector::{Dataset, Defn, Feature, GeomFieldDefn, Geometry, GeometryType};

#[derive(Debug, Clone, StructOpt)]
struct CollectArgs {
    /// Comma separated fields whose values define the groups
    #[structopt(long, use_delimiter = true)]
    group_by: Vec<String>,

    /// Where buffered features are kept: memory or temp-file
    #[structopt(long)]
    storage: Option<StorageKind>,

    #[structopt(flatten)]
    active: ActiveArgs,
}

/// Merge the geometries of features sharing the same group-by values into a
/// single multi geometry.
///
/// Groups are emitted in the order their first feature was read, numbered
/// from 0. Without group-by fields the whole layer is one group.
struct CollectGeometries {
    group_fields: Vec<usize>,
    geom_field: usize,
    keys: HashMap<Vec<Option<String>>, usize>,
    groups: Vec<Vec<usize>>,
}

impl CollectGeometries {
    fn new(source: &Defn, group_by: &[String], geom_field: Option<&str>) -> Result<Self> {
        let group_fields = group_by
            .iter()
            .map(|name| source.require_field_index(name, "collect"))
            .collect::<Result<Vec<_>>>()?;
        let geom_field = match geom_field {
            Some(name) => source.geom_field_index(name).ok_or_else(|| {
                GdalVecError::GeometryFieldNotFound {
                    field_name: name.to_string(),
                    layer_name: source.name().to_string(),
                }
            })?,
            None => 0,
        };
        Ok(CollectGeometries {
            group_fields,
            geom_field,
            keys: HashMap::new(),
            groups: Vec::new(),
        })
    }
}

/// Assemble parts into the tightest multi type that holds them all.
fn collect_parts(parts: Vec<Geometry>, spatial_ref: Option<SpatialRef>) -> Geometry {
    let inner: Vec<GeoGeometry<f64>> = parts
        .into_iter()
        .flat_map(Geometry::into_parts)
        .map(Geometry::into_inner)
        .collect();
    let collected = if !inner.is_empty() && inner.iter().all(|g| matches!(g, GeoGeometry::Point(_))) {
        GeoGeometry::MultiPoint(MultiPoint::new(
            inner
                .into_iter()
                .filter_map(|g| match g {
                    GeoGeometry::Point(p) => Some(p),
                    _ => None,
                })
                .collect(),
        ))
    } else if !inner.is_empty() && inner.iter().all(|g| matches!(g, GeoGeometry::LineString(_))) {
        GeoGeometry::MultiLineString(MultiLineString::new(
            inner
                .into_iter()
                .filter_map(|g| match g {
                    GeoGeometry::LineString(l) => Some(l),
                    _ => None,
                })
                .collect(),
        ))
    } else if !inner.is_empty() && inner.iter().all(|g| matches!(g, GeoGeometry::Polygon(_))) {
        GeoGeometry::MultiPolygon(MultiPolygon::new(
            inner
                .into_iter()
                .filter_map(|g| match g {
                    GeoGeometry::Polygon(p) => Some(p),
                    _ => None,
                })
                .collect(),
        ))
    } else {
        GeoGeometry::GeometryCollection(GeometryCollection::from(inner))
    };
    let mut geometry = Geometry::from(collected);
    geometry.set_spatial_ref(spatial_ref);
    geometry
}

impl BatchAlgorithm for CollectGeometries {
    fn output_defn(&self, source: &Defn) -> Result<Defn> {
        let mut defn = Defn::new(source.name());
        for &idx in &self.group_fields {
            if let Some(field) = source.field(idx) {
                defn.add_field(field.clone());
            }
        }
        if let Some(field) = source.geom_field(self.geom_field) {
            let ty = match field.geometry_type() {
                GeometryType::Unknown | GeometryType::None => GeometryType::GeometryCollection,
                ty => ty.to_multi(),
            };
            defn.add_geom_field(
                GeomFieldDefn::new(field.name(), ty).with_spatial_ref(field.spatial_ref().cloned()),
            );
        }
        Ok(defn)
    }

    fn observe(&mut self, idx: usize, feature: &Feature) -> Result<()> {
        let key = self
            .group_fields
            .iter()
            .map(|&i| feature.field_as_string(i))
            .collect::<Result<Vec<_>>>()?;
        let next = self.groups.len();
        let group = *self.keys.entry(key).or_insert(next);
        if group == next {
            self.groups.push(Vec::new());
        }
        self.groups[group].push(idx);
        Ok(())
    }

    fn process(&mut self, _count: usize, progress: &mut Progress) -> Result<BatchPlan> {
        self.keys.clear();
        progress.report(1.0, "")?;
        Ok(BatchPlan::groups(std::mem::take(&mut self.groups)))
    }

    fn emit(&mut self, defn: &Arc<Defn>, slot: usize, inputs: Vec<Feature>) -> Result<Option<Feature>> {
        let Some(first) = inputs.first() else {
            return Ok(None);
        };
        let mut collected = Feature::new(defn.clone());
        collected.set_fid(Some(slot as i64));
        for (dst, &src) in self.group_fields.iter().enumerate() {
            collected.set_field_by_index(dst, first.field_by_index(src)?.cloned())?;
        }
        if defn.geom_field_count() > 0 {
            let spatial_ref = defn.geom_field(0).and_then(|f| f.spatial_ref().cloned());
            let mut parts = Vec::with_capacity(inputs.len());
            for mut feature in inputs {
                if let Some(geometry) = feature.take_geometry(self.geom_field) {
                    parts.push(geometry);
                }
            }
            let mut geometry = collect_parts(parts, spatial_ref);
            let ty = defn.geometry_type();
            if ty != GeometryType::GeometryCollection {
                geometry = geometry.force_to(ty);
            }
            collected.set_geometry_by_index(0, Some(geometry))?;
        }
        Ok(Some(collected))
    }

    fn reset(&mut self) {
        self.keys.clear();
        self.groups.clear();
    }
}

/// `collect`: combine features into one multi geometry per group.
#[derive(Debug, Default)]
pub struct CollectStep {
    args: Option<CollectArgs>,
}

impl StepAlgorithm for CollectStep {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn is_natively_streaming_compatible(&self) -> bool {
        false
    }

    fn run_step(&mut self, input: Option<Dataset>, progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let input = required_input(input, self.name())?;
        let storage = match args.storage {
            Some(storage) => storage,
            None => StorageKind::from_config()?,
        };
        run_batch_step(input, args.active.active_layer.as_deref(), storage, progress, |defn| {
            CollectGeometries::new(defn, &args.group_by, args.active.active_geometry.as_deref())
        })
    }
}
