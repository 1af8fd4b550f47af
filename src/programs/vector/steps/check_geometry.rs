use std::sync::Arc;

use structopt::StructOpt;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::output_layer::{FeatureTranslator, PipelineOutputLayer};
use crate::programs::vector::step::{map_layers, parse_step_args, parsed, required_input, StepAlgorithm};
use crate::programs::vector::steps::ActiveArgs;
use crate::vector::{
    Dataset, Defn, Feature, FieldDefn, FieldMap, FieldType, FieldValue, GeomFieldDefn,
    Geometry, GeometryType, Layer, LayerCaps,
};

#[derive(Debug, Clone, StructOpt)]
struct CheckGeometryArgs {
    /// Also output a feature for valid geometries
    #[structopt(long)]
    include_valid: bool,

    /// Source field copied to the output, may be repeated
    #[structopt(long, number_of_values = 1)]
    include_field: Vec<String>,

    #[structopt(flatten)]
    active: ActiveArgs,
}

struct ValidityCheck {
    geom_field: Option<usize>,
    include_valid: bool,
    map: FieldMap,
}

impl FeatureTranslator for ValidityCheck {
    fn translate(&mut self, defn: &Arc<Defn>, feature: Feature, out: &mut Vec<Feature>) -> Result<()> {
        let geometry = match self.geom_field {
            Some(idx) => feature.geometry_by_index(idx)?,
            None => None,
        };
        let report = geometry.map(Geometry::validity).filter(|r| !r.valid);
        if report.is_none() && !self.include_valid {
            return Ok(());
        }
        let spatial_ref = geometry.and_then(|g| g.spatial_ref().cloned());

        let mut checked = feature.remap(defn.clone(), &self.map);
        if let Some(report) = report {
            let error_idx = defn.field_count() - 1;
            let reason = report.reason.unwrap_or_else(|| "Invalid geometry".to_string());
            checked.set_field_by_index(error_idx, Some(FieldValue::StringValue(reason)))?;
            let location = report.location.map(|(x, y)| {
                let mut point = Geometry::from(geo_types::Geometry::Point((x, y).into()));
                point.set_spatial_ref(spatial_ref);
                point
            });
            checked.set_geometry_by_index(0, location)?;
        }
        out.push(checked);
        Ok(())
    }

    fn proxied_capabilities(&self) -> LayerCaps {
        if self.include_valid {
            LayerCaps::RANDOM_READ | LayerCaps::FAST_FEATURE_COUNT
        } else {
            LayerCaps::RANDOM_READ
        }
    }
}

/// Output definition: the included source fields, an `error` field, and the
/// error location as a point.
fn check_defn(source: &Defn, geom_field: Option<usize>, include: &[String]) -> Result<Defn> {
    let spatial_ref = geom_field
        .and_then(|idx| source.geom_field(idx))
        .and_then(|f| f.spatial_ref().cloned());
    let mut defn = Defn::new(source.name());
    for name in include {
        let idx = source.require_field_index(name, "check-geometry")?;
        if let Some(field) = source.field(idx) {
            defn.add_field(field.clone());
        }
    }
    defn.add_field(FieldDefn::new("error", FieldType::String));
    defn.add_geom_field(
        GeomFieldDefn::new("location", GeometryType::Point).with_spatial_ref(spatial_ref),
    );
    Ok(defn)
}

/// `check-geometry`: report invalid geometries with the reason and the
/// location of the first problem. Output FIDs are the source ones.
#[derive(Debug, Default)]
pub struct CheckGeometryStep {
    args: Option<CheckGeometryArgs>,
}

impl StepAlgorithm for CheckGeometryStep {
    fn name(&self) -> &'static str {
        "check-geometry"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn run_step(&mut self, input: Option<Dataset>, _progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let input = required_input(input, self.name())?;
        map_layers(input, args.active.active_layer.as_deref(), |source| {
            let source_defn = source.defn().clone();
            let geom_field = match args.active.active_geometry.as_deref() {
                Some(name) => Some(source_defn.geom_field_index(name).ok_or_else(|| {
                    GdalVecError::GeometryFieldNotFound {
                        field_name: name.to_string(),
                        layer_name: source_defn.name().to_string(),
                    }
                })?),
                None if source_defn.geom_field_count() > 0 => Some(0),
                None => None,
            };
            let defn = check_defn(&source_defn, geom_field, &args.include_field)?;
            let map = FieldMap::by_name(&source_defn, &defn);
            let check = ValidityCheck {
                geom_field,
                include_valid: args.include_valid,
                map,
            };
            Ok(Box::new(PipelineOutputLayer::new(source, defn, check)) as Box<dyn Layer>)
        })
    }
}
