use std::sync::Arc;

use itertools::Itertools;
use log::warn;
use structopt::StructOpt;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::output_layer::{FeatureTranslator, PipelineOutputLayer};
use crate::programs::vector::step::{map_layers, parse_step_args, parsed, required_input, StepAlgorithm};
use crate::vector::{Dataset, Defn, Feature, FieldMap, Layer, LayerCaps};

#[derive(Debug, Clone, StructOpt)]
struct SelectArgs {
    /// Comma separated list of fields to keep, or to drop with --exclude
    #[structopt(use_delimiter = true, required = true)]
    fields: Vec<String>,

    /// Drop the listed fields instead of keeping them
    #[structopt(long)]
    exclude: bool,

    /// Silently skip listed fields the layer does not have
    #[structopt(long)]
    ignore_missing_fields: bool,

    /// Layer to process, all layers when unset
    #[structopt(long)]
    active_layer: Option<String>,
}

struct SelectFields {
    map: FieldMap,
}

impl FeatureTranslator for SelectFields {
    fn translate(&mut self, defn: &Arc<Defn>, feature: Feature, out: &mut Vec<Feature>) -> Result<()> {
        out.push(feature.remap(defn.clone(), &self.map));
        Ok(())
    }

    fn proxied_capabilities(&self) -> LayerCaps {
        LayerCaps::FAST_FEATURE_COUNT | LayerCaps::FAST_GET_EXTENT | LayerCaps::RANDOM_READ
    }
}

/// Indices of the attribute fields of `defn` to keep. Geometry fields are
/// always kept, so naming one is not an error.
fn selected_indices(defn: &Defn, args: &SelectArgs) -> Result<Vec<usize>> {
    let mut listed = Vec::with_capacity(args.fields.len());
    for name in &args.fields {
        match defn.field_index(name) {
            Some(idx) => listed.push(idx),
            None if defn.geom_field_index(name).is_some() => {}
            None if args.ignore_missing_fields => {
                warn!("select: field '{name}' not found in layer '{}'", defn.name());
            }
            None => {
                return Err(GdalVecError::InvalidFieldName {
                    field_name: name.clone(),
                    method_name: "select",
                })
            }
        }
    }
    if args.exclude {
        Ok((0..defn.field_count()).filter(|i| !listed.contains(i)).collect())
    } else {
        Ok(listed.into_iter().unique().collect())
    }
}

/// `select`: keep or drop attribute fields.
#[derive(Debug, Default)]
pub struct SelectStep {
    args: Option<SelectArgs>,
}

impl StepAlgorithm for SelectStep {
    fn name(&self) -> &'static str {
        "select"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn run_step(&mut self, input: Option<Dataset>, _progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let input = required_input(input, self.name())?;
        map_layers(input, args.active_layer.as_deref(), |source| {
            let indices = selected_indices(source.defn(), args)?;
            let defn = source.defn().select_fields(&indices);
            let map = FieldMap::by_name(source.defn(), &defn);
            Ok(Box::new(PipelineOutputLayer::new(source, defn, SelectFields { map })) as Box<dyn Layer>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::vector::step::PipelineStep;
    use crate::test_utils::wkt_dataset;
    use crate::vector::{FieldValue, GeometryType};

    fn select(args: &[&str]) -> Result<Dataset> {
        let mut step = PipelineStep::new(Box::<SelectStep>::default());
        step.parse_args(&args.iter().map(|s| s.to_string()).collect::<Vec<_>>())?;
        step.set_input(wkt_dataset("pts", GeometryType::Point, &["POINT (1 2)"]));
        step.run_step(&mut Progress::none())?;
        step.take_output()
            .ok_or_else(|| GdalVecError::BadArgument("no output".into()))
    }

    #[test]
    fn test_select_keep() -> Result<()> {
        let mut output = select(&["id,geom"])?;
        let layer = output.layer(0)?;
        assert_eq!(layer.defn().field_count(), 1);
        assert_eq!(layer.defn().geom_field_count(), 1);
        assert!(layer.has_capability(LayerCaps::FAST_FEATURE_COUNT));
        let f = layer.next_feature()?.unwrap();
        assert_eq!(f.field("id")?, Some(&FieldValue::IntegerValue(0)));
        assert!(f.field("name").is_err());
        assert!(f.geometry().is_some());
        Ok(())
    }

    #[test]
    fn test_select_exclude() -> Result<()> {
        let mut output = select(&["--exclude", "id"])?;
        let layer = output.layer(0)?;
        let names: Vec<_> = layer.defn().fields().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["name"]);
        Ok(())
    }

    #[test]
    fn test_select_missing_field() {
        assert!(matches!(
            select(&["nope"]),
            Err(GdalVecError::InvalidFieldName { .. })
        ));
        assert!(select(&["nope,id", "--ignore-missing-fields"]).is_ok());
    }
}
