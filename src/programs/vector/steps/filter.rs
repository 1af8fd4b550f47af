use std::str::FromStr;
use std::sync::Arc;

use structopt::StructOpt;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::output_layer::{FeatureTranslator, PipelineOutputLayer};
use crate::programs::vector::step::{map_layers, parse_step_args, parsed, required_input, StepAlgorithm};
use crate::programs::vector::steps::ActiveArgs;
use crate::vector::{Dataset, Defn, Feature, Geometry, Layer, LayerCaps};

/// `xmin,ymin,xmax,ymax`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bbox([f64; 4]);

impl FromStr for Bbox {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid bbox '{s}': {e}"))?;
        let [xmin, ymin, xmax, ymax] = values[..] else {
            return Err(format!("bbox needs 4 values, got {}", values.len()));
        };
        if xmin > xmax || ymin > ymax {
            return Err(format!("invalid bbox '{s}': min greater than max"));
        }
        Ok(Bbox([xmin, ymin, xmax, ymax]))
    }
}

#[derive(Debug, Clone, StructOpt)]
struct FilterArgs {
    /// Keep features intersecting xmin,ymin,xmax,ymax
    #[structopt(long, allow_hyphen_values = true)]
    bbox: Bbox,

    #[structopt(flatten)]
    active: ActiveArgs,
}

struct BboxFilter {
    bbox: Geometry,
    geom_field: Option<usize>,
}

impl FeatureTranslator for BboxFilter {
    fn translate(&mut self, _defn: &Arc<Defn>, feature: Feature, out: &mut Vec<Feature>) -> Result<()> {
        let keep = match self.geom_field {
            Some(idx) => feature
                .geometry_by_index(idx)?
                .is_some_and(|g| !g.is_empty() && g.intersects(&self.bbox)),
            None => false,
        };
        if keep {
            out.push(feature);
        }
        Ok(())
    }

    fn proxied_capabilities(&self) -> LayerCaps {
        LayerCaps::RANDOM_READ
    }
}

/// `filter`: keep features whose geometry intersects a bounding box.
///
/// Features are passed through untouched, so the output layer shares the
/// definition of its source.
#[derive(Debug, Default)]
pub struct FilterStep {
    args: Option<FilterArgs>,
}

impl StepAlgorithm for FilterStep {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn run_step(&mut self, input: Option<Dataset>, _progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let input = required_input(input, self.name())?;
        let [xmin, ymin, xmax, ymax] = args.bbox.0;
        map_layers(input, args.active.active_layer.as_deref(), |source| {
            let defn = source.defn();
            let geom_field = match args.active.active_geometry.as_deref() {
                Some(name) => Some(defn.geom_field_index(name).ok_or_else(|| {
                    GdalVecError::GeometryFieldNotFound {
                        field_name: name.to_string(),
                        layer_name: defn.name().to_string(),
                    }
                })?),
                None if defn.geom_field_count() > 0 => Some(0),
                None => None,
            };
            let filter = BboxFilter {
                bbox: Geometry::bbox(xmin, ymin, xmax, ymax),
                geom_field,
            };
            let defn = (**defn).clone();
            Ok(Box::new(PipelineOutputLayer::new(source, defn, filter)) as Box<dyn Layer>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::vector::step::PipelineStep;
    use crate::test_utils::{collect_wkt, wkt_dataset};
    use crate::vector::GeometryType;

    #[test]
    fn test_bbox_parse() {
        assert_eq!("0,1,2,3".parse::<Bbox>(), Ok(Bbox([0.0, 1.0, 2.0, 3.0])));
        assert_eq!("-1, -1, 1, 1".parse::<Bbox>(), Ok(Bbox([-1.0, -1.0, 1.0, 1.0])));
        assert!("0,1,2".parse::<Bbox>().is_err());
        assert!("2,0,1,1".parse::<Bbox>().is_err());
        assert!("a,b,c,d".parse::<Bbox>().is_err());
    }

    #[test]
    fn test_filter_bbox() -> Result<()> {
        let input = wkt_dataset(
            "pts",
            GeometryType::Unknown,
            &["POINT (1 1)", "POINT (5 5)", "LINESTRING (-1 -1, 0.5 0.5)"],
        );
        let mut step = PipelineStep::new(Box::<FilterStep>::default());
        step.parse_args(&["--bbox".to_string(), "0,0,2,2".to_string()])?;
        step.set_input(input);
        step.run_step(&mut Progress::none())?;
        let mut output = step.take_output().unwrap();
        let fids: Vec<_> = collect_wkt(output.layer(0)?).into_iter().map(|(fid, _)| fid).collect();
        assert_eq!(fids, vec![Some(0), Some(2)]);
        Ok(())
    }
}
