use structopt::StructOpt;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::feature_store::StorageKind;
use crate::programs::vector::geos_batch::{CoverageOperation, GeosBatch};
use crate::programs::vector::non_streaming::run_batch_step;
use crate::programs::vector::step::{parse_step_args, parsed, required_input, StepAlgorithm};
use crate::programs::vector::steps::ActiveArgs;
use crate::vector::ops::coverage::{coverage_clean, coverage_invalid_edges, OverlapStrategy};
use crate::vector::ops::{GeomHandle, GeometryContext};
use crate::vector::{Dataset, Geometry, GeometryType};

#[derive(Debug, Clone, StructOpt)]
struct CheckCoverageArgs {
    /// Also output polygons that are correctly aligned, without geometry
    #[structopt(long)]
    include_valid: bool,

    /// Where buffered features are kept: memory or temp-file
    #[structopt(long)]
    storage: Option<StorageKind>,

    #[structopt(flatten)]
    active: ActiveArgs,
}

struct InvalidEdges {
    include_valid: bool,
}

impl CoverageOperation for InvalidEdges {
    fn name(&self) -> &'static str {
        "check-coverage"
    }

    fn run(
        &self,
        ctx: &mut GeometryContext,
        inputs: &[GeomHandle],
        progress: &mut Progress,
    ) -> Result<Vec<Option<GeomHandle>>> {
        coverage_invalid_edges(ctx, inputs, progress)
    }

    fn output_geometry_type(&self, _input: GeometryType) -> GeometryType {
        GeometryType::MultiLineString
    }

    fn keep_feature(&self, result: Option<&Geometry>) -> bool {
        self.include_valid || result.is_some()
    }
}

fn storage_or_default(storage: Option<StorageKind>) -> Result<StorageKind> {
    match storage {
        Some(storage) => Ok(storage),
        None => StorageKind::from_config(),
    }
}

/// `check-coverage`: report the edges along which polygons of a layer
/// overlap. Each output feature carries the invalid edges of one input
/// polygon.
#[derive(Debug, Default)]
pub struct CheckCoverageStep {
    args: Option<CheckCoverageArgs>,
}

impl StepAlgorithm for CheckCoverageStep {
    fn name(&self) -> &'static str {
        "check-coverage"
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
        let storage = storage_or_default(args.storage)?;
        run_batch_step(input, args.active.active_layer.as_deref(), storage, progress, |defn| {
            let operation = InvalidEdges {
                include_valid: args.include_valid,
            };
            GeosBatch::new(operation, defn, args.active.active_geometry.as_deref())
        })
    }
}

#[derive(Debug, Clone, StructOpt)]
struct CleanCoverageArgs {
    /// Polygon keeping an overlap: min-index, max-area or min-area
    #[structopt(long, default_value = "min-index")]
    merge_strategy: OverlapStrategy,

    /// Where buffered features are kept: memory or temp-file
    #[structopt(long)]
    storage: Option<StorageKind>,

    #[structopt(flatten)]
    active: ActiveArgs,
}

struct Clean {
    strategy: OverlapStrategy,
}

impl CoverageOperation for Clean {
    fn name(&self) -> &'static str {
        "clean-coverage"
    }

    fn run(
        &self,
        ctx: &mut GeometryContext,
        inputs: &[GeomHandle],
        progress: &mut Progress,
    ) -> Result<Vec<Option<GeomHandle>>> {
        let cleaned = coverage_clean(ctx, inputs, self.strategy, progress)?;
        Ok(cleaned.into_iter().map(Some).collect())
    }
}

/// `clean-coverage`: remove overlaps between the polygons of a layer, the
/// merge strategy deciding which polygon keeps each overlap.
#[derive(Debug, Default)]
pub struct CleanCoverageStep {
    args: Option<CleanCoverageArgs>,
}

impl StepAlgorithm for CleanCoverageStep {
    fn name(&self) -> &'static str {
        "clean-coverage"
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
        let storage = storage_or_default(args.storage)?;
        run_batch_step(input, args.active.active_layer.as_deref(), storage, progress, |defn| {
            let operation = Clean {
                strategy: args.merge_strategy,
            };
            GeosBatch::new(operation, defn, args.active.active_geometry.as_deref())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::vector::step::PipelineStep;
    use crate::test_utils::wkt_dataset;

    const OVERLAPPING: [&str; 3] = [
        "POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))",
        "POLYGON ((1 0, 4 0, 4 2, 1 2, 1 0))",
        "POLYGON ((4 0, 5 0, 5 2, 4 2, 4 0))",
    ];

    fn run(step: Box<dyn StepAlgorithm>, args: &[&str]) -> Result<Dataset> {
        let mut step = PipelineStep::new(step);
        step.parse_args(&args.iter().map(|s| s.to_string()).collect::<Vec<_>>())?;
        step.set_input(wkt_dataset("polys", GeometryType::Polygon, &OVERLAPPING));
        step.run_step(&mut Progress::none())?;
        step.take_output()
            .ok_or_else(|| GdalVecError::BadArgument("no output".into()))
    }

    #[test]
    fn test_check_coverage() -> Result<()> {
        let mut output = run(Box::<CheckCoverageStep>::default(), &[])?;
        let layer = output.layer(0)?;
        assert_eq!(layer.defn().geometry_type(), GeometryType::MultiLineString);
        let mut fids = Vec::new();
        while let Some(f) = layer.next_feature()? {
            assert_eq!(f.geometry().unwrap().geometry_type(), GeometryType::MultiLineString);
            fids.push(f.fid());
        }
        assert_eq!(fids, vec![Some(0), Some(1)]);

        let mut output = run(Box::<CheckCoverageStep>::default(), &["--include-valid"])?;
        assert_eq!(output.layer(0)?.feature_count(true)?, Some(3));
        Ok(())
    }

    #[test]
    fn test_clean_coverage_strategies() -> Result<()> {
        let areas = |args: &[&str]| -> Result<Vec<f64>> {
            let mut output = run(Box::<CleanCoverageStep>::default(), args)?;
            let layer = output.layer(0)?;
            let mut areas = Vec::new();
            while let Some(f) = layer.next_feature()? {
                areas.push(f.geometry().map_or(0.0, Geometry::area));
            }
            Ok(areas)
        };
        let min_index = areas(&[])?;
        assert!((min_index[0] - 4.0).abs() < 1e-9);
        assert!((min_index[1] - 4.0).abs() < 1e-9);
        let max_area = areas(&["--merge-strategy", "max-area"])?;
        assert!((max_area[0] - 2.0).abs() < 1e-9);
        assert!((max_area[1] - 6.0).abs() < 1e-9);
        assert!((max_area[2] - 2.0).abs() < 1e-9);
        assert!(areas(&["--merge-strategy", "biggest"]).is_err());
        Ok(())
    }

    #[test]
    fn test_lines_rejected() {
        let mut step = PipelineStep::new(Box::<CleanCoverageStep>::default());
        step.parse_args(&[]).unwrap();
        step.set_input(wkt_dataset("lines", GeometryType::LineString, &["LINESTRING (0 0, 1 1)"]));
        let err = step.run_step(&mut Progress::none()).unwrap_err();
        assert!(matches!(err, GdalVecError::InvalidGeometry { fid: Some(0), .. }));
        assert!(step.output().is_none());
    }
}
