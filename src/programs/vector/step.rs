use std::path::{Path, PathBuf};

use log::{debug, info};
use structopt::StructOpt;

use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::steps::{ReadStep, WriteStep};
use crate::vector::{Dataset, Layer};

/// What a step consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// The step produces a dataset from nothing (`read`).
    None,
    /// The step consumes the dataset of the previous step.
    Dataset,
}

/// A pipeline step variant.
///
/// Implementations keep a snapshot of their parsed arguments and hand copies
/// of it to the layers they build, so arguments never change under a running
/// layer.
pub trait StepAlgorithm {
    fn name(&self) -> &'static str;

    /// Parse the arguments following the step name in a chain.
    fn parse_args(&mut self, args: &[String]) -> Result<()>;

    fn input_kind(&self) -> InputKind {
        InputKind::Dataset
    }

    /// Whether the step wraps its input in decorators rather than
    /// materializing it.
    fn is_natively_streaming_compatible(&self) -> bool {
        true
    }

    /// Build the output dataset. `input` is `Some` exactly when
    /// [`StepAlgorithm::input_kind`] is [`InputKind::Dataset`].
    fn run_step(&mut self, input: Option<Dataset>, progress: &mut Progress) -> Result<Dataset>;

    /// Path read by the step, for same-dataset hazard checks.
    fn input_path(&self) -> Option<&Path> {
        None
    }

    /// Path written by the step, for same-dataset hazard checks.
    fn output_path(&self) -> Option<&Path> {
        None
    }
}

/// Input and output arguments of a step run on its own.
#[derive(Debug, Clone, Default, StructOpt)]
pub struct StandaloneIo {
    /// Input dataset
    #[structopt(parse(from_os_str))]
    pub input: PathBuf,

    /// Output dataset
    #[structopt(parse(from_os_str))]
    pub output: PathBuf,

    /// Input format, detected from the file when unset
    #[structopt(long = "if")]
    pub input_format: Option<String>,

    /// Input layer name, may be repeated
    #[structopt(long = "input-layer", number_of_values = 1)]
    pub input_layers: Vec<String>,

    /// Open option KEY=VALUE, may be repeated
    #[structopt(long = "oo", number_of_values = 1)]
    pub open_options: Vec<String>,

    /// Output format, detected from the extension when unset
    #[structopt(long = "of")]
    pub output_format: Option<String>,

    #[structopt(long)]
    pub overwrite: bool,

    /// Output layer name
    #[structopt(long)]
    pub output_layer: Option<String>,

    /// Creation option KEY=VALUE, may be repeated
    #[structopt(long = "co", number_of_values = 1)]
    pub creation_options: Vec<String>,
}

impl StandaloneIo {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Self {
        StandaloneIo {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Arguments of the implicit `read` step. Only options that were set are
    /// passed on.
    fn read_args(&self) -> Vec<String> {
        let mut args = vec![self.input.display().to_string()];
        if let Some(format) = &self.input_format {
            args.extend(["--if".to_string(), format.clone()]);
        }
        for layer in &self.input_layers {
            args.extend(["--layer".to_string(), layer.clone()]);
        }
        for option in &self.open_options {
            args.extend(["--oo".to_string(), option.clone()]);
        }
        args
    }

    /// Arguments of the implicit `write` step.
    fn write_args(&self) -> Vec<String> {
        let mut args = vec![self.output.display().to_string()];
        if let Some(format) = &self.output_format {
            args.extend(["--of".to_string(), format.clone()]);
        }
        if self.overwrite {
            args.push("--overwrite".to_string());
        }
        if let Some(layer) = &self.output_layer {
            args.extend(["--output-layer".to_string(), layer.clone()]);
        }
        for option in &self.creation_options {
            args.extend(["--co".to_string(), option.clone()]);
        }
        args
    }
}

/// A step with its dataset slots.
///
/// A chained step consumes the dataset placed in its input slot and publishes
/// one in its output slot. A standalone step reads its input and writes its
/// output itself, through throwaway `read` and `write` steps.
pub struct PipelineStep {
    algorithm: Box<dyn StepAlgorithm>,
    input: Option<Dataset>,
    output: Option<Dataset>,
    standalone: Option<StandaloneIo>,
}

impl PipelineStep {
    pub fn new(algorithm: Box<dyn StepAlgorithm>) -> Self {
        PipelineStep {
            algorithm,
            input: None,
            output: None,
            standalone: None,
        }
    }

    pub fn standalone(algorithm: Box<dyn StepAlgorithm>, io: StandaloneIo) -> Self {
        PipelineStep {
            standalone: Some(io),
            ..Self::new(algorithm)
        }
    }

    pub fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone.is_some()
    }

    pub fn algorithm(&self) -> &dyn StepAlgorithm {
        self.algorithm.as_ref()
    }

    pub fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.algorithm.parse_args(args)
    }

    pub fn set_input(&mut self, dataset: Dataset) {
        self.input = Some(dataset);
    }

    pub fn output(&self) -> Option<&Dataset> {
        self.output.as_ref()
    }

    pub fn output_mut(&mut self) -> Option<&mut Dataset> {
        self.output.as_mut()
    }

    pub fn take_output(&mut self) -> Option<Dataset> {
        self.output.take()
    }

    /// Run the algorithm on the input slot and publish its result.
    ///
    /// On failure the output slot stays empty.
    pub fn run_step(&mut self, progress: &mut Progress) -> Result<()> {
        if self.output.is_some() {
            return Err(GdalVecError::BadArgument(format!(
                "step '{}' has already published its output",
                self.name()
            )));
        }
        let input = match self.algorithm.input_kind() {
            InputKind::None => None,
            InputKind::Dataset => Some(self.input.take().ok_or_else(|| {
                GdalVecError::BadArgument(format!("step '{}' has no input dataset", self.name()))
            })?),
        };
        debug!("running step '{}'", self.name());
        let output = self.algorithm.run_step(input, progress)?;
        self.output = Some(output);
        Ok(())
    }

    /// Run the step, reading and writing on its own when standalone.
    pub fn execute(&mut self, progress: &mut Progress) -> Result<()> {
        let Some(io) = self.standalone.clone() else {
            return self.run_step(progress);
        };
        info!(
            "{} '{}' -> '{}'",
            self.name(),
            io.input.display(),
            io.output.display()
        );

        let mut read = PipelineStep::new(Box::<ReadStep>::default());
        read.parse_args(&io.read_args())?;
        let mut write = PipelineStep::new(Box::<WriteStep>::default());
        write.parse_args(&io.write_args())?;

        let process_end = if self.algorithm.is_natively_streaming_compatible() {
            0.1
        } else {
            0.5
        };
        read.run_step(&mut progress.scaled(0.0, 0.05))?;
        self.input = read.take_output();
        self.run_step(&mut progress.scaled(0.05, process_end))?;
        if let Some(processed) = self.output.take() {
            write.set_input(processed);
        }
        write.run_step(&mut progress.scaled(process_end, 1.0))?;
        self.output = write.take_output();
        Ok(())
    }
}

/// Parse step arguments into a structopt struct. The step name stands in for
/// the program name.
pub(crate) fn parse_step_args<T: StructOpt>(step: &str, args: &[String]) -> Result<T> {
    T::from_iter_safe(std::iter::once(step.to_string()).chain(args.iter().cloned()))
        .map_err(|e| GdalVecError::BadArgument(format!("{step}: {}", e.message)))
}

/// The arguments of a step, failing when they were never parsed.
pub(crate) fn parsed<'a, T>(args: &'a Option<T>, step: &str) -> Result<&'a T> {
    args.as_ref()
        .ok_or_else(|| GdalVecError::BadArgument(format!("arguments of step '{step}' were not parsed")))
}

/// The input dataset of a consuming step.
pub(crate) fn required_input(input: Option<Dataset>, step: &str) -> Result<Dataset> {
    input.ok_or_else(|| GdalVecError::BadArgument(format!("step '{step}' has no input dataset")))
}

/// Build a dataset whose layers are `f` applied to the layers of `input`.
///
/// With `active_layer` set, only the layer of that name is passed to `f`; the
/// others are forwarded unchanged.
pub fn map_layers<F>(input: Dataset, active_layer: Option<&str>, mut f: F) -> Result<Dataset>
where
    F: FnMut(Box<dyn Layer>) -> Result<Box<dyn Layer>>,
{
    let mut output = Dataset::new(input.description());
    let mut matched = active_layer.is_none();
    for layer in input.into_layers() {
        let active = active_layer.map_or(true, |name| layer.name().eq_ignore_ascii_case(name));
        if active {
            matched = true;
            output.add_layer(f(layer)?);
        } else {
            output.add_layer(layer);
        }
    }
    if !matched {
        return Err(GdalVecError::LayerNotFound(
            active_layer.unwrap_or_default().to_string(),
        ));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::vector::steps::SwapXyStep;
    use crate::test_utils::{wkt_dataset, wkt_layer};
    use crate::vector::{Geometry, GeometryType};

    #[test]
    fn test_run_step_slots() -> Result<()> {
        let mut step = PipelineStep::new(Box::<SwapXyStep>::default());
        step.parse_args(&[])?;
        // no input yet
        assert!(step.run_step(&mut Progress::none()).is_err());
        assert!(step.output().is_none());

        step.set_input(wkt_dataset("pts", GeometryType::Point, &["POINT (1 2)"]));
        step.run_step(&mut Progress::none())?;
        let layer = step.output_mut().unwrap().layer(0)?;
        let feature = layer.next_feature()?.unwrap();
        assert_eq!(feature.fid(), Some(0));
        assert_eq!(feature.geometry(), Some(&Geometry::from_wkt("POINT (2 1)")?));
        // published once
        step.set_input(wkt_dataset("pts", GeometryType::Point, &["POINT (1 2)"]));
        assert!(step.run_step(&mut Progress::none()).is_err());
        Ok(())
    }

    #[test]
    fn test_map_layers_active_layer() -> Result<()> {
        let mut input = Dataset::new("mem");
        input.add_layer(Box::new(wkt_layer("a", GeometryType::Point, &["POINT (1 2)"])));
        input.add_layer(Box::new(wkt_layer("b", GeometryType::Point, &["POINT (3 4)"])));
        let mut seen = Vec::new();
        let output = map_layers(input, Some("b"), |layer| {
            seen.push(layer.name().to_string());
            Ok(layer)
        })?;
        assert_eq!(seen, vec!["b"]);
        assert_eq!(output.layer_names(), vec!["a", "b"]);

        let input = wkt_dataset("a", GeometryType::Point, &[]);
        assert!(matches!(
            map_layers(input, Some("zz"), Ok),
            Err(GdalVecError::LayerNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_standalone_args() {
        let mut io = StandaloneIo::new("in.geojson", "out.geojson");
        assert_eq!(io.read_args(), vec!["in.geojson"]);
        io.input_layers.push("roads".into());
        io.overwrite = true;
        io.output_format = Some("GeoJSON".into());
        assert_eq!(io.read_args(), vec!["in.geojson", "--layer", "roads"]);
        assert_eq!(
            io.write_args(),
            vec!["out.geojson", "--of", "GeoJSON", "--overwrite"]
        );
    }
}
