use std::path::{Path, PathBuf};

use log::{debug, info};
use structopt::StructOpt;

use crate::cpl::CslStringList;
use crate::driver::DriverManager;
use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::step::{parse_step_args, parsed, required_input, StepAlgorithm};
use crate::vector::{Dataset, Layer};

#[derive(Debug, Clone, StructOpt)]
struct WriteArgs {
    /// Output dataset
    #[structopt(parse(from_os_str))]
    output: PathBuf,

    /// Output format, detected from the extension when unset
    #[structopt(long = "of")]
    output_format: Option<String>,

    /// Replace an existing output
    #[structopt(long)]
    overwrite: bool,

    /// Output layer name, only with a single input layer
    #[structopt(long)]
    output_layer: Option<String>,

    /// Creation option KEY=VALUE, may be repeated
    #[structopt(long = "co", number_of_values = 1)]
    creation_options: Vec<String>,
}

/// `write`: drain every layer of the input into a new dataset. Always the
/// last step of a pipeline.
///
/// The output dataset of the step is the written dataset as the driver gives
/// it back.
#[derive(Debug, Default)]
pub struct WriteStep {
    args: Option<WriteArgs>,
}

impl StepAlgorithm for WriteStep {
    fn name(&self) -> &'static str {
        "write"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn run_step(&mut self, input: Option<Dataset>, progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let mut input = required_input(input, self.name())?;

        let manager = DriverManager::new();
        let driver = match &args.output_format {
            Some(name) => manager.get_driver_by_name(name)?,
            None => manager
                .get_output_driver_for_dataset_name(&args.output)
                .ok_or_else(|| GdalVecError::DriverNotFound(args.output.display().to_string()))?,
        };
        if args.output_layer.is_some() && input.layer_count() > 1 {
            return Err(GdalVecError::BadArgument(
                "--output-layer can only be used with a single input layer".to_string(),
            ));
        }
        if driver.short_name() != "MEM" && args.output.exists() {
            if !args.overwrite {
                return Err(GdalVecError::OutputExists(args.output.display().to_string()));
            }
            debug!("removing existing '{}'", args.output.display());
            std::fs::remove_file(&args.output)?;
        }

        let creation_options = CslStringList::try_from(args.creation_options.as_slice())?;
        info!("writing '{}' with {}", args.output.display(), driver.short_name());
        let mut writer = driver.create(&args.output, &creation_options)?;

        let layer_count = input.layer_count().max(1);
        for (i, layer) in input.layers_mut().enumerate() {
            let name = args.output_layer.as_deref().unwrap_or(layer.name()).to_string();
            let idx = writer.copy_layer_schema(&name, layer.defn(), None)?;
            let total = layer.feature_count(false)?;
            let mut layer_progress = progress.scaled(
                i as f64 / layer_count as f64,
                (i + 1) as f64 / layer_count as f64,
            );
            layer.reset_reading();
            let mut written = 0u64;
            while let Some(feature) = layer.next_feature()? {
                writer.write_feature(idx, feature)?;
                written += 1;
                let fraction = match total {
                    Some(total) if total > 0 => written as f64 / total as f64,
                    _ => 0.0,
                };
                layer_progress.report(fraction, "")?;
            }
            debug!("{name}: wrote {written} features");
        }
        let output = writer.finish()?;
        progress.report(1.0, "")?;
        Ok(output)
    }

    fn output_path(&self) -> Option<&Path> {
        self.args.as_ref().map(|a| a.output.as_path())
    }
}
