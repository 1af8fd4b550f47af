use std::path::{Path, PathBuf};

use log::info;
use structopt::StructOpt;

use crate::cpl::CslStringList;
use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::step::{parse_step_args, parsed, InputKind, StepAlgorithm};
use crate::vector::Dataset;

#[derive(Debug, Clone, StructOpt)]
struct ReadArgs {
    /// Input dataset
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Input format, detected from the file when unset
    #[structopt(long = "if")]
    input_format: Option<String>,

    /// Layer to read, may be repeated. All layers when unset
    #[structopt(long, number_of_values = 1)]
    layer: Vec<String>,

    /// Open option KEY=VALUE, may be repeated
    #[structopt(long = "oo", number_of_values = 1)]
    open_options: Vec<String>,
}

/// `read`: open a dataset. Always the first step of a pipeline.
#[derive(Debug, Default)]
pub struct ReadStep {
    args: Option<ReadArgs>,
}

impl StepAlgorithm for ReadStep {
    fn name(&self) -> &'static str {
        "read"
    }

    fn parse_args(&mut self, args: &[String]) -> Result<()> {
        self.args = Some(parse_step_args(self.name(), args)?);
        Ok(())
    }

    fn input_kind(&self) -> InputKind {
        InputKind::None
    }

    fn run_step(&mut self, _input: Option<Dataset>, progress: &mut Progress) -> Result<Dataset> {
        let args = parsed(&self.args, self.name())?;
        let open_options = CslStringList::try_from(args.open_options.as_slice())?;
        info!("reading '{}'", args.input.display());
        let mut dataset =
            Dataset::open_ex(&args.input, args.input_format.as_deref(), &open_options)?;
        if !args.layer.is_empty() {
            dataset.retain_layers(&args.layer)?;
        }
        progress.report(1.0, "")?;
        Ok(dataset)
    }

    fn input_path(&self) -> Option<&Path> {
        self.args.as_ref().map(|a| a.input.as_path())
    }
}
