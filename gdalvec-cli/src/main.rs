use std::io::Write;

use anyhow::{bail, Context, Result};
use gdalvec::programs::vector::{
    tokenize, PipelineStep, StandaloneIo, StepRegistry, VectorPipeline,
};
use gdalvec::progress::Progress;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use structopt::clap::AppSettings;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "gdalvec", about = "Vector processing pipelines")]
struct Cli {
    #[structopt(long, default_value = "Warn")]
    log_level: LevelFilter,

    /// Print progress on stderr
    #[structopt(long)]
    progress: bool,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Run a chain of steps: "read in.geojson ! buffer --distance 1 ! write out.geojson"
    Pipeline {
        /// The chain, as one quoted argument or as separate words
        #[structopt(required = true, allow_hyphen_values = true)]
        chain: Vec<String>,
    },

    /// Run a single step, reading its input and writing its output
    #[structopt(setting = AppSettings::TrailingVarArg)]
    Run {
        /// Step name, see `gdalvec steps`
        step: String,

        #[structopt(flatten)]
        io: StandaloneIo,

        /// Arguments of the step
        #[structopt(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List the available steps
    Steps,
}

/// Step groups of a chain given on the command line.
///
/// A single argument is tokenized like a shell would; separate words were
/// already split by the shell and are only grouped at `!`.
fn chain_groups(chain: &[String]) -> Result<Vec<Vec<String>>> {
    if let [single] = chain {
        return Ok(tokenize(single)?);
    }
    let mut groups = vec![Vec::new()];
    for word in chain {
        if word == "!" {
            groups.push(Vec::new());
        } else if let Some(group) = groups.last_mut() {
            group.push(word.clone());
        }
    }
    Ok(groups)
}

/// GDAL style terminal progress: `0...10...20...` up to `100 - done.`
fn term_progress() -> impl FnMut(f64, &str) -> bool {
    let mut last_tick = -1i32;
    move |fraction: f64, _msg: &str| {
        let tick = (fraction * 40.0).floor() as i32;
        let mut stderr = std::io::stderr();
        while last_tick < tick {
            last_tick += 1;
            let _ = if last_tick % 4 == 0 {
                write!(stderr, "{}", last_tick / 4 * 10)
            } else {
                write!(stderr, ".")
            };
        }
        if last_tick >= 40 {
            let _ = writeln!(stderr, " - done.");
            last_tick = 41;
        }
        let _ = stderr.flush();
        true
    }
}

fn run() -> Result<()> {
    let args = Cli::from_args();

    SimpleLogger::new().with_level(args.log_level).init()?;

    let mut callback = term_progress();
    let mut progress = if args.progress {
        Progress::new(&mut callback)
    } else {
        Progress::none()
    };

    match args.cmd {
        Command::Pipeline { chain } => {
            let mut pipeline = VectorPipeline::new();
            pipeline
                .parse_groups(chain_groups(&chain)?)
                .context("invalid pipeline")?;
            info!("steps: {}", pipeline.step_names().join(" ! "));
            pipeline.run(&mut progress)?;
        }
        Command::Run { step, io, args } => {
            let registry = StepRegistry::builtin();
            if step == "read" || step == "write" {
                bail!("'{step}' can only be used in a pipeline");
            }
            let algorithm = registry
                .create(&step)
                .context("see `gdalvec steps` for the available steps")?;
            let mut step = PipelineStep::standalone(algorithm, io);
            step.parse_args(&args)?;
            step.execute(&mut progress)?;
        }
        Command::Steps => {
            for name in StepRegistry::builtin().names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
