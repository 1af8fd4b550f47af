use log::{debug, error, info};

use crate::config::report_error;
use crate::errors::*;
use crate::progress::Progress;
use crate::programs::vector::registry::StepRegistry;
use crate::programs::vector::step::{InputKind, PipelineStep};
use crate::vector::Dataset;

const SEPARATOR: &str = "!";

/// Split a step chain into per-step token groups.
///
/// Tokens are separated by whitespace. Single quotes keep their content
/// verbatim, double quotes honour backslash escapes, and a backslash outside
/// quotes escapes the next character. Only an unquoted `!` standing alone
/// separates steps; a quoted one is an ordinary argument.
pub fn tokenize(chain: &str) -> Result<Vec<Vec<String>>> {
    let mut groups = vec![Vec::new()];
    let mut token = String::new();
    // a token exists once something was quoted, even if it is empty
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = chain.chars();

    fn flush(groups: &mut Vec<Vec<String>>, token: &mut String, quoted: bool) {
        if !quoted && token.as_str() == SEPARATOR {
            groups.push(Vec::new());
        } else if let Some(group) = groups.last_mut() {
            group.push(std::mem::take(token));
        }
        token.clear();
    }

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    flush(&mut groups, &mut token, quoted);
                    in_token = false;
                    quoted = false;
                }
            }
            '\'' => {
                in_token = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => token.push(c),
                        None => {
                            return Err(GdalVecError::InvalidStepChain(
                                "unterminated single quote".to_string(),
                            ))
                        }
                    }
                }
            }
            '"' => {
                in_token = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => token.push(c),
                            Some(c) => {
                                token.push('\\');
                                token.push(c);
                            }
                            None => break,
                        },
                        Some(c) => token.push(c),
                        None => {
                            return Err(GdalVecError::InvalidStepChain(
                                "unterminated double quote".to_string(),
                            ))
                        }
                    }
                }
            }
            '\\' => {
                in_token = true;
                quoted = true;
                if let Some(c) = chars.next() {
                    token.push(c);
                }
            }
            c => {
                in_token = true;
                token.push(c);
            }
        }
    }
    if in_token {
        flush(&mut groups, &mut token, quoted);
    }
    Ok(groups)
}

/// Lifecycle of a [`VectorPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unparsed,
    Parsed,
    Executing,
    Done,
    Failed,
}

/// A chain of steps, from `read` to `write`.
///
/// Parsing resolves every step and validates the chain before anything is
/// opened. Running moves the output of each step into the input of the next;
/// the dataset left by the final `write` is available afterwards.
pub struct VectorPipeline {
    registry: StepRegistry,
    steps: Vec<PipelineStep>,
    state: PipelineState,
}

impl VectorPipeline {
    pub fn new() -> Self {
        Self::with_registry(StepRegistry::builtin())
    }

    pub fn with_registry(registry: StepRegistry) -> Self {
        VectorPipeline {
            registry,
            steps: Vec::new(),
            state: PipelineState::Unparsed,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Names of the parsed steps, in order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(PipelineStep::name).collect()
    }

    /// Parse a chain such as `read in.geojson ! buffer --distance 1 ! write out.geojson`.
    ///
    /// Step names and the chain structure are checked before any step parses
    /// its arguments. On error the pipeline stays unparsed.
    pub fn parse(&mut self, chain: &str) -> Result<()> {
        if self.state != PipelineState::Unparsed {
            return Err(GdalVecError::BadArgument(
                "pipeline has already been parsed".to_string(),
            ));
        }
        let groups = tokenize(chain)?;
        self.parse_groups(groups)
    }

    /// Parse a chain that was already split into per-step token groups,
    /// each starting with the step name.
    pub fn parse_groups(&mut self, groups: Vec<Vec<String>>) -> Result<()> {
        if self.state != PipelineState::Unparsed {
            return Err(GdalVecError::BadArgument(
                "pipeline has already been parsed".to_string(),
            ));
        }
        let mut steps = Vec::with_capacity(groups.len());
        let mut arguments = Vec::with_capacity(groups.len());
        for (i, group) in groups.into_iter().enumerate() {
            let mut tokens = group.into_iter();
            let name = tokens.next().ok_or_else(|| {
                GdalVecError::InvalidStepChain(format!("step {} is empty", i + 1))
            })?;
            steps.push(PipelineStep::new(self.registry.create(&name)?));
            arguments.push(tokens.collect::<Vec<_>>());
        }

        validate_structure(&steps)?;

        for (step, args) in steps.iter_mut().zip(&arguments) {
            debug!("{} {:?}", step.name(), args);
            step.parse_args(args)?;
        }

        check_same_dataset(&steps)?;

        self.steps = steps;
        self.state = PipelineState::Parsed;
        Ok(())
    }

    /// Run every step in order.
    ///
    /// The first failure stops the pipeline, is reported on the error
    /// channel and returned as is; a cancelled run returns
    /// [`GdalVecError::UserInterrupt`].
    pub fn run(&mut self, progress: &mut Progress) -> Result<()> {
        if self.state != PipelineState::Parsed {
            return Err(GdalVecError::BadArgument(format!(
                "pipeline cannot run in state {:?}",
                self.state
            )));
        }
        self.state = PipelineState::Executing;
        match self.run_steps(progress) {
            Ok(()) => {
                self.state = PipelineState::Done;
                Ok(())
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                if err.is_user_interrupt() {
                    info!("pipeline interrupted");
                } else {
                    error!("pipeline failed: {err}");
                }
                report_error(&err);
                Err(err)
            }
        }
    }

    fn run_steps(&mut self, progress: &mut Progress) -> Result<()> {
        let weights: Vec<f64> = self.steps.iter().map(step_weight).collect();
        let total: f64 = weights.iter().sum();
        let mut done = 0.0;
        for i in 0..self.steps.len() {
            if i > 0 {
                // the previous step's output moves on; only the last one stays published
                if let Some(dataset) = self.steps[i - 1].take_output() {
                    self.steps[i].set_input(dataset);
                }
            }
            let start = done / total;
            done += weights[i];
            let step = &mut self.steps[i];
            info!("running step '{}'", step.name());
            step.run_step(&mut progress.scaled(start, done / total))?;
        }
        progress.report(1.0, "")?;
        Ok(())
    }

    /// Dataset published by the final step, once the pipeline is done.
    pub fn output_dataset(&self) -> Option<&Dataset> {
        self.steps.last().and_then(PipelineStep::output)
    }

    pub fn output_dataset_mut(&mut self) -> Option<&mut Dataset> {
        self.steps.last_mut().and_then(PipelineStep::output_mut)
    }

    pub fn take_output(&mut self) -> Option<Dataset> {
        self.steps.last_mut().and_then(PipelineStep::take_output)
    }
}

impl Default for VectorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of the overall progress given to a step. Streaming steps only wrap
/// their input; the work happens where features are drained.
fn step_weight(step: &PipelineStep) -> f64 {
    let algorithm = step.algorithm();
    if algorithm.output_path().is_some() || !algorithm.is_natively_streaming_compatible() {
        1.0
    } else {
        0.1
    }
}

fn validate_structure(steps: &[PipelineStep]) -> Result<()> {
    if steps.len() < 2 {
        return Err(GdalVecError::InvalidStepChain(
            "at least 'read' and 'write' steps are required".to_string(),
        ));
    }
    let last = steps.len() - 1;
    for (i, step) in steps.iter().enumerate() {
        match step.name() {
            "read" if i != 0 => {
                return Err(GdalVecError::InvalidStepChain(
                    "'read' is only allowed as the first step".to_string(),
                ))
            }
            "write" if i != last => {
                return Err(GdalVecError::InvalidStepChain(
                    "'write' is only allowed as the last step".to_string(),
                ))
            }
            _ => {}
        }
    }
    if steps[0].name() != "read" {
        return Err(GdalVecError::InvalidStepChain(
            "the first step must be 'read'".to_string(),
        ));
    }
    if steps[last].name() != "write" {
        return Err(GdalVecError::InvalidStepChain(
            "the last step must be 'write'".to_string(),
        ));
    }
    if steps[1..].iter().any(|s| s.algorithm().input_kind() == InputKind::None) {
        return Err(GdalVecError::InvalidStepChain(
            "only the first step may produce a dataset from nothing".to_string(),
        ));
    }
    Ok(())
}

/// Refuse to overwrite the dataset being read.
fn check_same_dataset(steps: &[PipelineStep]) -> Result<()> {
    let input = steps.first().and_then(|s| s.algorithm().input_path());
    let output = steps.last().and_then(|s| s.algorithm().output_path());
    if let (Some(input), Some(output)) = (input, output) {
        let same = match (input.canonicalize(), output.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => input == output,
        };
        if same {
            return Err(GdalVecError::InvalidStepChain(format!(
                "'{}' cannot be both read and written",
                input.display()
            )));
        }
    }
    Ok(())
}
