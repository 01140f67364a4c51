#![forbid(unsafe_code)]

//! Run orchestration: parse the properties, instrument the contract, invoke
//! the configured back-end, and iterate on vacuous counter-examples.
//!
//! The pipeline is sequential by design. The only concurrency lives inside
//! the back-end subprocess; the driver blocks on it with the instrumented
//! source fully written beforehand and all output drained before any verdict
//! is produced.

mod state;
mod workdir;

pub use state::{Controller, Decision, State};
pub use workdir::Workdir;

use std::fs;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use tempo_backend::{
    Backend, BackendOutputError, BackendSpawnError, InvokeResult, Trace, Verdict,
};
use tempo_instrument::{instrument, InstrumentOptions, InstrumentationError};
use tempo_monitor::synthesize_all;
use tempo_parse::{parse_formula, ParseError};
use tempo_sol::{read_contract, UnsupportedContract};

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub source_path: PathBuf,
    /// Contract to verify; `None` picks the first declaration in the file.
    pub contract_name: Option<String>,
    /// Constructor arguments forwarded to the back-end, parenthesized.
    pub ctor_args: Option<String>,
    /// PTLTL predicate strings.
    pub predicates: Vec<String>,
    pub instrument: bool,
    pub for_symbolic_exec: bool,
    pub backend: Backend,
    pub cleanup: bool,
    pub suppress_noops: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Proven,
    /// `vacuous` marks a constructor-shaped trace that survived the guard
    /// rewrite; it is printed like any counter-example but exits differently.
    CounterExample { trace: Trace, vacuous: bool },
    /// Wall-clock limit hit; the last counter-example seen, if any.
    Exhausted { last: Option<Trace> },
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Proven => 0,
            Outcome::CounterExample { vacuous: false, .. } => 1,
            Outcome::CounterExample { vacuous: true, .. } => 2,
            Outcome::Exhausted { .. } => 3,
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub outcome: Outcome,
    /// Raw stdout of each back-end invocation, in order.
    pub backend_output: Vec<String>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum DriverError {
    #[error("cannot read contract source '{path}'")]
    #[diagnostic(code(tempo::driver::source))]
    Source {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Contract(#[from] UnsupportedContract),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Instrument(#[from] InstrumentationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Spawn(#[from] BackendSpawnError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Output(#[from] BackendOutputError),

    #[error("cannot prepare the working directory")]
    #[diagnostic(code(tempo::driver::workdir))]
    Workdir(#[source] std::io::Error),
}

/// Drive one verification run to a terminal outcome.
pub fn run(cfg: &RunConfig) -> Result<RunOutcome, DriverError> {
    let source = fs::read_to_string(&cfg.source_path).map_err(|e| DriverError::Source {
        path: cfg.source_path.display().to_string(),
        source: e,
    })?;

    let mut formulas = Vec::new();
    for p in &cfg.predicates {
        formulas.push(parse_formula(p)?);
    }

    let contract = read_contract(&source, cfg.contract_name.as_deref())?;
    let file_name = cfg
        .source_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("contract.sol")
        .to_string();

    let workdir = Workdir::create(cfg.cleanup).map_err(DriverError::Workdir)?;
    let mut controller = Controller::new(formulas);
    let mut backend_output = Vec::new();
    let mut last_trace: Option<Trace> = None;

    loop {
        let current = controller.start().to_vec();
        let text = if cfg.instrument && !current.is_empty() {
            let set = synthesize_all(&current);
            let opts = InstrumentOptions {
                for_symbolic_exec: cfg.for_symbolic_exec,
            };
            instrument(&source, &contract, &set, &opts)?
        } else {
            source.clone()
        };
        let path = workdir
            .write_source(&file_name, &text)
            .map_err(DriverError::Workdir)?;

        let raw = match cfg
            .backend
            .invoke(&path, &contract.name, cfg.ctor_args.as_deref())?
        {
            InvokeResult::TimedOut => {
                controller.on_timeout();
                return Ok(RunOutcome {
                    outcome: Outcome::Exhausted { last: last_trace },
                    backend_output,
                });
            }
            InvokeResult::Completed(raw) => raw,
        };
        backend_output.push(raw.stdout.clone());

        match cfg.backend.interpret(&raw)? {
            Verdict::Proven => {
                controller.on_proof();
                return Ok(RunOutcome {
                    outcome: Outcome::Proven,
                    backend_output,
                });
            }
            Verdict::CounterExample(trace) => {
                let trace = if cfg.suppress_noops {
                    trace.without_noops()
                } else {
                    trace
                };
                let in_ctor = failing_in_constructor(&text, &contract.name, &trace);
                last_trace = Some(trace.clone());
                match controller.on_counterexample(trace, in_ctor) {
                    Decision::Retry => continue,
                    Decision::Stop { trace, vacuous } => {
                        return Ok(RunOutcome {
                            outcome: Outcome::CounterExample { trace, vacuous },
                            backend_output,
                        });
                    }
                }
            }
        }
    }
}

/// Whether the failing assertion site falls inside the constructor body of
/// the instrumented source the back-end actually saw.
fn failing_in_constructor(instrumented: &str, contract_name: &str, trace: &Trace) -> bool {
    let Some(site) = &trace.failing else {
        return false;
    };
    let Ok(c) = read_contract(instrumented, Some(contract_name)) else {
        return false;
    };
    let Some(ctor) = c.constructor() else {
        return false;
    };
    let start = line_of(instrumented, ctor.body_span.offset());
    let end = line_of(instrumented, ctor.body_span.offset() + ctor.body_span.len());
    (start..=end).contains(&site.line)
}

fn line_of(src: &str, offset: usize) -> u32 {
    src[..offset.min(src.len())]
        .bytes()
        .filter(|b| *b == b'\n')
        .count() as u32
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_outcome() {
        assert_eq!(Outcome::Proven.exit_code(), 0);
        let trace = Trace {
            steps: Vec::new(),
            failing: None,
        };
        assert_eq!(
            Outcome::CounterExample {
                trace: trace.clone(),
                vacuous: false
            }
            .exit_code(),
            1
        );
        assert_eq!(
            Outcome::CounterExample {
                trace,
                vacuous: true
            }
            .exit_code(),
            2
        );
        assert_eq!(Outcome::Exhausted { last: None }.exit_code(), 3);
    }

    #[test]
    fn line_numbers_are_one_based() {
        let src = "a\nb\nc\n";
        assert_eq!(line_of(src, 0), 1);
        assert_eq!(line_of(src, 2), 2);
        assert_eq!(line_of(src, 4), 3);
    }
}
