#![forbid(unsafe_code)]

//! Back-end checkers as opaque subprocesses.
//!
//! Two variants share one capability: hand them an instrumented source file
//! and get back raw textual output, which [`Backend::interpret`] turns into a
//! verdict. The bounded verifier is the primary back-end; the symbolic
//! executor is a configuration-selected alternative, never a fallback the
//! driver picks on its own.

mod invoke;
mod trace;

pub use invoke::{run_supervised, InvokeResult, RawOutput};
pub use trace::{format_trace, parse_trace, FailingSite, Trace, TraceStep};

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Output phrase the verifier prints on a successful proof.
const PROOF_PHRASE: &str = "Proof found";
/// Output phrases announcing a counter-example.
const CE_PHRASES: [&str; 2] = ["Found a counterexample", "ASSERTION FAILS"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Verifier,
    SymbolicExec,
}

impl BackendKind {
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Verifier => "verifier",
            BackendKind::SymbolicExec => "symbolic executor",
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerifierConfig {
    pub command: String,
    /// Max transaction-sequence length to explore.
    pub tx_bound: u32,
    /// Modular-integer mode, for overflow hunting.
    pub modular_arithmetic: bool,
    pub timeout: Option<Duration>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            command: "VeriSol".to_string(),
            tx_bound: 5,
            modular_arithmetic: false,
            timeout: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SymbolicConfig {
    pub command: String,
    /// Parallel workers.
    pub procs: u32,
    /// Number of simulated callers.
    pub accounts: u32,
    /// Initial per-account balance, in wei.
    pub initial_balance: u64,
    pub timeout: Option<Duration>,
}

impl Default for SymbolicConfig {
    fn default() -> Self {
        Self {
            command: "manticore".to_string(),
            procs: 1,
            accounts: 2,
            initial_balance: 100,
            timeout: None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Backend {
    Verifier(VerifierConfig),
    SymbolicExec(SymbolicConfig),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Verifier(_) => BackendKind::Verifier,
            Backend::SymbolicExec(_) => BackendKind::SymbolicExec,
        }
    }

    /// Run the checker on `source`, blocking until it finishes or the
    /// configured wall-clock limit passes. `ctor_args` is the constructor
    /// argument list to forward, parenthesized, when the config carries one.
    pub fn invoke(
        &self,
        source: &Path,
        contract: &str,
        ctor_args: Option<&str>,
    ) -> Result<InvokeResult, BackendSpawnError> {
        let (mut cmd, timeout) = match self {
            Backend::Verifier(cfg) => {
                let mut cmd = Command::new(&cfg.command);
                cmd.arg(source).arg(contract);
                cmd.arg(format!("/txBound:{}", cfg.tx_bound));
                if cfg.modular_arithmetic {
                    cmd.arg("/useModularArithmetic");
                }
                (cmd, cfg.timeout)
            }
            Backend::SymbolicExec(cfg) => {
                let mut cmd = Command::new(&cfg.command);
                cmd.arg(source);
                cmd.arg("--contract").arg(contract);
                cmd.arg(format!("--core.procs={}", cfg.procs));
                cmd.arg(format!("--evm.accounts={}", cfg.accounts));
                cmd.arg(format!("--evm.balance={}", cfg.initial_balance));
                (cmd, cfg.timeout)
            }
        };
        if let Some(args) = ctor_args {
            cmd.arg(format!("--ctor-args={args}"));
        }
        run_supervised(cmd, timeout).map_err(|e| BackendSpawnError {
            command: self.command_name().to_string(),
            source: e,
        })
    }

    pub fn command_name(&self) -> &str {
        match self {
            Backend::Verifier(cfg) => &cfg.command,
            Backend::SymbolicExec(cfg) => &cfg.command,
        }
    }

    /// Decide the verdict from the checker's raw output. Counter-example
    /// phrases win over the proof phrase; output carrying neither is
    /// malformed.
    pub fn interpret(&self, raw: &RawOutput) -> Result<Verdict, BackendOutputError> {
        if CE_PHRASES.iter().any(|p| raw.stdout.contains(p)) {
            let trace = parse_trace(&raw.stdout)?;
            return Ok(Verdict::CounterExample(trace));
        }
        if raw.stdout.contains(PROOF_PHRASE) {
            return Ok(Verdict::Proven);
        }
        Err(BackendOutputError {
            message: format!(
                "{} printed neither a proof nor a counterexample (exit {:?})",
                self.kind().label(),
                raw.status
            ),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Proven,
    CounterExample(Trace),
}

#[derive(Debug, Error, Diagnostic)]
#[error("cannot run back-end '{command}'")]
#[diagnostic(code(tempo::backend::spawn))]
pub struct BackendSpawnError {
    pub command: String,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error, Diagnostic)]
#[error("unusable back-end output: {message}")]
#[diagnostic(code(tempo::backend::output))]
pub struct BackendOutputError {
    pub message: String,
}
