#![forbid(unsafe_code)]

//! Weaves monitor state into a contract without touching its behavior.
//!
//! Every public entry point `fn` is split into an internal body carrier
//! `__impl_fn` (the original body, byte for byte) and a fresh public wrapper
//! with the original signature. The wrapper is the single entry and single
//! exit of the transaction: prologue (call flags, pre-state snapshots),
//! the carried body, then the epilogue (guard write, read pass, update pass,
//! assertion). Explicit `return`s inside the body leave only the carrier,
//! never the wrapper, so every path crosses exactly one prologue and one
//! epilogue.

mod emit;
mod plan;

pub use emit::instrument;
pub use plan::{Plan, Snapshot};

use miette::Diagnostic;
use thiserror::Error;

/// Name of the implicitly bound deployment-guard atom and state variable.
pub const GUARD_VAR: &str = "notConstructor";

#[derive(Debug, Error, Diagnostic)]
#[error("instrumentation error: {message}")]
#[diagnostic(code(tempo::instrument))]
pub struct InstrumentationError {
    pub message: String,
    /// The public function that could not be routed, when known.
    pub function: Option<String>,
}

impl InstrumentationError {
    pub(crate) fn in_fn(function: &str, message: impl Into<String>) -> Self {
        Self {
            message: format!("{} (in function '{function}')", message.into()),
            function: Some(function.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct InstrumentOptions {
    /// Emit the assertion form the symbolic executor understands instead of
    /// the bounded verifier's plain `assert`.
    pub for_symbolic_exec: bool,
}
