#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use tempo_backend::{Backend, SymbolicConfig, VerifierConfig};
use tempo_driver::RunConfig;

#[derive(Debug, Error, Diagnostic)]
#[error("configuration error: {message}")]
#[diagnostic(code(tempo::config))]
pub struct ConfigError {
    pub message: String,
}

fn err(message: impl Into<String>) -> ConfigError {
    ConfigError {
        message: message.into(),
    }
}

/// The recognized configuration surface. Unknown keys pass through silently;
/// missing required keys are errors at resolution time, not parse time.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    contract: ContractSection,
    #[serde(default)]
    output: OutputSection,
    #[serde(default)]
    instrumentation: InstrumentationSection,
    #[serde(default)]
    verification: VerificationSection,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractSection {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    /// Constructor arguments as a parenthesized list.
    #[serde(default)]
    args: Option<String>,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputSection {
    #[serde(default)]
    verbose: bool,
    #[serde(default = "default_true")]
    cleanup: bool,
    /// Drop consecutive identical transactions from reported traces.
    #[serde(default)]
    suppress_noops: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            verbose: false,
            cleanup: true,
            suppress_noops: false,
        }
    }
}

#[allow(dead_code)]
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentationSection {
    #[serde(default = "default_true")]
    instrument: bool,
    #[serde(default)]
    for_symbolic_exec: bool,
    /// Host-language compiler invocation, for version pinning. Recorded but
    /// not acted on here: the back-ends drive their own compiler.
    #[serde(default)]
    compiler_command: Option<String>,
    #[serde(default)]
    predicates: Vec<String>,
}

impl Default for InstrumentationSection {
    fn default() -> Self {
        Self {
            instrument: true,
            for_symbolic_exec: false,
            compiler_command: None,
            predicates: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerificationSection {
    #[serde(default)]
    verifier: VerifierSection,
    #[serde(default)]
    symbolic_exec: SymbolicSection,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifierSection {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    tx_bound: Option<u32>,
    #[serde(default)]
    modular_arithmetic: bool,
    /// Wall-clock limit in seconds.
    #[serde(default)]
    timeout: Option<u64>,
}

impl Default for VerifierSection {
    fn default() -> Self {
        Self {
            enabled: true,
            command: None,
            tx_bound: None,
            modular_arithmetic: false,
            timeout: None,
        }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolicSection {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    procs: Option<u32>,
    #[serde(default)]
    accounts: Option<u32>,
    #[serde(default)]
    initial_balance: Option<u64>,
    #[serde(default)]
    timeout: Option<u64>,
    /// Broken upstream; accepting it silently would change exploration
    /// semantics, so its presence is an error.
    #[serde(default)]
    loop_delimiter: Option<toml::Value>,
}

/// A fully resolved run: everything `main` needs beyond flag overrides.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub contract_name: String,
    pub verbose: bool,
    pub run: RunConfig,
}

pub fn load(path: &Path) -> Result<Resolved, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| err(format!("cannot read {}: {e}", path.display())))?;
    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| err(format!("cannot parse {}: {e}", path.display())))?;
    resolve(parsed)
}

fn resolve(raw: RawConfig) -> Result<Resolved, ConfigError> {
    let source_path = PathBuf::from(
        raw.contract
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| err("contract.path is required"))?,
    );

    // Empty name falls back to the file's basename.
    let contract_name = match raw.contract.name.as_deref() {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| err("contract.name is empty and contract.path has no basename"))?,
    };

    if raw.verification.symbolic_exec.loop_delimiter.is_some() {
        return Err(err(
            "verification.symbolicExec.loopDelimiter is deprecated (broken upstream); remove it",
        ));
    }

    let backend = pick_backend(&raw.verification)?;

    Ok(Resolved {
        contract_name: contract_name.clone(),
        verbose: raw.output.verbose,
        run: RunConfig {
            source_path,
            contract_name: Some(contract_name),
            ctor_args: raw.contract.args.clone(),
            predicates: raw.instrumentation.predicates.clone(),
            instrument: raw.instrumentation.instrument,
            for_symbolic_exec: raw.instrumentation.for_symbolic_exec,
            backend,
            cleanup: raw.output.cleanup,
            suppress_noops: raw.output.suppress_noops,
        },
    })
}

/// Verifier first; the symbolic executor only stands in when the verifier is
/// disabled. The two are never raced.
fn pick_backend(v: &VerificationSection) -> Result<Backend, ConfigError> {
    if v.verifier.enabled {
        let defaults = VerifierConfig::default();
        return Ok(Backend::Verifier(VerifierConfig {
            command: v.verifier.command.clone().unwrap_or(defaults.command),
            tx_bound: v.verifier.tx_bound.unwrap_or(defaults.tx_bound),
            modular_arithmetic: v.verifier.modular_arithmetic,
            timeout: v.verifier.timeout.map(Duration::from_secs),
        }));
    }
    if v.symbolic_exec.enabled {
        let defaults = SymbolicConfig::default();
        return Ok(Backend::SymbolicExec(SymbolicConfig {
            command: v.symbolic_exec.command.clone().unwrap_or(defaults.command),
            procs: v.symbolic_exec.procs.unwrap_or(defaults.procs),
            accounts: v.symbolic_exec.accounts.unwrap_or(defaults.accounts),
            initial_balance: v
                .symbolic_exec
                .initial_balance
                .unwrap_or(defaults.initial_balance),
            timeout: v.symbolic_exec.timeout.map(Duration::from_secs),
        }));
    }
    Err(err(
        "no back-end enabled: set verification.verifier.enabled or verification.symbolicExec.enabled",
    ))
}

fn default_true() -> bool {
    true
}
