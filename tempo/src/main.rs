#![forbid(unsafe_code)]

//! `tempo`: temporal-property verification driver for smart contracts.
//!
//! Reads a TOML run configuration, instruments the contract so each PTLTL
//! predicate becomes an assertion, hands the result to the configured
//! back-end checker, and maps the outcome to a stable exit code:
//! 0 proven, 1 counterexample, 2 vacuous after retries, 3 back-end error or
//! timeout, 4 bad configuration or predicate.

mod config;
mod report;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use tempo_driver::{run, DriverError};

#[derive(Parser, Debug)]
#[command(name = "tempo", version, about = "Temporal-property verification driver")]
struct Cli {
    /// Path to the TOML run configuration.
    config: PathBuf,

    /// Echo raw back-end output. Overrides `output.verbose`.
    #[arg(long)]
    verbose: bool,

    /// Emit the final verdict as JSON instead of the human rendering.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_cli(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            // Fancy diagnostic rendering on stderr, exit code per taxonomy.
            eprintln!("{:?}", failure.report);
            ExitCode::from(failure.code)
        }
    }
}

struct Failure {
    code: u8,
    report: miette::Report,
}

fn fail(code: u8, report: impl Into<miette::Report>) -> Failure {
    Failure {
        code,
        report: report.into(),
    }
}

fn run_cli(cli: &Cli) -> Result<u8, Failure> {
    let resolved = config::load(&cli.config).map_err(|e| fail(4, e))?;

    let result = run(&resolved.run).map_err(|e| {
        let code = match &e {
            DriverError::Spawn(_) | DriverError::Output(_) => 3,
            _ => 4,
        };
        fail(code, e)
    })?;

    if cli.verbose || resolved.verbose {
        let mut stderr = std::io::stderr();
        for (i, raw) in result.backend_output.iter().enumerate() {
            let _ = writeln!(stderr, "--- back-end run {} ---", i + 1);
            let _ = stderr.write_all(raw.as_bytes());
        }
    }

    if cli.json {
        let json = report::render_json(&resolved.contract_name, &result.outcome)
            .map_err(|e| fail(4, miette::Report::msg(e.to_string())))?;
        println!("{json}");
    } else {
        print!(
            "{}",
            report::render_human(&resolved.contract_name, &result.outcome)
        );
    }

    // The taxonomy fits in u8 space by construction.
    Ok(result.outcome.exit_code() as u8)
}
