#![forbid(unsafe_code)]

use serde::Serialize;

use tempo_backend::{Trace, TraceStep};
use tempo_driver::Outcome;

#[derive(Debug, Clone, Serialize)]
pub struct VerdictReport<'a> {
    pub schema: &'static str,
    pub contract: &'a str,
    pub verdict: &'static str,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<&'a Trace>,
}

fn verdict_label(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Proven => "proven",
        Outcome::CounterExample { vacuous: false, .. } => "counterexample",
        Outcome::CounterExample { vacuous: true, .. } => "vacuous",
        Outcome::Exhausted { .. } => "exhausted",
    }
}

fn outcome_trace(outcome: &Outcome) -> Option<&Trace> {
    match outcome {
        Outcome::Proven => None,
        Outcome::CounterExample { trace, .. } => Some(trace),
        Outcome::Exhausted { last } => last.as_ref(),
    }
}

pub fn render_json(contract: &str, outcome: &Outcome) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&VerdictReport {
        schema: "tempo.verdict.v1",
        contract,
        verdict: verdict_label(outcome),
        exit_code: outcome.exit_code(),
        trace: outcome_trace(outcome),
    })
}

pub fn render_human(contract: &str, outcome: &Outcome) -> String {
    let mut out = String::new();
    match outcome {
        Outcome::Proven => {
            out.push_str(&format!("{contract}: proven, no counterexample within the bound\n"));
        }
        Outcome::CounterExample { trace, vacuous } => {
            if *vacuous {
                out.push_str(&format!(
                    "{contract}: counterexample is constructor-shaped even under the guard\n"
                ));
            } else {
                out.push_str(&format!("{contract}: counterexample found\n"));
            }
            render_trace(&mut out, trace);
        }
        Outcome::Exhausted { last } => {
            out.push_str(&format!("{contract}: back-end exhausted its time budget\n"));
            if let Some(trace) = last {
                out.push_str("last counterexample seen:\n");
                render_trace(&mut out, trace);
            }
        }
    }
    out
}

fn render_trace(out: &mut String, trace: &Trace) {
    for step in &trace.steps {
        out.push_str(&format!("  {}: {}", step.index, render_step(step)));
        out.push('\n');
    }
    if let Some(site) = &trace.failing {
        out.push_str(&format!("  assertion fails at {}:{}\n", site.file, site.line));
    }
}

fn render_step(step: &TraceStep) -> String {
    let args: Vec<String> = step
        .args
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    let mut s = format!("{}({})", step.function, args.join(", "));
    if let Some(caller) = &step.caller {
        s.push_str(&format!(" from {caller}"));
    }
    if let Some(value) = &step.value {
        s.push_str(&format!(" value {value}"));
    }
    s
}
