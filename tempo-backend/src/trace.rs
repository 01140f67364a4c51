#![forbid(unsafe_code)]

use serde::Serialize;

use crate::BackendOutputError;

/// One transaction of a counter-example.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub index: usize,
    pub function: String,
    /// User-visible arguments, in printed order. Runtime-internal arguments
    /// (`this`, `block.*`, monitor state) never appear here.
    pub args: Vec<(String, String)>,
    /// `msg.sender` of the transaction, when the back-end printed it.
    pub caller: Option<String>,
    /// `msg.value` of the transaction, when the back-end printed it.
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailingSite {
    pub file: String,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Trace {
    pub steps: Vec<TraceStep>,
    pub failing: Option<FailingSite>,
}

impl Trace {
    /// The vacuity test: nothing but the deployment transaction.
    pub fn constructor_only(&self) -> bool {
        !self.steps.is_empty()
            && self
                .steps
                .iter()
                .all(|s| s.function.eq_ignore_ascii_case("constructor"))
    }

    /// Drop transactions identical to their predecessor and renumber.
    /// Optional post-processing; the default pipeline keeps every step.
    pub fn without_noops(&self) -> Trace {
        let mut steps: Vec<TraceStep> = Vec::with_capacity(self.steps.len());
        for s in &self.steps {
            let dup = steps.last().is_some_and(|prev: &TraceStep| {
                prev.function == s.function
                    && prev.args == s.args
                    && prev.caller == s.caller
                    && prev.value == s.value
            });
            if !dup {
                let mut s = s.clone();
                s.index = steps.len();
                steps.push(s);
            }
        }
        Trace {
            steps,
            failing: self.failing.clone(),
        }
    }
}

/// Names the back-end invents that the operator never supplied.
fn is_internal_arg(name: &str) -> bool {
    name == "this" || name.starts_with("block.") || name.starts_with("__")
}

/// Normalize the verifier's free-form output. Each transaction is one line
///
/// ```text
/// <file>(<line>,<col>): : <Contract>::<Function> (<name>=<value>, …)
/// ```
///
/// and the defect line contains `ASSERTION FAILS`. A counter-example with no
/// recoverable transactions is malformed.
pub fn parse_trace(output: &str) -> Result<Trace, BackendOutputError> {
    let mut steps = Vec::new();
    let mut failing = None;

    for line in output.lines() {
        let Some((site, rest)) = split_site(line) else {
            continue;
        };
        if line.contains("ASSERTION FAILS") {
            failing = Some(site);
            continue;
        }
        if let Some(step) = parse_step(rest) {
            steps.push(TraceStep {
                index: steps.len(),
                ..step
            });
        }
    }

    if steps.is_empty() {
        return Err(BackendOutputError {
            message: "counterexample output carries no transaction lines".to_string(),
        });
    }
    Ok(Trace { steps, failing })
}

/// `<file>(<line>,<col>):` prefix; returns the site and the text after `:`.
fn split_site(line: &str) -> Option<(FailingSite, &str)> {
    let open = line.find('(')?;
    let close = open + line[open..].find(')')?;
    let (l, _col) = line[open + 1..close].split_once(',')?;
    let lineno: u32 = l.trim().parse().ok()?;
    let rest = line[close + 1..].strip_prefix(':')?;
    Some((
        FailingSite {
            file: line[..open].trim().to_string(),
            line: lineno,
        },
        rest,
    ))
}

/// ` : <Contract>::<Function> (<args>)`, site prefix already removed.
fn parse_step(rest: &str) -> Option<TraceStep> {
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    let (_contract, call) = rest.split_once("::")?;

    let open = call.find('(')?;
    let close = call.rfind(')')?;
    let function = call[..open].trim().to_string();
    if function.is_empty() {
        return None;
    }

    let mut args = Vec::new();
    let mut caller = None;
    let mut value = None;
    for part in call[open + 1..close].split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, val) = part.split_once('=')?;
        let (name, val) = (name.trim(), val.trim());
        match name {
            "msg.sender" => caller = Some(val.to_string()),
            "msg.value" => value = Some(val.to_string()),
            _ if is_internal_arg(name) => {}
            _ => args.push((name.to_string(), val.to_string())),
        }
    }

    Some(TraceStep {
        index: 0,
        function,
        args,
        caller,
        value,
    })
}

/// Canonical rendering of a trace in the verifier's line format. The parser
/// recovers exactly the printed trace back from it.
pub fn format_trace(trace: &Trace) -> String {
    let mut out = String::from("Found a counterexample:\n");
    for step in &trace.steps {
        let mut fields = vec!["this=T0".to_string()];
        if let Some(c) = &step.caller {
            fields.push(format!("msg.sender={c}"));
        }
        if let Some(v) = &step.value {
            fields.push(format!("msg.value={v}"));
        }
        for (name, val) in &step.args {
            fields.push(format!("{name}={val}"));
        }
        out.push_str(&format!(
            "Trace.sol(0,0): : C::{} ({})\n",
            step.function,
            fields.join(", ")
        ));
    }
    if let Some(site) = &trace.failing {
        out.push_str(&format!("{}({},1): ASSERTION FAILS\n", site.file, site.line));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MISSING_DEBIT: &str = "\
Boogie program verifier
Found a counterexample:
Token.sol(9,5): : Token::Constructor (this=T0, msg.sender=A0, msg.value=0, __h_once_0=false)
Token.sol(31,9): : Token::transfer (this=T0, msg.sender=A1, msg.value=0, to=A2, amount=142, block.timestamp=11)
Token.sol(38,9): ASSERTION FAILS
";

    #[test]
    fn verifier_lines_become_ordered_steps() {
        let t = parse_trace(MISSING_DEBIT).unwrap();
        assert_eq!(t.steps.len(), 2);

        assert_eq!(t.steps[0].index, 0);
        assert_eq!(t.steps[0].function, "Constructor");
        assert_eq!(t.steps[0].caller.as_deref(), Some("A0"));
        assert!(t.steps[0].args.is_empty(), "internal args are dropped");

        assert_eq!(t.steps[1].function, "transfer");
        assert_eq!(
            t.steps[1].args,
            vec![
                ("to".to_string(), "A2".to_string()),
                ("amount".to_string(), "142".to_string())
            ]
        );
        assert_eq!(t.steps[1].caller.as_deref(), Some("A1"));
    }

    #[test]
    fn failing_site_comes_from_the_defect_line() {
        let t = parse_trace(MISSING_DEBIT).unwrap();
        assert_eq!(
            t.failing,
            Some(FailingSite {
                file: "Token.sol".to_string(),
                line: 38
            })
        );
    }

    #[test]
    fn constructor_only_traces_are_recognized() {
        let out = "\
Found a counterexample:
Token.sol(9,5): : Token::Constructor (this=T0, msg.sender=A0)
Token.sol(12,5): ASSERTION FAILS
";
        let t = parse_trace(out).unwrap();
        assert!(t.constructor_only());
        assert!(!parse_trace(MISSING_DEBIT).unwrap().constructor_only());
    }

    #[test]
    fn stepless_counterexample_is_malformed() {
        let err = parse_trace("Found a counterexample:\nno trace lines here\n").unwrap_err();
        assert!(err.message.contains("no transaction lines"));
    }

    #[test]
    fn noop_suppression_drops_consecutive_duplicates() {
        let out = "\
Found a counterexample:
T.sol(1,1): : C::Constructor (this=T0)
T.sol(5,1): : C::poke (this=T0, msg.sender=A1)
T.sol(5,1): : C::poke (this=T0, msg.sender=A1)
T.sol(5,1): : C::poke (this=T0, msg.sender=A2)
";
        let t = parse_trace(out).unwrap().without_noops();
        assert_eq!(t.steps.len(), 3);
        assert_eq!(t.steps[2].index, 2);
        assert_eq!(t.steps[2].caller.as_deref(), Some("A2"));
    }

    fn step_strategy() -> impl Strategy<Value = (String, Vec<(String, String)>, Option<String>, Option<String>)> {
        let ident = "[a-z][a-z0-9_]{0,6}";
        // Argument names must not collide with the runtime-internal names
        // the parser strips.
        let arg_name = "[a-su-z][a-z0-9_]{0,6}";
        let val = "[A-Za-z0-9]{1,6}";
        (
            ident,
            prop::collection::vec((arg_name, val), 0..3),
            prop::option::of(val),
            prop::option::of(val),
        )
    }

    proptest! {
        // The normalizer is a left-inverse of the canonical formatter.
        #[test]
        fn parse_inverts_format(
            raw_steps in prop::collection::vec(step_strategy(), 1..4),
            failing in prop::option::of(("[A-Za-z]{1,6}\\.sol", 1..500u32)),
        ) {
            let steps: Vec<TraceStep> = raw_steps
                .into_iter()
                .enumerate()
                .map(|(index, (function, args, caller, value))| TraceStep {
                    index,
                    function,
                    args,
                    caller,
                    value,
                })
                .collect();
            let trace = Trace {
                steps,
                failing: failing.map(|(file, line)| FailingSite { file, line }),
            };

            let parsed = parse_trace(&format_trace(&trace)).unwrap();
            prop_assert_eq!(parsed, trace);
        }
    }
}
