#![forbid(unsafe_code)]

use tempo_ast::Formula;
use tempo_backend::Trace;
use tempo_instrument::GUARD_VAR;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Initial,
    Running,
    VacuousCe,
    RealCe,
    Proven,
    Exhausted,
}

/// What the orchestrator should do after a counter-example.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    /// Re-run with the controller's current (rewritten) formulas.
    Retry,
    /// Terminal counter-example. `vacuous` marks a constructor-shaped trace
    /// that survived the guard rewrite.
    Stop { trace: Trace, vacuous: bool },
}

/// The iteration controller. Holds the original formulas for the whole run;
/// the single permitted rewrite composes the `notConstructor` guard against
/// the originals, never against an earlier rewrite.
pub struct Controller {
    original: Vec<Formula>,
    current: Vec<Formula>,
    rewritten: bool,
    state: State,
}

impl Controller {
    pub fn new(formulas: Vec<Formula>) -> Self {
        Self {
            current: formulas.clone(),
            original: formulas,
            rewritten: false,
            state: State::Initial,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Formulas for the next back-end invocation.
    pub fn start(&mut self) -> &[Formula] {
        self.state = State::Running;
        &self.current
    }

    pub fn on_proof(&mut self) {
        self.state = State::Proven;
    }

    pub fn on_timeout(&mut self) {
        self.state = State::Exhausted;
    }

    /// Classify a counter-example. `failing_in_constructor` is the caller's
    /// judgement of the failing assertion site against the instrumented
    /// source.
    pub fn on_counterexample(&mut self, trace: Trace, failing_in_constructor: bool) -> Decision {
        let constructor_shaped = trace.constructor_only() || failing_in_constructor;
        let already_guarded = self
            .current
            .iter()
            .all(|f| f.is_guarded_by(GUARD_VAR));

        if constructor_shaped && !already_guarded && !self.rewritten {
            self.state = State::VacuousCe;
            self.current = self
                .original
                .iter()
                .cloned()
                .map(|f| {
                    if f.is_guarded_by(GUARD_VAR) {
                        f
                    } else {
                        f.guarded_by(GUARD_VAR)
                    }
                })
                .collect();
            self.rewritten = true;
            return Decision::Retry;
        }

        self.state = State::RealCe;
        Decision::Stop {
            trace,
            vacuous: constructor_shaped && self.rewritten,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_backend::TraceStep;
    use tempo_parse::parse_formula;

    fn trace(functions: &[&str]) -> Trace {
        Trace {
            steps: functions
                .iter()
                .enumerate()
                .map(|(index, f)| TraceStep {
                    index,
                    function: f.to_string(),
                    args: Vec::new(),
                    caller: None,
                    value: None,
                })
                .collect(),
            failing: None,
        }
    }

    fn controller(srcs: &[&str]) -> Controller {
        Controller::new(srcs.iter().map(|s| parse_formula(s).unwrap()).collect())
    }

    #[test]
    fn proof_is_terminal() {
        let mut c = controller(&["Once p"]);
        c.start();
        c.on_proof();
        assert_eq!(c.state(), State::Proven);
    }

    #[test]
    fn constructor_only_trace_triggers_one_guard_rewrite() {
        let mut c = controller(&["Old(totalSupply) == totalSupply || mintCalled"]);
        c.start();

        let d = c.on_counterexample(trace(&["Constructor"]), false);
        assert_eq!(d, Decision::Retry);
        assert_eq!(c.state(), State::VacuousCe);

        // The retry runs guarded formulas.
        let guarded = c.start().to_vec();
        assert!(guarded.iter().all(|f| f.is_guarded_by("notConstructor")));

        // A second vacuous trace is terminal.
        let d = c.on_counterexample(trace(&["Constructor"]), false);
        let Decision::Stop { vacuous, .. } = d else {
            panic!("expected a terminal counterexample");
        };
        assert!(vacuous);
        assert_eq!(c.state(), State::RealCe);
    }

    #[test]
    fn failing_site_in_constructor_counts_as_vacuous() {
        let mut c = controller(&["Old(totalSupply) == totalSupply"]);
        c.start();
        let d = c.on_counterexample(trace(&["Constructor", "transfer"]), true);
        assert_eq!(d, Decision::Retry);
    }

    #[test]
    fn multi_transaction_trace_is_a_real_counterexample() {
        let mut c = controller(&["Hist (totalSupply == 1)"]);
        c.start();
        let d = c.on_counterexample(trace(&["Constructor", "mint"]), false);
        let Decision::Stop { trace: t, vacuous } = d else {
            panic!("expected stop");
        };
        assert!(!vacuous);
        assert_eq!(t.steps.len(), 2);
    }

    #[test]
    fn pre_guarded_formulas_are_never_rewritten() {
        let mut c = controller(&["notConstructor -> Once mintCalled"]);
        c.start();
        let d = c.on_counterexample(trace(&["Constructor"]), false);
        let Decision::Stop { vacuous, .. } = d else {
            panic!("expected stop");
        };
        // No rewrite was spent, so the trace is reported as real.
        assert!(!vacuous);
    }

    #[test]
    fn rewrite_composes_against_the_original_formulas() {
        let mut c = controller(&["Once p"]);
        c.start();
        c.on_counterexample(trace(&["Constructor"]), false);
        let first: Vec<Formula> = c.start().to_vec();

        // Another vacuous round must not stack a second guard.
        c.on_counterexample(trace(&["Constructor"]), false);
        assert_eq!(c.start(), &first[..]);
    }
}
