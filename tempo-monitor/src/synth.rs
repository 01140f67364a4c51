#![forbid(unsafe_code)]

use std::collections::HashMap;

use tempo_ast::{Formula, FormulaKind};
use tempo_parse::format_formula;

use crate::{BoolExpr, HistoryKind, HistoryVar};

/// The per-formula verdict expression, asserted at the end of every public
/// transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorGoal {
    /// Canonical text of the monitored formula, for diagnostics.
    pub source: String,
    pub goal: BoolExpr,
}

/// The union of monitor state across all formulas of a run, plus one goal per
/// formula. History indices in goals and updates refer into `history`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorSet {
    pub history: Vec<HistoryVar>,
    pub goals: Vec<MonitorGoal>,
}

pub fn synthesize(formula: &Formula) -> MonitorSet {
    synthesize_all(std::slice::from_ref(formula))
}

/// Synthesize monitors for a set of formulas with shared history state.
/// Structurally identical temporal subformulas (also across formulas) share
/// one history variable.
pub fn synthesize_all(formulas: &[Formula]) -> MonitorSet {
    let mut synth = Synth {
        set: MonitorSet::default(),
        cache: HashMap::new(),
    };
    for f in formulas {
        let goal = synth.lower(f);
        synth.set.goals.push(MonitorGoal {
            source: format_formula(f),
            goal,
        });
    }
    synth.set
}

struct Synth {
    set: MonitorSet,
    /// Canonical subformula text -> history variable index.
    cache: HashMap<String, usize>,
}

impl Synth {
    /// Current-transaction meaning of `f`, per the monitoring table:
    /// `Prev` reads its history bit pre-update; `Once`/`Hist`/`Since` mean
    /// their post-update value, inlined over pre-update state.
    fn lower(&mut self, f: &Formula) -> BoolExpr {
        match &f.kind {
            FormulaKind::Atom(a) => BoolExpr::Atom(a.clone()),
            FormulaKind::Not(sub) => BoolExpr::not(self.lower(sub)),
            FormulaKind::And(a, b) => BoolExpr::and(self.lower(a), self.lower(b)),
            FormulaKind::Or(a, b) => BoolExpr::or(self.lower(a), self.lower(b)),
            FormulaKind::Implies(a, b) => {
                BoolExpr::or(BoolExpr::not(self.lower(a)), self.lower(b))
            }
            FormulaKind::Iff(a, b) => {
                let x = self.lower(a);
                let y = self.lower(b);
                BoolExpr::or(
                    BoolExpr::and(x.clone(), y.clone()),
                    BoolExpr::and(BoolExpr::not(x), BoolExpr::not(y)),
                )
            }
            FormulaKind::Prev(sub) => {
                let i = match self.cached(f) {
                    Ok(i) => i,
                    Err(key) => {
                        let i = self.reserve(key, HistoryKind::Prev, false);
                        // h := now(sub); its pre-update value *is* Prev sub.
                        self.set.history[i].update = self.lower(sub);
                        i
                    }
                };
                BoolExpr::Hist(i)
            }
            FormulaKind::Once(sub) => {
                let i = match self.cached(f) {
                    Ok(i) => i,
                    Err(key) => {
                        let i = self.reserve(key, HistoryKind::Once, false);
                        let now = self.lower(sub);
                        // h := h || now
                        self.set.history[i].update = BoolExpr::or(BoolExpr::Hist(i), now);
                        i
                    }
                };
                self.set.history[i].update.clone()
            }
            FormulaKind::Hist(sub) => {
                let i = match self.cached(f) {
                    Ok(i) => i,
                    Err(key) => {
                        let i = self.reserve(key, HistoryKind::Hist, true);
                        let now = self.lower(sub);
                        // h := h && now
                        self.set.history[i].update = BoolExpr::and(BoolExpr::Hist(i), now);
                        i
                    }
                };
                self.set.history[i].update.clone()
            }
            FormulaKind::Since(lhs, rhs) => {
                let i = match self.cached(f) {
                    Ok(i) => i,
                    Err(key) => {
                        let i = self.reserve(key, HistoryKind::Since, false);
                        let now_lhs = self.lower(lhs);
                        let now_rhs = self.lower(rhs);
                        // h := now_rhs || (h && now_lhs)
                        self.set.history[i].update =
                            BoolExpr::or(now_rhs, BoolExpr::and(BoolExpr::Hist(i), now_lhs));
                        i
                    }
                };
                self.set.history[i].update.clone()
            }
        }
    }

    fn cached(&self, f: &Formula) -> Result<usize, String> {
        let key = format_formula(f);
        match self.cache.get(&key) {
            Some(&i) => Ok(i),
            None => Err(key),
        }
    }

    /// Reserve the slot before lowering the operand so the variable's own
    /// update rule may refer to its pre-update value by index.
    fn reserve(&mut self, key: String, kind: HistoryKind, init: bool) -> usize {
        let i = self.set.history.len();
        self.set.history.push(HistoryVar {
            name: format!("__h_{}_{i}", kind.label()),
            kind,
            init,
            update: BoolExpr::Const(init),
        });
        self.cache.insert(key, i);
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_ast::{Atom, AtomSegment};
    use tempo_parse::parse_formula;

    /// Reference PTLTL semantics over a finite trace of atom valuations.
    /// `t` indexes completed transactions; the empty history is "no prior
    /// state" for the temporal operators.
    fn sem(f: &Formula, trace: &[HashMap<String, bool>], t: usize) -> bool {
        match &f.kind {
            FormulaKind::Atom(a) => atom_value(a, &trace[t]),
            FormulaKind::Not(s) => !sem(s, trace, t),
            FormulaKind::And(a, b) => sem(a, trace, t) && sem(b, trace, t),
            FormulaKind::Or(a, b) => sem(a, trace, t) || sem(b, trace, t),
            FormulaKind::Implies(a, b) => !sem(a, trace, t) || sem(b, trace, t),
            FormulaKind::Iff(a, b) => sem(a, trace, t) == sem(b, trace, t),
            FormulaKind::Prev(s) => t > 0 && sem(s, trace, t - 1),
            FormulaKind::Once(s) => (0..=t).any(|k| sem(s, trace, k)),
            FormulaKind::Hist(s) => (0..=t).all(|k| sem(s, trace, k)),
            FormulaKind::Since(a, b) => (0..=t)
                .rev()
                .any(|k| sem(b, trace, k) && ((k + 1)..=t).all(|j| sem(a, trace, j))),
        }
    }

    fn atom_value(a: &Atom, valuation: &HashMap<String, bool>) -> bool {
        let key = a.render(|e| format!("Old({e})"), |f| format!("{f}Called"));
        *valuation.get(&key).unwrap_or(&false)
    }

    /// Run the synthesized monitor over the trace: read pass (goal) then
    /// update pass, per transaction.
    fn run_monitor(set: &MonitorSet, trace: &[HashMap<String, bool>]) -> Vec<bool> {
        let mut hist: Vec<bool> = set.history.iter().map(|h| h.init).collect();
        let mut verdicts = Vec::with_capacity(trace.len());

        for valuation in trace {
            let mut atoms = |a: &Atom| atom_value(a, valuation);
            let goal = set.goals[0].goal.eval(&mut atoms, &hist);

            let next: Vec<bool> = set
                .history
                .iter()
                .map(|h| h.update.eval(&mut atoms, &hist))
                .collect();
            hist = next;

            verdicts.push(goal);
        }
        verdicts
    }

    fn val(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn check_against_reference(src: &str, trace: &[HashMap<String, bool>]) {
        let f = parse_formula(src).unwrap();
        let set = synthesize(&f);
        let got = run_monitor(&set, trace);
        let want: Vec<bool> = (0..trace.len()).map(|t| sem(&f, trace, t)).collect();
        assert_eq!(got, want, "monitor diverges from semantics for {src}");
    }

    #[test]
    fn prev_matches_semantics() {
        let trace = vec![
            val(&[("p", true)]),
            val(&[("p", false)]),
            val(&[("p", true)]),
            val(&[("p", true)]),
        ];
        check_against_reference("Prev p", &trace);
    }

    #[test]
    fn once_and_hist_match_semantics() {
        let trace = vec![
            val(&[("p", false), ("q", true)]),
            val(&[("p", true), ("q", true)]),
            val(&[("p", false), ("q", false)]),
            val(&[("p", false), ("q", true)]),
        ];
        check_against_reference("Once p", &trace);
        check_against_reference("Hist q", &trace);
        check_against_reference("Once p && Hist q", &trace);
    }

    #[test]
    fn since_matches_semantics() {
        // Exhaustive over all 3-step traces of two atoms.
        for bits in 0u32..64 {
            let trace: Vec<_> = (0..3)
                .map(|t| {
                    val(&[
                        ("p", bits & (1 << (2 * t)) != 0),
                        ("q", bits & (1 << (2 * t + 1)) != 0),
                    ])
                })
                .collect();
            check_against_reference("p Since q", &trace);
            check_against_reference("Prev (p Since q)", &trace);
            check_against_reference("!(p Since q) || Once q", &trace);
        }
    }

    #[test]
    fn nested_temporal_operators() {
        for bits in 0u32..16 {
            let trace: Vec<_> = (0..4)
                .map(|t| val(&[("p", bits & (1 << t) != 0)]))
                .collect();
            check_against_reference("Once Prev p", &trace);
            check_against_reference("Hist (Prev p -> p)", &trace);
        }
    }

    #[test]
    fn initial_values_follow_empty_history() {
        let f = parse_formula("Prev p && Once q || Hist r").unwrap();
        let set = synthesize(&f);
        let by_kind: HashMap<_, _> = set.history.iter().map(|h| (h.kind, h.init)).collect();
        assert!(!by_kind[&HistoryKind::Prev]);
        assert!(!by_kind[&HistoryKind::Once]);
        assert!(by_kind[&HistoryKind::Hist]);
    }

    #[test]
    fn shared_subformulas_share_history() {
        let f = parse_formula("Once p -> (Once p && Prev q)").unwrap();
        let set = synthesize(&f);
        // One var for `Once p` (deduped), one for `Prev q`.
        assert_eq!(set.history.len(), 2);
    }

    #[test]
    fn dedup_spans_multiple_formulas() {
        let a = parse_formula("Once p").unwrap();
        let b = parse_formula("Once p || Prev q").unwrap();
        let set = synthesize_all(&[a, b]);
        assert_eq!(set.goals.len(), 2);
        assert_eq!(set.history.len(), 2);
    }

    #[test]
    fn goal_reads_pre_update_history_only() {
        // Prev's meaning is the raw pre-update bit; its update is the
        // operand's current value. This is the contract the two-pass
        // epilogue depends on.
        let f = parse_formula("Prev p").unwrap();
        let set = synthesize(&f);
        assert_eq!(set.goals[0].goal, BoolExpr::Hist(0));
        assert_eq!(
            set.history[0].update,
            BoolExpr::Atom(Atom {
                segments: vec![AtomSegment::Host("p".to_string())]
            })
        );
    }

    fn render_goal(set: &MonitorSet) -> String {
        set.goals[0].goal.render(
            &mut |a: &Atom| a.render(|e| format!("Old({e})"), |f| format!("{f}Called")),
            &mut |i| set.history[i].name.clone(),
        )
    }

    #[test]
    fn monitor_is_idempotent_on_its_own_goal() {
        // P4: the goal contains no temporal operators, so monitoring the
        // goal itself (history reads become opaque atoms) allocates no
        // history and reaches a structural fixpoint after one re-parse.
        let f = parse_formula("Hist (p -> Once q)").unwrap();
        let set = synthesize(&f);

        let once = synthesize(&parse_formula(&render_goal(&set)).unwrap());
        assert!(once.history.is_empty());
        assert!(once.goals[0].goal.is_history_free());

        let twice = synthesize(&parse_formula(&render_goal(&once)).unwrap());
        assert!(twice.history.is_empty());
        assert_eq!(render_goal(&twice), render_goal(&once));
    }
}
