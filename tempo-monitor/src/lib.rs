#![forbid(unsafe_code)]

//! Monitor synthesis for past-time LTL formulas.
//!
//! Each temporal subformula gets one persistent boolean of history; the
//! current truth of the whole formula (`goal`) and every history update are
//! expressed purely over current atomic propositions and *pre-update* history
//! values. The instrumenter's epilogue can therefore evaluate all goals
//! first (read pass) and write all history variables second (update pass)
//! without any ordering hazards inside either pass.

mod synth;

pub use synth::{synthesize, synthesize_all, MonitorGoal, MonitorSet};

use tempo_ast::Atom;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HistoryKind {
    Prev,
    Once,
    Hist,
    Since,
}

impl HistoryKind {
    pub fn label(self) -> &'static str {
        match self {
            HistoryKind::Prev => "prev",
            HistoryKind::Once => "once",
            HistoryKind::Hist => "hist",
            HistoryKind::Since => "since",
        }
    }
}

/// One persistent boolean of monitor state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryVar {
    pub name: String,
    pub kind: HistoryKind,
    /// Empty-history default: false except for `Hist`.
    pub init: bool,
    /// New value after the current transaction, over pre-update history and
    /// current atoms.
    pub update: BoolExpr,
}

/// A pure boolean expression over current atoms and pre-update history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoolExpr {
    Const(bool),
    /// Current-transaction value of an atomic proposition.
    Atom(Atom),
    /// Pre-update value of history variable `i` (index into the set).
    Hist(usize),
    Not(Box<BoolExpr>),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
}

impl BoolExpr {
    pub fn not(e: BoolExpr) -> BoolExpr {
        BoolExpr::Not(Box::new(e))
    }

    pub fn and(a: BoolExpr, b: BoolExpr) -> BoolExpr {
        BoolExpr::And(Box::new(a), Box::new(b))
    }

    pub fn or(a: BoolExpr, b: BoolExpr) -> BoolExpr {
        BoolExpr::Or(Box::new(a), Box::new(b))
    }

    /// Evaluate against a valuation of atoms and pre-update history values.
    pub fn eval(&self, atoms: &mut impl FnMut(&Atom) -> bool, hist: &[bool]) -> bool {
        match self {
            BoolExpr::Const(b) => *b,
            BoolExpr::Atom(a) => atoms(a),
            BoolExpr::Hist(i) => hist[*i],
            BoolExpr::Not(e) => !e.eval(atoms, hist),
            BoolExpr::And(a, b) => a.eval(atoms, hist) && b.eval(atoms, hist),
            BoolExpr::Or(a, b) => a.eval(atoms, hist) || b.eval(atoms, hist),
        }
    }

    /// Render to host-language boolean text. `atom` renders an atomic
    /// proposition (with `Old`/`Called` substitution applied); `hist` names a
    /// history variable.
    pub fn render(
        &self,
        atom: &mut impl FnMut(&Atom) -> String,
        hist: &mut impl FnMut(usize) -> String,
    ) -> String {
        match self {
            BoolExpr::Const(true) => "true".to_string(),
            BoolExpr::Const(false) => "false".to_string(),
            BoolExpr::Atom(a) => format!("({})", atom(a)),
            BoolExpr::Hist(i) => hist(*i),
            BoolExpr::Not(e) => format!("(!{})", e.render(atom, hist)),
            BoolExpr::And(a, b) => {
                format!("({} && {})", a.render(atom, hist), b.render(atom, hist))
            }
            BoolExpr::Or(a, b) => {
                format!("({} || {})", a.render(atom, hist), b.render(atom, hist))
            }
        }
    }

    /// True when the expression reads no history at all.
    pub fn is_history_free(&self) -> bool {
        match self {
            BoolExpr::Const(_) | BoolExpr::Atom(_) => true,
            BoolExpr::Hist(_) => false,
            BoolExpr::Not(e) => e.is_history_free(),
            BoolExpr::And(a, b) | BoolExpr::Or(a, b) => {
                a.is_history_free() && b.is_history_free()
            }
        }
    }
}
