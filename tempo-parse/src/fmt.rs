#![forbid(unsafe_code)]

use tempo_ast::{Formula, FormulaKind};

/// Canonical, fully parenthesized rendering. Two structurally equal formulas
/// format identically, which is what the monitor synthesizer's subformula
/// cache keys on; the output also re-parses to the same structure.
pub fn format_formula(f: &Formula) -> String {
    match &f.kind {
        FormulaKind::Atom(atom) => {
            atom.render(|e| format!("Old({e})"), |name| format!("{name}Called"))
        }
        FormulaKind::Not(sub) => format!("!({})", format_formula(sub)),
        FormulaKind::And(a, b) => format!("({} && {})", format_formula(a), format_formula(b)),
        FormulaKind::Or(a, b) => format!("({} || {})", format_formula(a), format_formula(b)),
        FormulaKind::Implies(a, b) => format!("({} -> {})", format_formula(a), format_formula(b)),
        FormulaKind::Iff(a, b) => format!("({} <-> {})", format_formula(a), format_formula(b)),
        FormulaKind::Prev(sub) => format!("Prev({})", format_formula(sub)),
        FormulaKind::Once(sub) => format!("Once({})", format_formula(sub)),
        FormulaKind::Hist(sub) => format!("Hist({})", format_formula(sub)),
        FormulaKind::Since(a, b) => {
            format!("({} Since {})", format_formula(a), format_formula(b))
        }
    }
}
