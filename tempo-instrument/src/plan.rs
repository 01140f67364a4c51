#![forbid(unsafe_code)]

use tempo_ast::Atom;
use tempo_monitor::{BoolExpr, MonitorSet};
use tempo_sol::ContractAst;

use crate::GUARD_VAR;

/// A pre-state capture: one shadow local per distinct `Old(·)` operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Host expression text as written inside `Old(…)`.
    pub expr: String,
    /// Name of the prologue-bound local (`__old_<n>`).
    pub name: String,
    /// Declared type of the local.
    pub ty: String,
}

/// Everything the emitter needs, collected from the monitor set.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub snapshots: Vec<Snapshot>,
    /// Functions referenced through `<fn>Called` atoms, in first-use order.
    pub called: Vec<String>,
    /// Some formula reads the `notConstructor` guard.
    pub uses_guard: bool,
}

impl Plan {
    pub fn collect(set: &MonitorSet, contract: &ContractAst) -> Plan {
        let mut plan = Plan::default();

        let mut visit = |atom: &Atom| {
            for expr in atom.old_exprs() {
                let expr = expr.trim();
                if !plan.snapshots.iter().any(|s| s.expr == expr) {
                    plan.snapshots.push(Snapshot {
                        expr: expr.to_string(),
                        name: format!("__old_{}", plan.snapshots.len()),
                        ty: snapshot_type(expr, contract),
                    });
                }
            }
            for f in atom.called_fns() {
                if !plan.called.iter().any(|c| c == f) {
                    plan.called.push(f.to_string());
                }
            }
            for seg_text in atom.segments.iter().filter_map(|s| match s {
                tempo_ast::AtomSegment::Host(t) => Some(t.as_str()),
                _ => None,
            }) {
                if mentions_ident(seg_text, GUARD_VAR) {
                    plan.uses_guard = true;
                }
            }
        };

        for h in &set.history {
            for_each_atom(&h.update, &mut visit);
        }
        for g in &set.goals {
            for_each_atom(&g.goal, &mut visit);
        }

        plan
    }

    pub fn snapshot_named(&self, expr: &str) -> Option<&Snapshot> {
        let expr = expr.trim();
        self.snapshots.iter().find(|s| s.expr == expr)
    }
}

fn for_each_atom(e: &BoolExpr, f: &mut impl FnMut(&Atom)) {
    match e {
        BoolExpr::Const(_) | BoolExpr::Hist(_) => {}
        BoolExpr::Atom(a) => f(a),
        BoolExpr::Not(sub) => for_each_atom(sub, f),
        BoolExpr::And(a, b) | BoolExpr::Or(a, b) => {
            for_each_atom(a, f);
            for_each_atom(b, f);
        }
    }
}

/// Whole-word identifier search; host text is opaque so this stays lexical.
fn mentions_ident(text: &str, ident: &str) -> bool {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(pos) = text[from..].find(ident) {
        let start = from + pos;
        let end = start + ident.len();
        let before_ok = start == 0 || !is_ident_byte(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_ident_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = end;
    }
    false
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Best-effort host type of an `Old(·)` operand. Declared types win; a
/// top-level comparison or negation means `bool`; everything else defaults
/// to `uint256`.
fn snapshot_type(expr: &str, contract: &ContractAst) -> String {
    let expr = expr.trim();

    if expr == GUARD_VAR || (expr.len() > 6 && expr.ends_with("Called") && is_plain_ident(expr)) {
        return "bool".to_string();
    }

    if has_top_level_comparison(expr) || expr.starts_with('!') {
        return "bool".to_string();
    }

    if is_plain_ident(expr) {
        if let Some(var) = contract.state_var(expr) {
            return var.ty.clone();
        }
        return "uint256".to_string();
    }

    // `base[...]...`: a fully indexed mapping or array read.
    if let Some((base, rest)) = split_indexed(expr) {
        if rest.ends_with(']') {
            if let Some(var) = contract.state_var(base) {
                if let Some(vt) = var.mapping_value_type() {
                    return vt;
                }
                if let Some(elem) = var.ty.strip_suffix("[]") {
                    return elem.trim().to_string();
                }
            }
        }
    }

    "uint256".to_string()
}

fn is_plain_ident(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(is_ident_byte)
        && !s.as_bytes()[0].is_ascii_digit()
}

fn split_indexed(s: &str) -> Option<(&str, &str)> {
    let open = s.find('[')?;
    let base = &s[..open];
    if !is_plain_ident(base) {
        return None;
    }
    Some((base, &s[open..]))
}

fn has_top_level_comparison(expr: &str) -> bool {
    let bytes = expr.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'=' | b'!' if depth == 0 && bytes.get(i + 1) == Some(&b'=') => return true,
            b'<' | b'>' if depth == 0 => return true,
            _ => {}
        }
        i += 1;
    }
    false
}
