#![forbid(unsafe_code)]

use tempo_ast::Atom;
use tempo_monitor::MonitorSet;
use tempo_sol::{ContractAst, Function, FunctionKind, Visibility};

use crate::plan::Plan;
use crate::{InstrumentOptions, InstrumentationError, GUARD_VAR};

/// Rewrite `src` so the monitors in `set` run at the end of every public
/// transaction of `contract`. The result compiles against the same interface
/// (minus `view`/`pure` on entry points, since monitor state is storage).
pub fn instrument(
    src: &str,
    contract: &ContractAst,
    set: &MonitorSet,
    opts: &InstrumentOptions,
) -> Result<String, InstrumentationError> {
    let plan = Plan::collect(set, contract);

    let entries: Vec<&Function> = contract.public_entries().collect();
    for f in &entries {
        check_routable(f)?;
    }

    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    edits.push((
        contract.body_open,
        contract.body_open,
        declarations(set, &plan),
    ));

    // The guard is false by default; the explicit write keeps back-ends from
    // flagging an undefined read in constructor-only transaction prefixes.
    if plan.uses_guard {
        if let Some(ctor) = contract.constructor() {
            let before_close = ctor.body_span.offset() + ctor.body_span.len() - 1;
            edits.push((
                before_close,
                before_close,
                format!("    {GUARD_VAR} = false;\n    "),
            ));
        }
    }

    for f in &entries {
        match f.kind {
            FunctionKind::Regular => {
                let name_span = f.name_span.ok_or_else(|| {
                    InstrumentationError::in_fn(&f.name, "function has no name span")
                })?;
                edits.push((
                    name_span.offset(),
                    name_span.offset() + name_span.len(),
                    format!("__impl_{}", f.name),
                ));
                edits.push((
                    f.attrs_span.offset(),
                    f.attrs_span.offset() + f.attrs_span.len(),
                    format!(" {} ", carrier_attrs(&f.attrs)),
                ));
            }
            FunctionKind::Fallback | FunctionKind::Receive => {
                edits.push((
                    f.sig_span.offset(),
                    f.sig_span.offset() + f.sig_span.len(),
                    format!("function __impl_{}() internal ", f.name),
                ));
            }
            FunctionKind::Constructor => unreachable!("not a public entry"),
        }
        let after_body = f.body_span.offset() + f.body_span.len();
        edits.push((after_body, after_body, wrapper(src, f, set, &plan, opts)));
    }

    // Splice back to front so earlier offsets stay valid.
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = src.to_string();
    for (start, end, text) in edits {
        out.replace_range(start..end, &text);
    }
    Ok(out)
}

fn check_routable(f: &Function) -> Result<(), InstrumentationError> {
    if f.has_assembly {
        return Err(InstrumentationError::in_fn(
            &f.name,
            "assembly blocks cannot be routed through a monitored wrapper",
        ));
    }
    match f.kind {
        FunctionKind::Fallback | FunctionKind::Receive if !f.params.is_empty() => {
            Err(InstrumentationError::in_fn(
                &f.name,
                "parameterized fallback functions are not supported",
            ))
        }
        _ => {
            if let Some(p) = f.params.iter().find(|p| p.name.is_empty()) {
                return Err(InstrumentationError::in_fn(
                    &f.name,
                    format!("unnamed parameter of type '{}' cannot be forwarded", p.ty),
                ));
            }
            Ok(())
        }
    }
}

/// Monitor state lives in storage so it survives between transactions. Call
/// flags do not: they are per-transaction locals, declared in each prologue.
fn declarations(set: &MonitorSet, plan: &Plan) -> String {
    let mut out = String::new();
    if plan.uses_guard {
        out.push_str(&format!("\n    bool private {GUARD_VAR};"));
    }
    for h in &set.history {
        if h.init {
            out.push_str(&format!("\n    bool private {} = true;", h.name));
        } else {
            out.push_str(&format!("\n    bool private {};", h.name));
        }
    }
    out.push('\n');
    out
}

/// The carrier keeps modifiers and the returns clause but becomes internal;
/// `payable` comes off since the wrapper receives the value.
fn carrier_attrs(attrs: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut vis_done = false;
    for tok in attrs.split_whitespace() {
        match tok {
            "public" | "external" | "internal" | "private" if !vis_done => {
                out.push("internal");
                vis_done = true;
            }
            "payable" => {}
            other => out.push(other),
        }
    }
    if !vis_done {
        out.insert(0, "internal");
    }
    out.join(" ")
}

fn wrapper(
    src: &str,
    f: &Function,
    set: &MonitorSet,
    plan: &Plan,
    opts: &InstrumentOptions,
) -> String {
    let mut body: Vec<String> = Vec::new();

    // Prologue: per-transaction call flags, then pre-state snapshots. The
    // flag block is identical in every wrapper except for the entry's own
    // flag being raised.
    for flag in &plan.called {
        body.push(format!("bool {flag}Called = false;"));
    }
    if plan.called.iter().any(|c| *c == f.name) {
        body.push(format!("{}Called = true;", f.name));
    }
    for s in &plan.snapshots {
        body.push(format!(
            "{}{} {} = {};",
            s.ty,
            data_location(&s.ty),
            s.name,
            s.expr
        ));
    }

    // The carried original body. All of its returns stay inside the carrier,
    // so the epilogue below runs on every path.
    let ret_types = f.returns.as_deref().map(return_types).unwrap_or_default();
    let ret_names: Vec<String> = match ret_types.len() {
        0 => Vec::new(),
        1 => vec!["__ret".to_string()],
        n => (0..n).map(|i| format!("__ret_{i}")).collect(),
    };
    let args: Vec<&str> = f.params.iter().map(|p| p.name.as_str()).collect();
    let call = format!("__impl_{}({})", f.name, args.join(", "));
    match ret_names.len() {
        0 => body.push(format!("{call};")),
        1 => body.push(format!("{} = {call};", ret_names[0])),
        _ => body.push(format!("({}) = {call};", ret_names.join(", "))),
    }

    // Epilogue: guard write, read pass, update pass, one assertion over the
    // conjunction of all goals.
    if plan.uses_guard {
        body.push(format!("{GUARD_VAR} = true;"));
    }
    for (k, g) in set.goals.iter().enumerate() {
        body.push(format!("bool __goal_{k} = {};", render(&g.goal, set, plan)));
    }
    for (i, h) in set.history.iter().enumerate() {
        body.push(format!("bool __u_{i} = {};", render(&h.update, set, plan)));
    }
    for (i, h) in set.history.iter().enumerate() {
        body.push(format!("{} = __u_{i};", h.name));
    }
    let conj: Vec<String> = (0..set.goals.len()).map(|k| format!("__goal_{k}")).collect();
    if !conj.is_empty() {
        if opts.for_symbolic_exec {
            body.push(format!("if (!({})) {{ assert(false); }}", conj.join(" && ")));
        } else {
            body.push(format!("assert({});", conj.join(" && ")));
        }
    }

    let header = wrapper_header(src, f, &ret_types, &ret_names);
    let mut out = format!("\n\n    {header} {{");
    for line in body {
        out.push_str("\n        ");
        out.push_str(&line);
    }
    out.push_str("\n    }");
    out
}

fn wrapper_header(src: &str, f: &Function, ret_types: &[String], ret_names: &[String]) -> String {
    match f.kind {
        FunctionKind::Fallback | FunctionKind::Receive => {
            format!("{}() {}", f.name, f.attrs)
        }
        _ => {
            let params =
                &src[f.params_span.offset()..f.params_span.offset() + f.params_span.len()];
            let vis = match f.visibility {
                Visibility::External => "external",
                _ => "public",
            };
            let mut header = format!("function {}({}) {vis}", f.name, params.trim());
            if f.attrs.split_whitespace().any(|t| t == "payable") {
                header.push_str(" payable");
            }
            if !ret_types.is_empty() {
                let list: Vec<String> = ret_types
                    .iter()
                    .zip(ret_names)
                    .map(|(ty, name)| format!("{ty} {name}"))
                    .collect();
                header.push_str(&format!(" returns ({})", list.join(", ")));
            }
            header
        }
    }
}

fn render(expr: &tempo_monitor::BoolExpr, set: &MonitorSet, plan: &Plan) -> String {
    expr.render(
        &mut |a: &Atom| {
            a.render(
                // Plan::collect visited this same atom, so the lookup holds.
                |e| match plan.snapshot_named(e) {
                    Some(s) => s.name.clone(),
                    None => e.to_string(),
                },
                |f| format!("{f}Called"),
            )
        },
        &mut |i| set.history[i].name.clone(),
    )
}

/// Reference types need an explicit data location on locals.
fn data_location(ty: &str) -> &'static str {
    let ty = ty.trim();
    if ty == "string" || ty == "bytes" || ty.ends_with(']') {
        " memory"
    } else {
        ""
    }
}

/// Entry types of a returns list body (no outer parens), declared names
/// dropped. `uint256 amount, bool ok` becomes `["uint256", "bool"]`.
fn return_types(list: &str) -> Vec<String> {
    split_top_level(list)
        .into_iter()
        .map(|entry| {
            let toks: Vec<&str> = entry.split_whitespace().collect();
            match toks.as_slice() {
                [.., name]
                    if toks.len() >= 2
                        && is_ident(name)
                        && !matches!(*name, "memory" | "calldata" | "storage" | "payable") =>
                {
                    toks[..toks.len() - 1].join(" ")
                }
                _ => toks.join(" "),
            }
        })
        .collect()
}

fn split_top_level(list: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in list.bytes().enumerate() {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                out.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = list[start..].trim();
    if !last.is_empty() {
        out.push(last);
    }
    out
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && !s.as_bytes()[0].is_ascii_digit()
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_monitor::synthesize_all;
    use tempo_parse::parse_formula;
    use tempo_sol::read_contract;

    const TOKEN: &str = r#"
pragma solidity ^0.8.0;

contract Token {
    uint256 public totalSupply;
    mapping(address => uint256) balances;
    bool paused;

    constructor(uint256 initial) {
        totalSupply = initial;
        balances[msg.sender] = initial;
    }

    function transfer(address to, uint256 amount) public returns (bool) {
        if (paused) {
            return false;
        }
        balances[msg.sender] -= amount;
        balances[to] += amount;
        return true;
    }

    function pause() external {
        paused = true;
    }
}
"#;

    fn instrumented(formulas: &[&str], opts: &InstrumentOptions) -> String {
        let contract = read_contract(TOKEN, None).unwrap();
        let parsed: Vec<_> = formulas
            .iter()
            .map(|s| parse_formula(s).unwrap())
            .collect();
        let set = synthesize_all(&parsed);
        instrument(TOKEN, &contract, &set, opts).unwrap()
    }

    #[test]
    fn entry_points_are_split_into_carrier_and_wrapper() {
        let out = instrumented(&["Once paused"], &InstrumentOptions::default());

        // Carrier: renamed, internal, body byte-for-byte.
        assert!(out.contains("function __impl_transfer(address to, uint256 amount) internal returns (bool) {"));
        assert!(out.contains("balances[msg.sender] -= amount;"));
        assert!(out.contains("function __impl_pause() internal {"));

        // Wrapper: original signature, named return, forwards arguments.
        assert!(out.contains("function transfer(address to, uint256 amount) public returns (bool __ret) {"));
        assert!(out.contains("__ret = __impl_transfer(to, amount);"));
        assert!(out.contains("function pause() external {"));
        assert!(out.contains("__impl_pause();"));
    }

    #[test]
    fn constructor_is_left_alone_without_a_guard() {
        let out = instrumented(&["Once paused"], &InstrumentOptions::default());
        assert!(out.contains("constructor(uint256 initial) {"));
        assert!(!out.contains("__impl_constructor"));
    }

    #[test]
    fn guard_gets_an_explicit_constructor_write() {
        let out = instrumented(
            &["notConstructor -> Once paused"],
            &InstrumentOptions::default(),
        );
        let write = out.find("notConstructor = false;").unwrap();
        let ctor_close = out.find("function transfer").unwrap();
        assert!(write < ctor_close, "the write belongs to the constructor");
    }

    #[test]
    fn history_declarations_carry_empty_history_defaults() {
        let out = instrumented(
            &["Hist (totalSupply >= 0)", "Once paused"],
            &InstrumentOptions::default(),
        );
        assert!(out.contains("bool private __h_hist_0 = true;"));
        assert!(out.contains("bool private __h_once_1;"));
    }

    #[test]
    fn epilogue_reads_all_goals_before_writing_history() {
        let out = instrumented(&["Once paused"], &InstrumentOptions::default());

        let goal = out.find("bool __goal_0 = (__h_once_0 || (paused));").unwrap();
        let update = out.find("bool __u_0 = ").unwrap();
        let write = out.find("__h_once_0 = __u_0;").unwrap();
        let check = out.find("assert(__goal_0);").unwrap();
        assert!(goal < update && update < write && write < check);
    }

    #[test]
    fn guard_is_declared_and_raised_before_the_read_pass() {
        let out = instrumented(
            &["notConstructor -> Once paused"],
            &InstrumentOptions::default(),
        );
        assert!(out.contains("bool private notConstructor;"));
        let raise = out.find("notConstructor = true;").unwrap();
        let goal = out.find("bool __goal_0").unwrap();
        assert!(raise < goal);
    }

    #[test]
    fn unguarded_formulas_get_no_guard_state() {
        let out = instrumented(&["Once paused"], &InstrumentOptions::default());
        assert!(!out.contains("notConstructor"));
    }

    #[test]
    fn call_flags_are_per_transaction_locals() {
        let out = instrumented(
            &["transferCalled -> totalSupply == Old(totalSupply)"],
            &InstrumentOptions::default(),
        );
        // Declared false in every wrapper's prologue, never in storage.
        assert_eq!(out.matches("bool transferCalled = false;").count(), 2);
        assert!(!out.contains("bool private transferCalled"));
        // Raised only in transfer's own wrapper.
        assert_eq!(out.matches("transferCalled = true;").count(), 1);
    }

    #[test]
    fn snapshots_capture_pre_state_in_every_wrapper() {
        let out = instrumented(
            &["transferCalled -> totalSupply == Old(totalSupply)"],
            &InstrumentOptions::default(),
        );
        assert_eq!(out.matches("uint256 __old_0 = totalSupply;").count(), 2);

        // Snapshot binding precedes the carrier call.
        let snap = out.find("uint256 __old_0 = totalSupply;").unwrap();
        let call = out.find("__ret = __impl_transfer(to, amount);").unwrap();
        assert!(snap < call);
    }

    #[test]
    fn mapping_snapshots_use_the_value_type() {
        let out = instrumented(
            &["Old(balances[msg.sender]) >= balances[msg.sender] || paused"],
            &InstrumentOptions::default(),
        );
        assert!(out.contains("uint256 __old_0 = balances[msg.sender];"));
    }

    #[test]
    fn symbolic_form_branches_instead_of_asserting_directly() {
        let out = instrumented(
            &["Once paused"],
            &InstrumentOptions {
                for_symbolic_exec: true,
            },
        );
        assert!(out.contains("if (!(__goal_0)) { assert(false); }"));
        assert!(!out.contains("assert(__goal_0);"));
    }

    #[test]
    fn assembly_bodies_are_rejected() {
        let src = r#"
contract C {
    function f() public {
        assembly { mstore(0, 1) }
    }
}
"#;
        let contract = read_contract(src, None).unwrap();
        let set = synthesize_all(&[parse_formula("Once (true)").unwrap()]);
        let err = instrument(src, &contract, &set, &InstrumentOptions::default()).unwrap_err();
        assert!(err.message.contains("assembly"));
    }

    #[test]
    fn fallback_is_wrapped_like_any_entry() {
        let src = r#"
contract C {
    uint256 public hits;
    fallback() external payable {
        hits += 1;
    }
}
"#;
        let contract = read_contract(src, None).unwrap();
        let set = synthesize_all(&[parse_formula("Once (hits > 0)").unwrap()]);
        let out = instrument(src, &contract, &set, &InstrumentOptions::default()).unwrap();
        assert!(out.contains("function __impl_fallback() internal {"));
        assert!(out.contains("fallback() external payable {"));
        assert!(out.contains("__impl_fallback();"));
    }
}
