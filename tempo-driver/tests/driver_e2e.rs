//! End-to-end driver runs against a scripted fake back-end.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempo_backend::{Backend, VerifierConfig};
use tempo_driver::{run, DriverError, Outcome, RunConfig};

const TOKEN: &str = r#"
pragma solidity ^0.8.0;

contract Token {
    uint256 public totalSupply;
    mapping(address => uint256) balances;

    constructor() {
        totalSupply = 1;
        balances[msg.sender] = 1;
    }

    function mint(address to, uint256 amt) public {
        balances[to] += amt;
    }
}
"#;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("backend.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config(dir: &Path, script: &Path, timeout: Option<Duration>) -> RunConfig {
    let source_path = dir.join("Token.sol");
    fs::write(&source_path, TOKEN).unwrap();
    RunConfig {
        source_path,
        contract_name: Some("Token".to_string()),
        ctor_args: None,
        predicates: vec!["Old(totalSupply) == totalSupply || mintCalled".to_string()],
        instrument: true,
        for_symbolic_exec: false,
        backend: Backend::Verifier(VerifierConfig {
            command: script.to_string_lossy().into_owned(),
            timeout,
            ..VerifierConfig::default()
        }),
        cleanup: true,
        suppress_noops: false,
    }
}

#[test]
fn proof_is_a_clean_exit() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), r#"echo "Proof found""#);
    let res = run(&config(dir.path(), &script, None)).unwrap();
    assert_eq!(res.outcome, Outcome::Proven);
    assert_eq!(res.outcome.exit_code(), 0);
    assert_eq!(res.backend_output.len(), 1);
}

#[test]
fn vacuous_counterexample_retries_under_the_guard() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        r#"d="$(dirname "$0")"
if [ -f "$d/ran" ]; then
  cp "$1" "$d/second.sol"
  echo "Proof found"
else
  : > "$d/ran"
  echo "Found a counterexample:"
  echo "Token.sol(3,1): : Token::Constructor (this=T0, msg.sender=A0)"
fi"#,
    );

    let res = run(&config(dir.path(), &script, None)).unwrap();
    assert_eq!(res.outcome, Outcome::Proven);
    assert_eq!(res.backend_output.len(), 2, "one retry under the guard");

    // The second invocation saw a guarded instrumentation.
    let second = fs::read_to_string(dir.path().join("second.sol")).unwrap();
    assert!(second.contains("bool private notConstructor;"));
    assert!(second.contains("notConstructor = true;"));
}

#[test]
fn real_counterexample_stops_with_the_trace() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        r#"echo "Found a counterexample:"
echo "Token.sol(3,1): : Token::Constructor (this=T0, msg.sender=A0)"
echo "Token.sol(9,5): : Token::mint (this=T0, msg.sender=A1, to=A2, amt=583)"
echo "Token.sol(99,5): ASSERTION FAILS""#,
    );

    let res = run(&config(dir.path(), &script, None)).unwrap();
    let Outcome::CounterExample { trace, vacuous } = res.outcome else {
        panic!("expected a counterexample");
    };
    assert!(!vacuous);
    assert_eq!(trace.steps.len(), 2);
    assert_eq!(trace.steps[1].function, "mint");
    assert_eq!(trace.steps[1].args[1], ("amt".to_string(), "583".to_string()));
}

#[test]
fn timeout_exhausts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "sleep 30");
    let res = run(&config(
        dir.path(),
        &script,
        Some(Duration::from_millis(100)),
    ))
    .unwrap();
    assert_eq!(res.outcome, Outcome::Exhausted { last: None });
    assert_eq!(res.outcome.exit_code(), 3);
}

#[test]
fn bad_predicate_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), r#"echo "Proof found""#);
    let mut cfg = config(dir.path(), &script, None);
    cfg.predicates = vec!["Once &&".to_string()];
    let err = run(&cfg).unwrap_err();
    assert!(matches!(err, DriverError::Parse(_)));
    // The predicate text rides along so the report can point into it.
    assert!(miette::Diagnostic::source_code(&err).is_some());
}

#[test]
fn garbage_backend_output_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), r#"echo "segfault""#);
    let err = run(&config(dir.path(), &script, None)).unwrap_err();
    assert!(matches!(err, DriverError::Output(_)));
}
