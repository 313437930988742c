//! Regex literals, match operators and hoisted patterns.

use super::harness::*;
use quill_engine::{CompileErrorKind, CompilerSettings, EngineError, Value};
use std::sync::Arc;

const PATTERN_SCRIPT: &str = "Pattern p = /ab+c/; return p;";

fn pattern_of(value: Value) -> Arc<regex::Regex> {
    match value {
        Value::Pattern(regex) => regex,
        other => panic!("expected a pattern, got {:?}", other),
    }
}

#[test]
fn test_match_operators() {
    expect_bool("return 'a' ==~ /a/;", true);
    expect_bool("return 'xabcx' =~ /abc/;", true);
    expect_bool("return 'xabcx' ==~ /abc/;", false);
}

#[test]
fn test_matcher_groups() {
    expect_string(
        "Pattern p = /([0-9]+)/; Matcher m = p.matcher('order 66'); if (m.find()) { return m.group(1); } return 'none';",
        "66",
    );
}

#[test]
fn test_hoisted_pattern_is_shared() {
    let script = compile(PATTERN_SCRIPT).unwrap();
    assert!(script.code().static_slots >= 1);
    assert!(script.code().static_init.is_some());

    let first = pattern_of(run(&script, empty_params()).unwrap());
    let second = pattern_of(run(&script, empty_params()).unwrap());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.as_str(), "ab+c");
}

#[test]
fn test_unhoisted_pattern_compiles_per_execution() {
    let script = compile_with(PATTERN_SCRIPT, CompilerSettings::default().with_optimize(false)).unwrap();
    assert_eq!(script.code().static_slots, 0);
    let first = pattern_of(run(&script, empty_params()).unwrap());
    let second = pattern_of(run(&script, empty_params()).unwrap());
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn test_separate_compiles_do_not_share_statics() {
    let a = compile(PATTERN_SCRIPT).unwrap();
    let b = compile(PATTERN_SCRIPT).unwrap();
    assert!(!Arc::ptr_eq(a.unit(), b.unit()));
    let from_a = pattern_of(run(&a, empty_params()).unwrap());
    let from_b = pattern_of(run(&b, empty_params()).unwrap());
    assert!(!Arc::ptr_eq(&from_a, &from_b));
}

#[test]
fn test_regex_disabled() {
    match compile_with("return 'a' ==~ /a/;", CompilerSettings::default().with_regex(false)) {
        Err(E2EError::Engine(EngineError::Compile(err))) => assert_eq!(err.kind, CompileErrorKind::Disabled),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("regex compiled with regexes disabled"),
    }
}

#[test]
fn test_invalid_pattern_is_compile_error() {
    let err = expect_compile_error("return 'a' ==~ /(unclosed/;");
    assert!(err.message.contains("(unclosed"), "{}", err.message);
}
