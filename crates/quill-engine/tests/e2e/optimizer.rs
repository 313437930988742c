//! Optimized and unoptimized builds agree; the optimized one does less work.

use super::harness::*;
use quill_engine::{CompilerSettings, Value};

fn both(source: &str) -> (Value, Value) {
    let optimized = compile_and_run_with(source, CompilerSettings::default(), empty_params()).unwrap();
    let plain = compile_and_run_with(source, CompilerSettings::default().with_optimize(false), empty_params()).unwrap();
    (optimized, plain)
}

#[test]
fn test_constant_folding() {
    let source = "return 1 + 2 * 3;";
    let (optimized, plain) = both(source);
    assert_eq!(optimized, Value::Int(7));
    assert_eq!(plain, Value::Int(7));

    let folded = compile(source).unwrap().code().disassemble();
    assert!(!folded.contains("MUL"), "{}", folded);
    let unfolded = compile_with(source, CompilerSettings::default().with_optimize(false))
        .unwrap()
        .code()
        .disassemble();
    assert!(unfolded.contains("MUL"), "{}", unfolded);
}

#[test]
fn test_folding_keeps_division_by_zero() {
    expect_exception("return 1 / 0;", "ArithmeticException");
}

#[test]
fn test_builds_agree() {
    let sources = [
        "int x = 5; return x * (2 + 3) - 1;",
        "String a = 'x'; String b = 'y'; return a + b + a + b;",
        "long big = 1L << 40; return big + 1;",
        "boolean t = 3 > 2 && 'a' == 'a'; return t;",
        "double d = 1.5 * 4; return d;",
    ];
    for source in sources {
        let (optimized, plain) = both(source);
        assert_eq!(optimized, plain, "{}", source);
    }
}

#[test]
fn test_concat_chain_is_single_instruction() {
    let script = compile("String a = 'x'; String b = 'y'; return a + b + a + b;").unwrap();
    let listing = script.code().disassemble();
    assert_eq!(listing.matches("CONCAT").count(), 1, "{}", listing);
    assert!(listing.contains("CONCAT 4"), "{}", listing);
    assert_eq!(run(&script, empty_params()).unwrap().as_str(), Some("xyxy"));
}

#[test]
fn test_optimized_flag_recorded() {
    assert!(compile("return 1;").unwrap().code().flags & quill_engine::compiler::bytecode::flags::OPTIMIZED != 0);
    let plain = compile_with("return 1;", CompilerSettings::default().with_optimize(false)).unwrap();
    assert_eq!(plain.code().flags & quill_engine::compiler::bytecode::flags::OPTIMIZED, 0);
}
