//! Script-declared functions and lambdas.

use super::harness::*;
use quill_engine::Value;

// ============================================================================
// Declared functions
// ============================================================================

#[test]
fn test_simple_function() {
    expect_int("int f() { return 1; } return f();", 1);
}

#[test]
fn test_forward_reference() {
    expect_int("int a() { return b() + 1; } int b() { return 2; } return a();", 3);
}

#[test]
fn test_recursion() {
    expect_int(
        "int fib(int n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); } return fib(10);",
        55,
    );
}

#[test]
fn test_function_with_parameters() {
    expect_int("int add(int a, int b) { return a + b; } return add(40, 2);", 42);
}

// ============================================================================
// Lambdas
// ============================================================================

#[test]
fn test_lambda_expression_body() {
    expect_int("Function f = v -> v * 2; return f.apply(21);", 42);
}

#[test]
fn test_lambda_block_body() {
    expect_int("BiFunction f = (a, b) -> { return a + b; }; return f.apply(40, 2);", 42);
}

#[test]
fn test_capture_is_by_value() {
    expect_int("int x = 1; Supplier s = () -> x; x = 2; return s.get();", 1);
}

#[test]
fn test_captured_variable_in_remove_if() {
    let value = compile_and_run(
        "int base = 3; List l = new ArrayList(); l.add(1); l.add(5); l.add(2); l.add(9); l.removeIf(v -> v > base); return l;",
    )
    .unwrap();
    assert_eq!(value.to_json(), serde_json::json!([1, 2]));
}

#[test]
fn test_sort_with_comparator() {
    let value = compile_and_run(
        "List l = new ArrayList(); l.add(3); l.add(1); l.add(2); l.sort((a, b) -> a - b); return l;",
    )
    .unwrap();
    assert_eq!(value.to_json(), serde_json::json!([1, 2, 3]));
}

#[test]
fn test_assign_to_capture_rejected() {
    let err = expect_compile_error("int x = 1; Supplier s = () -> { x = 2; return x; }; return s.get();");
    assert!(err.message.contains("Cannot assign to captured variable"), "{}", err.message);
}

#[test]
fn test_lambda_returned_to_host_is_function_value() {
    let value = compile_and_run("Supplier s = () -> 1; return s;").unwrap();
    assert!(matches!(value, Value::Function(_)));
}

#[test]
fn test_function_reference() {
    let value = compile_and_run(
        "int desc(def a, def b) { return b - a; } List l = [1, 3, 2]; l.sort(this::desc); return l;",
    )
    .unwrap();
    assert_eq!(value.to_json(), serde_json::json!([3, 2, 1]));
}
