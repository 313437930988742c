//! Resource limits and uniform fault translation.

use super::harness::*;
use quill_engine::vm::exception::HEADER_SCRIPT_STACK;
use quill_engine::{CompilerSettings, Value};

const SUM_LOOP: &str = "int s = 0; for (int i = 0; i < 100; i++) { s += i; } return s;";

// ============================================================================
// Loop counter
// ============================================================================

#[test]
fn test_loop_counter_faults() {
    let settings = CompilerSettings::default().with_max_loop_counter(10);
    let exception = expect_exception_with(SUM_LOOP, settings, empty_params());
    assert_eq!(exception.class_name, "TooManyOperationsError");
    assert!(exception.is_sandbox_fault());
}

#[test]
fn test_loop_counter_disabled() {
    let settings = CompilerSettings::default().with_max_loop_counter(0);
    let value = compile_and_run_with(SUM_LOOP, settings, empty_params()).unwrap();
    assert_eq!(value, Value::Int(4950));
}

#[test]
fn test_loop_budget_resets_per_execution() {
    let script = compile_with(SUM_LOOP, CompilerSettings::default().with_max_loop_counter(150)).unwrap();
    let instance = script.factory(Vec::new()).unwrap().new_instance().unwrap();
    for _ in 0..3 {
        assert_eq!(instance.execute(vec![empty_params()]).unwrap(), Value::Int(4950));
    }
}

#[test]
fn test_loop_counter_is_not_catchable() {
    let settings = CompilerSettings::default().with_max_loop_counter(50);
    let exception = expect_exception_with(
        "int i = 0; try { while (true) { i++; } } catch (Exception e) { return -1; }",
        settings,
        empty_params(),
    );
    assert_eq!(exception.class_name, "TooManyOperationsError");
}

#[test]
fn test_loop_counter_counts_recursion() {
    let settings = CompilerSettings::default().with_max_loop_counter(20);
    let exception = expect_exception_with(
        "int down(int n) { if (n == 0) { return 0; } return down(n - 1); } return down(100);",
        settings,
        empty_params(),
    );
    assert!(exception.is_sandbox_fault(), "{}", exception);
}

// ============================================================================
// Other limits
// ============================================================================

#[test]
fn test_unbounded_recursion_overflows() {
    let settings = CompilerSettings::default().with_max_call_depth(32).with_max_loop_counter(0);
    let exception = expect_exception_with("int f(int n) { return f(n + 1); } return f(0);", settings, empty_params());
    assert_eq!(exception.class_name, "StackOverflowError");
    assert!(exception.is_sandbox_fault());
}

#[test]
fn test_default_settings_recursion_overflows() {
    let exception = expect_exception_with(
        "int f(int n) { return f(n + 1); } return f(0);",
        CompilerSettings::default(),
        empty_params(),
    );
    assert_eq!(exception.class_name, "StackOverflowError");
    assert!(exception.is_sandbox_fault());
}

#[test]
fn test_deepest_call_depth_still_overflows_cleanly() {
    let settings = CompilerSettings::default()
        .with_max_call_depth(quill_engine::settings::MAX_CALL_DEPTH_LIMIT)
        .with_max_loop_counter(0);
    let exception = expect_exception_with("int f(int n) { return f(n + 1); } return f(0);", settings, empty_params());
    assert_eq!(exception.class_name, "StackOverflowError");
}

#[test]
fn test_recursion_through_native_callback_overflows() {
    let exception = expect_exception_with(
        "void walk(List l) { l.forEach(x -> { walk(l); }); } List l = new ArrayList(); l.add(1); walk(l); return 0;",
        CompilerSettings::default(),
        empty_params(),
    );
    assert_eq!(exception.class_name, "StackOverflowError");
}

#[test]
fn test_oversized_array() {
    let settings = CompilerSettings::default().with_max_array_length(10);
    let exception = expect_exception_with("int[] a = new int[100]; return a.length;", settings, empty_params());
    assert_eq!(exception.class_name, "OutOfMemoryError");
}

// ============================================================================
// Fault translation
// ============================================================================

#[test]
fn test_runtime_faults_become_script_exceptions() {
    let cases = [
        ("throw new IllegalArgumentException('user');", "IllegalArgumentException"),
        ("return 10 / params.get('zero');", "ArithmeticException"),
        ("String s = null; return s.length();", "NullPointerException"),
        ("def x = null; return x.length();", "NullPointerException"),
        ("List l = new ArrayList(); return l.get(3);", "IndexOutOfBoundsException"),
    ];
    for (source, class_name) in cases {
        let exception = expect_exception_with(source, CompilerSettings::default(), params(r#"{"zero": 0}"#));
        assert_eq!(exception.class_name, class_name, "{}", source);
        assert!(exception.header(HEADER_SCRIPT_STACK).is_some(), "no stack for {}", source);
        assert!(!exception.is_sandbox_fault(), "{}", source);
    }
}

#[test]
fn test_script_stack_points_into_source() {
    let source = "int a = 1;\nString s = null;\nreturn s.length();";
    let exception = expect_exception(source, "NullPointerException");
    let stack = exception.header(HEADER_SCRIPT_STACK).unwrap();
    assert!(stack[0].contains("s.length()"), "{:?}", stack);
}
