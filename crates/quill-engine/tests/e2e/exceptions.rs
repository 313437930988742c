//! throw, try/catch and the exceptions the host receives.

use super::harness::*;
use quill_engine::vm::exception::{HEADER_POSITION, HEADER_SCRIPT, HEADER_SCRIPT_STACK};
use quill_engine::CompilerSettings;

// ============================================================================
// Catching
// ============================================================================

#[test]
fn test_catch_thrown_exception() {
    expect_string(
        "try { throw new IllegalArgumentException('boom'); } catch (IllegalArgumentException e) { return e.getMessage(); }",
        "boom",
    );
}

#[test]
fn test_catch_by_supertype() {
    expect_string(
        "try { int n = Integer.parseInt('nope'); return n; } catch (IllegalArgumentException e) { return 'caught'; }",
        "caught",
    );
}

#[test]
fn test_catch_clause_order() {
    expect_int(
        "try { throw new IllegalStateException('s'); }
         catch (IllegalArgumentException e) { return 1; }
         catch (RuntimeException e) { return 2; }",
        2,
    );
}

#[test]
fn test_catch_arithmetic_from_runtime() {
    let value = compile_and_run_with(
        "int d = params.get('zero'); try { return 1 / d; } catch (ArithmeticException e) { return -1; }",
        CompilerSettings::default(),
        params(r#"{"zero": 0}"#),
    )
    .unwrap();
    assert_eq!(value.as_int(), Some(-1));
}

#[test]
fn test_uncaught_type_propagates() {
    let exception = expect_exception(
        "try { throw new IllegalStateException('bad'); } catch (IllegalArgumentException e) { return 1; }",
        "IllegalStateException",
    );
    assert_eq!(exception.message, "bad");
}

#[test]
fn test_exception_thrown_in_function() {
    let exception = expect_exception(
        "int check(int n) { if (n < 0) { throw new IllegalArgumentException('negative'); } return n; }
         return check(-1);",
        "IllegalArgumentException",
    );
    assert_eq!(exception.message, "negative");
}

// ============================================================================
// Host view
// ============================================================================

#[test]
fn test_uncaught_throw_carries_headers() {
    let source = "int x = 1;\nthrow new IllegalStateException('bad');";
    let exception = expect_exception(source, "IllegalStateException");
    assert_eq!(exception.message, "bad");
    assert!(!exception.is_sandbox_fault());
    assert_eq!(exception.header(HEADER_SCRIPT).unwrap(), &[source.to_string()]);
    assert!(exception.header(HEADER_SCRIPT_STACK).is_some());
    let position: usize = exception.header(HEADER_POSITION).unwrap()[0].parse().unwrap();
    assert!(position >= source.find("throw").unwrap(), "position {}", position);
}

#[test]
fn test_exception_json() {
    let exception = expect_exception("throw new IllegalStateException('bad');", "IllegalStateException");
    let json = exception.to_json();
    assert_eq!(json["class"], "IllegalStateException");
    assert_eq!(json["message"], "bad");
}

// ============================================================================
// Runtime failures
// ============================================================================

#[test]
fn test_missing_dynamic_method_is_catchable() {
    expect_string(
        "def x = 1; try { x.nope(); } catch (IllegalArgumentException e) { return 'caught'; } return 'none';",
        "caught",
    );
    expect_string(
        "def x = 1; try { x.nope(); } catch (Exception e) { return 'caught'; } return 'none';",
        "caught",
    );
}

#[test]
fn test_missing_dynamic_field_names_the_field() {
    let exception = expect_exception("def x = 'abc'; return x.nope;", "IllegalArgumentException");
    assert!(exception.message.contains("[nope]"), "{}", exception.message);
    assert!(!exception.message.contains("isNope"), "{}", exception.message);
}

#[test]
fn test_negative_array_length() {
    let exception = expect_exception("int n = -1; int[] a = new int[n]; return a.length;", "NegativeArraySizeException");
    assert!(exception.message.contains("-1"), "{}", exception.message);
    expect_string(
        "int n = -1; try { int[] a = new int[n]; return 'none'; } catch (RuntimeException e) { return 'caught'; }",
        "caught",
    );
}
