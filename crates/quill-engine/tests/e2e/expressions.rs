//! Literals, operators, strings, collections and casts.

use super::harness::*;
use quill_engine::Value;

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_int_locals() {
    expect_int("int a = 1;\nint b = 2;\nreturn a + b;", 3);
}

#[test]
fn test_postfix_increment_returns_old_value() {
    expect_int("int i = 0; int j = i++; return j;", 0);
}

#[test]
fn test_int_overflow_wraps() {
    expect_int("int x = Integer.MAX_VALUE; x += 1; return x;", i32::MIN);
}

#[test]
fn test_long_promotion() {
    expect_value("int a = 2; long b = 3; return a * b;", Value::Long(6));
}

#[test]
fn test_double_division() {
    expect_value("double d = 7; return d / 2;", Value::Double(3.5));
}

#[test]
fn test_def_arithmetic() {
    expect_int("def a = 40; def b = 2; return a + b;", 42);
}

#[test]
fn test_static_constant() {
    expect_int("return Integer.MAX_VALUE;", i32::MAX);
}

// ============================================================================
// Strings
// ============================================================================

#[test]
fn test_string_concatenation() {
    expect_string("String a = 'x'; int n = 4; return a + n + 'y';", "x4y");
}

#[test]
fn test_dynamic_string_method() {
    expect_int("def x = 'abc'; return x.length();", 3);
}

#[test]
fn test_string_methods() {
    expect_string("String s = ' Hello '; return s.trim().toUpperCase();", "HELLO");
}

// ============================================================================
// Collections
// ============================================================================

#[test]
fn test_list_add_and_get() {
    expect_int("List l = new ArrayList(); l.add(5); l.add(7); return l.get(1);", 7);
}

#[test]
fn test_map_index_syntax() {
    expect_int("Map m = new HashMap(); m.put('a', 1); m['b'] = 2; return m.get('a') + m['b'];", 3);
}

#[test]
fn test_array_index_and_length() {
    expect_int("int[] a = new int[3]; a[0] = 5; a[2] = 7; return a[0] + a[2] + a.length;", 15);
}

#[test]
fn test_array_initializer() {
    expect_int("int[] a = new int[] {4, 5, 6}; return a[1];", 5);
}

#[test]
fn test_list_result_is_returned_to_host() {
    let value = compile_and_run("List l = new ArrayList(); l.add(1); l.add('two'); return l;").unwrap();
    assert_eq!(value.to_json(), serde_json::json!([1, "two"]));
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_params_lookup() {
    let value = compile_and_run_with(
        "return params.get('x');",
        Default::default(),
        params(r#"{"x": "hello"}"#),
    )
    .unwrap();
    assert_eq!(value.as_str(), Some("hello"));
}

#[test]
fn test_params_arithmetic() {
    let value = compile_and_run_with(
        "int n = params.get('n'); return n * 2;",
        Default::default(),
        params(r#"{"n": 21}"#),
    )
    .unwrap();
    assert_eq!(value, Value::Int(42));
}

// ============================================================================
// Casts
// ============================================================================

#[test]
fn test_explicit_narrowing_cast() {
    expect_int("double d = 9.75; return (int) d;", 9);
}

#[test]
fn test_bad_def_cast_is_class_cast() {
    expect_exception("def s = 'text'; List l = s; return l;", "ClassCastException");
}

#[test]
fn test_instanceof() {
    expect_bool("def s = 'text'; return s instanceof String;", true);
}

// ============================================================================
// Initializers and null-safe operators
// ============================================================================

#[test]
fn test_list_initializer() {
    expect_int("def l = [1, 2, 3]; return l.size();", 3);
}

#[test]
fn test_map_initializer() {
    expect_int("def m = ['a': 1, 'b': 2]; return m['b'];", 2);
}

#[test]
fn test_elvis() {
    expect_int("def x = null; return x ?: 5;", 5);
}

#[test]
fn test_null_safe_call() {
    expect_value("def s = null; return s?.length();", Value::Null);
}

#[test]
fn test_equality_versus_identity() {
    expect_bool("List a = new ArrayList(); List b = new ArrayList(); return a == b;", true);
    expect_bool("List a = new ArrayList(); List b = new ArrayList(); return a === b;", false);
}
