//! Conditionals and loops.

use super::harness::*;

// ============================================================================
// Conditionals
// ============================================================================

#[test]
fn test_if_else() {
    let script = compile("int n = params.get('n'); if (n > 5) { return 'big'; } else { return 'small'; }").unwrap();
    assert_eq!(run(&script, params(r#"{"n": 7}"#)).unwrap().as_str(), Some("big"));
    assert_eq!(run(&script, params(r#"{"n": 2}"#)).unwrap().as_str(), Some("small"));
}

#[test]
fn test_ternary() {
    let script = compile("int n = params.get('n'); return n % 2 == 0 ? 'even' : 'odd';").unwrap();
    assert_eq!(run(&script, params(r#"{"n": 4}"#)).unwrap().as_str(), Some("even"));
}

#[test]
fn test_extraneous_if_rejected() {
    let err = expect_compile_error("if (true) { return 1; } return 2;");
    assert!(err.message.contains("Extraneous if statement"), "{}", err.message);
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn test_for_loop_sum() {
    expect_int("int s = 0; for (int i = 0; i < 10; i++) { s += i; } return s;", 45);
}

#[test]
fn test_while_loop() {
    expect_int("int n = 1; while (n < 100) { n *= 2; } return n;", 128);
}

#[test]
fn test_do_while_runs_once() {
    expect_int("int n = 10; do { n++; } while (n < 5); return n;", 11);
}

#[test]
fn test_foreach_over_array() {
    expect_int("int s = 0; int[] a = new int[] {1, 2}; for (int v : a) { s += v; } return s;", 3);
}

#[test]
fn test_foreach_over_list() {
    expect_int(
        "List l = new ArrayList(); l.add(1); l.add(2); l.add(3); def s = 0; for (def v : l) { s += v; } return s;",
        6,
    );
}

#[test]
fn test_break_and_continue() {
    expect_int(
        "int s = 0;
         for (int i = 0; i < 100; i++) {
             if (i % 2 == 1) { continue; }
             if (i > 8) { break; }
             s += i;
         }
         return s;",
        20,
    );
}

#[test]
fn test_while_true_with_break() {
    expect_int("int i = 0; while (true) { i++; if (i == 5) { break; } } return i;", 5);
}

#[test]
fn test_constant_false_loop_rejected() {
    expect_compile_error("int i = 0; while (false) { i++; } return i;");
}

#[test]
fn test_for_in_loop() {
    expect_int("List l = [1, 2]; def s = 0; for (y in l) { s += y; } return s;", 3);
}
