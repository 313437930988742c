use super::*;
use crate::error::CompileErrorKind;
use crate::parser::parse;
use crate::whitelist::standard;

fn analyze_with(source: &str, context: &ScriptContext, settings: &CompilerSettings) -> CompileResult<(SyntaxTree, Analysis)> {
    let whitelist = standard();
    let tree = parse(source, &|name: &str| context.is_type_name(&whitelist, name))?;
    let analysis = analyze(&tree, &whitelist, context, settings)?;
    Ok((tree, analysis))
}

fn check(source: &str) -> CompileResult<(SyntaxTree, Analysis)> {
    analyze_with(source, &ScriptContext::default_context(), &CompilerSettings::default())
}

fn check_err(source: &str) -> CompileError {
    match check(source) {
        Ok(_) => panic!("expected an error for {:?}", source),
        Err(err) => err,
    }
}

fn find(tree: &SyntaxTree, pred: impl Fn(&NodeKind) -> bool) -> NodeId {
    crate::parser::visit::collect(tree, tree.root(), |t, n| pred(t.kind(n)))
        .into_iter()
        .next()
        .expect("node not found")
}

#[test]
fn test_implicit_return_of_last_expression() {
    let (tree, analysis) = check("int x = 1; long y = x; y + 1").unwrap();
    let value = analysis.entry.implicit_return.expect("implicit return");
    assert!(matches!(tree.kind(value), NodeKind::Binary { .. }));
    assert_eq!(analysis.decorations.value_type(value), Some(&ScriptType::Long));
    // long to def needs no conversion
    assert!(analysis.decorations.cast(value).is_none());
    assert!(!analysis.entry.synthetic_return);
    // params, x, y
    assert_eq!(analysis.entry.max_slots, 3);
}

#[test]
fn test_widening_cast_recorded() {
    let (tree, analysis) = check("int x = 1; long y = x; return y;").unwrap();
    let init = find(&tree, |k| matches!(k, NodeKind::Variable(name) if name == "x"));
    assert_eq!(
        analysis.decorations.cast(init),
        Some(&Cast::Numeric {
            from: ScriptType::Int,
            to: ScriptType::Long
        })
    );
}

#[test]
fn test_unknown_variable() {
    let err = check_err("return z;");
    assert_eq!(err.kind, CompileErrorKind::Unresolved);
    assert_eq!(err.message, "Variable [z] is not defined.");
}

#[test]
fn test_narrowing_requires_explicit_cast() {
    let err = check_err("double d = 1.5; int i = d;");
    assert_eq!(err.kind, CompileErrorKind::Type);
    assert!(err.message.contains("Cannot cast from [double] to [int]"), "{}", err.message);
    assert!(check("double d = 1.5; int i = (int) d; return i;").is_ok());
}

#[test]
fn test_extraneous_conditions() {
    assert!(check_err("if (true) { return 1; }").message.contains("Extraneous if"));
    assert!(check_err("while (false) { }").message.contains("Extraneous while"));
}

#[test]
fn test_missing_return_in_function() {
    let err = check_err("int f(int a) { if (a > 0) { return 1; } } return f(1);");
    assert_eq!(err.kind, CompileErrorKind::Structure);
    assert!(err.message.contains("Not all paths provide a return value for function [f]"));
}

#[test]
fn test_functions_call_each_other_in_any_order() {
    let (tree, analysis) = check("int a() { return b() + 1; } int b() { return 2; } return a();").unwrap();
    assert_eq!(analysis.functions.len(), 2);
    let call = find(&tree, |k| matches!(k, NodeKind::Call { name, .. } if name == "b"));
    assert_eq!(analysis.decorations.call(call), Some(&CallTarget::Local(1)));
}

#[test]
fn test_unreachable_statement() {
    let err = check_err("return 1; int y = 2;");
    assert_eq!(err.message, "Unreachable statement.");
}

#[test]
fn test_not_a_statement() {
    let err = check_err("int x = 1; x + 1; return x;");
    assert_eq!(err.message, "Not a statement.");
}

#[test]
fn test_needs_tracks_context_params() {
    let (_, analysis) = check("return params.get('a');").unwrap();
    assert!(analysis.needs.contains("params"));
    let (_, analysis) = check("return 1;").unwrap();
    assert!(analysis.needs.is_empty());
}

#[test]
fn test_lambda_captures_are_read_only_copies() {
    let (tree, analysis) = check("int base = 3; List l = new ArrayList(); l.removeIf(v -> v > base); return l;").unwrap();
    let lambda = find(&tree, |k| matches!(k, NodeKind::Lambda { .. }));
    let captures = analysis.decorations.captures(lambda);
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].name, "base");
    assert_eq!(captures[0].ty, ScriptType::Int);

    let index = analysis.decorations.function(lambda).unwrap();
    let function = analysis.functions.get(index).unwrap();
    assert_eq!(function.symbol, "lambda$0");
    assert_eq!(function.params, vec![ScriptType::Int, ScriptType::Def]);
    assert_eq!(function.return_type, ScriptType::Boolean);

    let err = check_err("int x = 1; Supplier s = () -> { x = 2; return x; }; return s;");
    assert_eq!(err.message, "Cannot assign to captured variable [x].");
}

#[test]
fn test_lambda_arity_mismatch() {
    let err = check_err("List l = new ArrayList(); l.removeIf((a, b) -> true); return l;");
    assert!(err.message.contains("Incorrect number of parameters"), "{}", err.message);
}

#[test]
fn test_function_reference_adapter() {
    let (tree, analysis) =
        check("int cmp(def a, def b) { return 0; } List l = new ArrayList(); l.sort(this::cmp); return l;").unwrap();
    let reference = find(&tree, |k| matches!(k, NodeKind::FunctionRef { .. }));
    let index = analysis.decorations.function(reference).unwrap();
    let adapter = analysis.functions.get(index).unwrap();
    assert_eq!(adapter.symbol, "ref$0");
    assert!(matches!(
        &adapter.body,
        FunctionBody::Adapter(plan) if plan.target == AdapterTarget::Local(0)
    ));
}

#[test]
fn test_def_receiver_is_dynamic() {
    let (tree, analysis) = check("def x = 'abc'; return x.length();").unwrap();
    let call = find(&tree, |k| matches!(k, NodeKind::MethodCall { .. }));
    match analysis.decorations.call(call) {
        Some(CallTarget::Dynamic(reference)) => {
            assert_eq!(reference.name, "length");
            assert_eq!(reference.arity, 0);
        }
        other => panic!("unexpected call target {:?}", other),
    }
}

#[test]
fn test_static_constant_is_recorded() {
    let (tree, analysis) = check("return Integer.MAX_VALUE;").unwrap();
    let field = find(&tree, |k| matches!(k, NodeKind::Field { .. }));
    assert!(analysis.decorations.constant(field).is_some());
    assert_eq!(analysis.decorations.value_type(field), Some(&ScriptType::Int));
}

#[test]
fn test_read_only_field() {
    let err = check_err("int[] a = new int[2]; a.length = 3; return a;");
    assert!(err.message.contains("read-only field [length]"), "{}", err.message);
}

#[test]
fn test_regex_disabled() {
    let settings = CompilerSettings::default().with_regex(false);
    let err = analyze_with("return 'a' ==~ /a/;", &ScriptContext::default_context(), &settings).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Disabled);
}

#[test]
fn test_foreach_plans() {
    let (tree, analysis) = check("int s = 0; int[] a = new int[] {1, 2}; for (int v : a) { s += v; } return s;").unwrap();
    let each = find(&tree, |k| matches!(k, NodeKind::ForEach { .. }));
    assert!(matches!(analysis.decorations.foreach(each), Some(ForEachPlan::Array { .. })));

    let (tree, analysis) = check("List l = new ArrayList(); for (def v : l) { } return l;").unwrap();
    let each = find(&tree, |k| matches!(k, NodeKind::ForEach { .. }));
    assert!(matches!(analysis.decorations.foreach(each), Some(ForEachPlan::Iterable { .. })));

    let err = check_err("int n = 3; for (def v : n) { } return n;");
    assert!(err.message.contains("Cannot iterate over type [int]"));
}

#[test]
fn test_compound_assignment_plan() {
    let (tree, analysis) = check("int x = 1; x += 2.5; return x;").unwrap();
    let assign = find(&tree, |k| matches!(k, NodeKind::Assign { op: Some(_), .. }));
    let plan = analysis.decorations.compound(assign).unwrap();
    assert_eq!(plan.op_ty, ScriptType::Double);
    assert!(plan.write_cast.is_some());
}

#[test]
fn test_custom_context_return_type() {
    let context = ScriptContext::new("score", "double").execute_param("x", "int");
    let (tree, analysis) = analyze_with("x * 2", &context, &CompilerSettings::default()).unwrap();
    let value = analysis.entry.implicit_return.unwrap();
    assert_eq!(analysis.decorations.value_type(value), Some(&ScriptType::Int));
    assert!(matches!(analysis.decorations.cast(value), Some(Cast::Numeric { .. })));
    assert_eq!(analysis.entry.params, vec![ScriptType::Int]);
    assert!(matches!(tree.kind(value), NodeKind::Binary { .. }));

    let err = analyze_with("return;", &context, &CompilerSettings::default()).unwrap_err();
    assert_eq!(err.message, "Must return a value of type [double].");
}

#[test]
fn test_statement_offsets_are_sorted() {
    let (_, analysis) = check("int a = 1;\nint b = 2;\nreturn a + b;").unwrap();
    assert_eq!(analysis.statements.len(), 3);
    assert!(analysis.statements.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(analysis.statements.last(), Some(&22));
}
