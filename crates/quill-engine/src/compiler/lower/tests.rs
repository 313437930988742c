use super::*;
use crate::compiler::ir::Target;
use crate::context::ScriptContext;
use crate::parser::parse;
use crate::semantic::{analyze, Cast};
use crate::settings::CompilerSettings;
use crate::whitelist::standard;

fn lower_source(source: &str) -> IrClass {
    let whitelist = standard();
    let context = ScriptContext::default_context();
    let tree = parse(source, &|name: &str| context.is_type_name(&whitelist, name)).unwrap();
    let analysis = analyze(&tree, &whitelist, &context, &CompilerSettings::default()).unwrap();
    lower(&tree, &analysis, &whitelist, "test", source).unwrap()
}

fn stores(body: &[Stmt]) -> Vec<&Expr> {
    let mut out = Vec::new();
    for stmt in body {
        match stmt {
            Stmt::Expr(expr @ Expr::Store { .. }) => out.push(expr),
            Stmt::Block(nested) => out.extend(stores(nested)),
            _ => {}
        }
    }
    out
}

#[test]
fn test_widening_becomes_cast_node() {
    let class = lower_source("int x = 1; long y = x; return y;");
    let entry = &class.functions[0];
    assert_eq!(entry.kind, FunctionKind::Entry);
    assert_eq!(entry.params, 1);
    let stores = stores(&entry.body);
    assert_eq!(stores.len(), 2);
    match stores[1] {
        Expr::Store {
            target: Target::Local(2),
            value,
        } => assert!(matches!(
            &**value,
            Expr::Cast {
                cast: Cast::Numeric { .. },
                value
            } if **value == Expr::Local(1)
        )),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_function_indices() {
    let class = lower_source("int f() { return 1; } return f();");
    assert_eq!(class.functions[1].name, "f$0");
    assert_eq!(class.functions[1].kind, FunctionKind::Declared);
    let returns: Vec<&Stmt> = class.functions[0]
        .body
        .iter()
        .filter(|s| matches!(s, Stmt::Return(_)))
        .collect();
    assert!(matches!(
        returns[0],
        Stmt::Return(Some(Expr::Invoke {
            invoke: Invoke::Local(1),
            ..
        }))
    ));
}

#[test]
fn test_accessors_are_synthesized() {
    let class = lower_source("return params.get('x');");
    let names: Vec<&str> = class.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["execute", "$name", "$source", "$statements", "$needs$params"]);
    let needs = class.function("$needs$params").unwrap();
    assert_eq!(needs.body, vec![Stmt::Return(Some(Expr::Const(Constant::Bool(true))))]);
    let name = class.function("$name").unwrap();
    assert_eq!(name.body, vec![Stmt::Return(Some(Expr::Const(Constant::Str("test".into()))))]);
}

#[test]
fn test_postfix_increment_uses_temporary() {
    let class = lower_source("int i = 0; int j = i++; return j;");
    let entry = &class.functions[0];
    // params, i, j plus the saved old value
    assert_eq!(entry.slots, 4);
    let stores = stores(&entry.body);
    match stores[1] {
        Expr::Store { value, .. } => assert!(matches!(&**value, Expr::Let { slot: 3, .. })),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_implicit_return_and_default_result() {
    let class = lower_source("int x = 2; x * 3");
    let entry = &class.functions[0];
    assert!(matches!(entry.body.last(), Some(Stmt::Return(Some(_)))));

    let class = lower_source("int x = 2;");
    let entry = &class.functions[0];
    assert_eq!(entry.body.last(), Some(&Stmt::Return(Some(Expr::Const(Constant::Null)))));
}

#[test]
fn test_lambda_closure_captures_outer_slot() {
    let class = lower_source("int base = 3; List l = new ArrayList(); l.removeIf(v -> v > base); return l;");
    let lambda = class.functions.iter().find(|f| f.kind == FunctionKind::Lambda).unwrap();
    assert_eq!(lambda.name, "lambda$0");
    assert_eq!(lambda.params, 2);
    let printed = crate::compiler::ir::PrettyPrint::pretty_print(&class.functions[0], &standard());
    assert!(printed.contains("closure#1(l1)"), "{}", printed);
}

#[test]
fn test_map_key_assignment_calls_put() {
    let class = lower_source("Map m = new HashMap(); m.a = 1; return m;");
    let printed = crate::compiler::ir::PrettyPrint::pretty_print(&class, &standard());
    assert!(printed.contains("Map.put/2"), "{}", printed);
}
