//! Code generation tests: the shape of the emitted code units.

use quill_engine::compiler::bytecode::{decode_instructions, CatchKind, CodeUnit, FunctionCode, FunctionRole, Opcode};
use quill_engine::{CompilerSettings, ScriptEngine};

fn compile_with(source: &str, settings: CompilerSettings) -> CodeUnit {
    let engine = ScriptEngine::with_defaults(settings).expect("default engine");
    let script = engine.compile("test", source, "script").expect("Failed to compile");
    script.code().clone()
}

fn compile(source: &str) -> CodeUnit {
    compile_with(source, CompilerSettings::default())
}

fn function<'a>(unit: &'a CodeUnit, name: &str) -> &'a FunctionCode {
    let index = unit.function_index(name).unwrap_or_else(|| panic!("no function {}", name));
    &unit.functions[index as usize]
}

fn opcodes(function: &FunctionCode) -> Vec<Opcode> {
    decode_instructions(&function.code)
        .expect("Failed to decode")
        .into_iter()
        .map(|i| i.opcode)
        .collect()
}

#[test]
fn test_entry_is_sandboxed() {
    let unit = compile("return 1;");
    let entry = function(&unit, "execute");
    assert_eq!(entry.role, FunctionRole::Entry);
    assert_eq!(entry.param_count, 1);

    let ops = opcodes(entry);
    assert_eq!(ops.first(), Some(&Opcode::InitBudget));
    assert!(ops.contains(&Opcode::Translate));
    assert!(entry.handlers.iter().any(|h| h.catch == CatchKind::Any));
}

#[test]
fn test_loop_back_edge_counts() {
    let unit = compile("int s = 0; for (int i = 0; i < 3; i++) { s += i; } return s;");
    let ops = opcodes(function(&unit, "execute"));
    assert_eq!(ops.iter().filter(|op| **op == Opcode::LoopCount).count(), 1);
}

#[test]
fn test_disabled_counter_emits_nothing() {
    let unit = compile_with(
        "int s = 0; while (s < 3) { s++; } return s;",
        CompilerSettings::default().with_max_loop_counter(0),
    );
    let ops = opcodes(function(&unit, "execute"));
    assert!(!ops.contains(&Opcode::LoopCount));
    assert!(!ops.contains(&Opcode::InitBudget));
}

#[test]
fn test_declared_function_counts_on_entry() {
    let unit = compile("int f(int n) { return n; } return f(1);");
    let f = unit.functions.iter().find(|f| f.role == FunctionRole::Declared).expect("declared function");
    assert_eq!(f.param_count, 1);
    assert_eq!(opcodes(f).first(), Some(&Opcode::LoopCount));
    assert!(opcodes(function(&unit, "execute")).contains(&Opcode::CallLocal));
}

#[test]
fn test_accessors_are_synthesized() {
    let unit = compile("return params;");
    for name in ["$name", "$source", "$statements", "$needs$params"] {
        assert_eq!(function(&unit, name).role, FunctionRole::Accessor, "{}", name);
    }
}

#[test]
fn test_lambda_becomes_closure() {
    let unit = compile("int k = 2; Function f = v -> v * k; return f.apply(3);");
    assert!(unit.functions.iter().any(|f| f.role == FunctionRole::Lambda));
    assert!(opcodes(function(&unit, "execute")).contains(&Opcode::Closure));
}

#[test]
fn test_def_call_uses_call_site() {
    let unit = compile("def x = 'abc'; return x.length();");
    assert!(opcodes(function(&unit, "execute")).contains(&Opcode::InvokeDynamic));
    assert_eq!(unit.call_sites.len(), 1);
}

#[test]
fn test_regex_static_initializer() {
    let unit = compile("return 'abc' =~ /b/;");
    let init = unit.static_init.expect("static initializer");
    assert_eq!(unit.functions[init as usize].role, FunctionRole::StaticInit);
    assert!(opcodes(&unit.functions[init as usize]).contains(&Opcode::Regex));
    assert!(opcodes(function(&unit, "execute")).contains(&Opcode::LoadStatic));
}

#[test]
fn test_source_map_covers_statements() {
    let unit = compile("int a = 1;\nint b = 2;\nreturn a + b;");
    let entry = function(&unit, "execute");
    let offsets: Vec<usize> = entry.lines.iter().map(|l| l.offset as usize).collect();
    assert!(offsets.contains(&0));
    assert!(offsets.contains(&11));
    assert!(offsets.contains(&22));
}
