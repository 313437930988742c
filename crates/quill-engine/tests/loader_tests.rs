//! Encoded code units: round trips through bytes and files, and the checks
//! the loader applies to them.

use quill_engine::compiler::bytecode::{flags, CodeUnit, FunctionRole};
use quill_engine::vm::{load_bytes, LoadError};
use quill_engine::whitelist::standard::standard_builder;
use quill_engine::{standard, CompilerSettings, EngineError, ScriptContext, ScriptEngine, Value};
use std::io::Write;
use std::sync::Arc;

fn engine() -> ScriptEngine {
    ScriptEngine::with_defaults(CompilerSettings::default()).expect("default engine")
}

fn execute(script: &quill_engine::CompiledScript, params: Value) -> Value {
    script
        .factory(Vec::new())
        .unwrap()
        .new_instance()
        .unwrap()
        .execute(vec![params])
        .unwrap()
}

fn empty() -> Value {
    Value::map(Default::default())
}

#[test]
fn test_encoded_unit_runs_after_load() {
    let engine = engine();
    let source = "int sum(int n) { int s = 0; for (int i = 1; i <= n; i++) { s += i; } return s; }\nreturn sum(10) + 'x'.length();";
    let script = engine.compile("sum", source, "script").unwrap();
    let bytes = script.encode();

    let loaded = engine.load(&bytes, "script").unwrap();
    assert_eq!(execute(&loaded, empty()), Value::Int(56));
    assert_eq!(loaded.name(), "sum");
    assert_eq!(loaded.source(), source);
    assert_eq!(loaded.statements(), script.statements());
}

#[test]
fn test_unit_survives_a_file() {
    let engine = engine();
    let script = engine.compile("pattern", "Pattern p = /b+/; return 'abbc' =~ p;", "script").unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&script.encode()).unwrap();
    let bytes = std::fs::read(file.path()).unwrap();

    let loaded = engine.load(&bytes, "script").unwrap();
    assert_eq!(execute(&loaded, empty()), Value::Bool(true));
    // statics are re-created per load
    assert!(!Arc::ptr_eq(loaded.unit(), script.unit()));
}

#[test]
fn test_decode_matches_encode() {
    let script = engine().compile("x", "int x = 2; return x * 21;", "script").unwrap();
    let decoded = CodeUnit::decode(&script.encode()).unwrap();
    assert_eq!(&decoded, script.code());
    assert_ne!(decoded.flags & flags::OPTIMIZED, 0);
    assert_ne!(decoded.flags & flags::LOOP_COUNTER, 0);
    assert!(decoded.functions.iter().any(|f| f.name == "execute" && f.role == FunctionRole::Entry));
}

#[test]
fn test_corrupt_bytes_rejected() {
    let engine = engine();
    let mut bytes = engine.compile("x", "return 1;", "script").unwrap().encode();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    assert!(matches!(engine.load(&bytes, "script"), Err(EngineError::Load(LoadError::Unit(_)))));
    assert!(matches!(
        load_bytes(&bytes[..8], standard(), &CompilerSettings::default()),
        Err(LoadError::Unit(_))
    ));
}

#[test]
fn test_load_against_narrower_whitelist_fails() {
    let mut builder = standard_builder();
    builder.class("Widget");
    let engine = engine();
    engine
        .register_context(
            ScriptContext::new("widgets", "def").execute_param("params", "Map"),
            Arc::new(builder.build().unwrap()),
        )
        .unwrap();

    let script = engine
        .compile("w", "def w = params.get('w'); return w instanceof Widget;", "widgets")
        .unwrap();
    assert_eq!(execute(&script, empty()), Value::Bool(false));

    match engine.load(&script.encode(), "script") {
        Err(EngineError::Load(LoadError::UnknownType(name))) => assert_eq!(name, "Widget"),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("unit linked against a whitelist without Widget"),
    }
}
