//! Test harness for end-to-end compilation and execution
//!
//! Scripts compile against the default `script` context: a `def` result and
//! one execute parameter, `params`, a `Map`.

#![allow(dead_code)]

use quill_engine::{CompileError, CompiledScript, CompilerSettings, EngineError, ScriptEngine, ScriptException, Value};

pub const CONTEXT: &str = "script";

/// Error type for e2e tests
#[derive(Debug)]
pub enum E2EError {
    /// Compilation or load error
    Engine(EngineError),
    /// Exception raised while executing
    Script(ScriptException),
}

impl std::fmt::Display for E2EError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            E2EError::Engine(e) => write!(f, "Engine error: {}", e),
            E2EError::Script(e) => write!(f, "Script exception: {}", e),
        }
    }
}

impl std::error::Error for E2EError {}

/// Result type for e2e tests
pub type E2EResult<T> = Result<T, E2EError>;

pub fn engine(settings: CompilerSettings) -> ScriptEngine {
    ScriptEngine::with_defaults(settings).expect("default engine")
}

/// Compile with default settings
pub fn compile(source: &str) -> E2EResult<CompiledScript> {
    compile_with(source, CompilerSettings::default())
}

pub fn compile_with(source: &str, settings: CompilerSettings) -> E2EResult<CompiledScript> {
    engine(settings).compile("test", source, CONTEXT).map_err(E2EError::Engine)
}

/// Execute a compiled script once on a fresh instance.
pub fn run(script: &CompiledScript, params: Value) -> E2EResult<Value> {
    let instance = script
        .factory(Vec::new())
        .and_then(|f| f.new_instance())
        .map_err(E2EError::Engine)?;
    instance.execute(vec![params]).map_err(E2EError::Script)
}

/// Build a `params` map from JSON text.
pub fn params(json: &str) -> Value {
    let json: serde_json::Value = serde_json::from_str(json).expect("params json");
    Value::from_json(&json)
}

pub fn empty_params() -> Value {
    Value::map(Default::default())
}

/// Compile and execute source code, returning the result
pub fn compile_and_run(source: &str) -> E2EResult<Value> {
    run(&compile(source)?, empty_params())
}

pub fn compile_and_run_with(source: &str, settings: CompilerSettings, params: Value) -> E2EResult<Value> {
    run(&compile_with(source, settings)?, params)
}

/// Compile and execute, expecting a specific value
pub fn expect_value(source: &str, expected: Value) {
    match compile_and_run(source) {
        Ok(value) => assert_eq!(value, expected, "Wrong result for:\n{}", source),
        Err(e) => panic!("Compilation/execution failed: {}\nSource:\n{}", e, source),
    }
}

/// Compile and execute, expecting a specific int result
pub fn expect_int(source: &str, expected: i32) {
    match compile_and_run(source) {
        Ok(value) => {
            let actual = value
                .as_int()
                .unwrap_or_else(|| panic!("Expected int result, got {:?}\nSource:\n{}", value, source));
            assert_eq!(actual, expected, "Wrong result for:\n{}", source);
        }
        Err(e) => panic!("Compilation/execution failed: {}\nSource:\n{}", e, source),
    }
}

/// Compile and execute, expecting a specific string result
pub fn expect_string(source: &str, expected: &str) {
    match compile_and_run(source) {
        Ok(value) => {
            let actual = value
                .as_str()
                .unwrap_or_else(|| panic!("Expected string result, got {:?}\nSource:\n{}", value, source));
            assert_eq!(actual, expected, "Wrong result for:\n{}", source);
        }
        Err(e) => panic!("Compilation/execution failed: {}\nSource:\n{}", e, source),
    }
}

pub fn expect_bool(source: &str, expected: bool) {
    expect_value(source, Value::Bool(expected));
}

/// Expect compilation to fail, returning the error
pub fn expect_compile_error(source: &str) -> CompileError {
    match compile(source) {
        Ok(_) => panic!("Expected a compile error\nSource:\n{}", source),
        Err(E2EError::Engine(EngineError::Compile(error))) => error,
        Err(other) => panic!("Expected a compile error, got {}\nSource:\n{}", other, source),
    }
}

/// Expect execution to end in an exception, returning it
pub fn expect_exception_with(source: &str, settings: CompilerSettings, params: Value) -> ScriptException {
    match compile_and_run_with(source, settings, params) {
        Ok(value) => panic!("Expected an exception, got {:?}\nSource:\n{}", value, source),
        Err(E2EError::Script(exception)) => exception,
        Err(other) => panic!("Expected an exception, got {}\nSource:\n{}", other, source),
    }
}

/// Expect an exception of class `class_name`
pub fn expect_exception(source: &str, class_name: &str) -> ScriptException {
    let exception = expect_exception_with(source, CompilerSettings::default(), empty_params());
    assert_eq!(exception.class_name, class_name, "Wrong exception for:\n{}\n{}", source, exception);
    exception
}
