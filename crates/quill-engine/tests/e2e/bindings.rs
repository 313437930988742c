//! Host contexts: parameter groups, custom whitelists and bindings.

use quill_engine::vm::native::NativeContext;
use quill_engine::vm::{Fault, HostObject};
use quill_engine::whitelist::standard::standard_builder;
use quill_engine::whitelist::{native, BindingFactory, BindingState};
use quill_engine::{CompilerSettings, EngineError, ScriptContext, ScriptEngine, Value};
use std::any::Any;
use std::sync::Arc;

struct Counter {
    total: i32,
}

impl BindingState for Counter {
    fn call(&mut self, _ctx: &mut dyn NativeContext, args: &[Value]) -> Result<Value, Fault> {
        self.total += args[0].as_int().unwrap_or(0);
        Ok(Value::Int(self.total))
    }
}

fn counter_factory() -> BindingFactory {
    Arc::new(
        |_ctx: &mut dyn NativeContext, args: &[Value]| -> Result<Box<dyn BindingState>, Fault> {
            let start = args[0].as_int().unwrap_or(0);
            Ok(Box::new(Counter { total: start }))
        },
    )
}

/// An engine with a `counting` context whose whitelist adds `counter` and
/// `twice` to the standard classes.
fn counting_engine() -> ScriptEngine {
    let mut builder = standard_builder();
    builder.class_binding("counter", &["int"], &["int"], "int", counter_factory());
    builder.instance_binding(
        "twice",
        &["int"],
        "int",
        native(|_ctx, args| Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))),
    );
    let whitelist = Arc::new(builder.build().unwrap());

    let engine = ScriptEngine::new(CompilerSettings::default());
    let context = ScriptContext::new("counting", "def").execute_param("step", "int");
    engine.register_context(context, whitelist).unwrap();
    engine
}

// ============================================================================
// Bindings
// ============================================================================

#[test]
fn test_instance_binding() {
    let engine = counting_engine();
    let script = engine.compile("doubled", "return twice(step);", "counting").unwrap();
    let instance = script.factory(Vec::new()).unwrap().new_instance().unwrap();
    assert_eq!(instance.execute(vec![Value::Int(21)]).unwrap(), Value::Int(42));
}

#[test]
fn test_class_binding_state_is_per_instance() {
    let engine = counting_engine();
    let script = engine
        .compile("count", "counter(100, step); return counter(100, step);", "counting")
        .unwrap();
    let factory = script.factory(Vec::new()).unwrap();

    let first = factory.new_instance().unwrap();
    assert_eq!(first.execute(vec![Value::Int(1)]).unwrap(), Value::Int(102));
    // state survives between executions of one instance
    assert_eq!(first.execute(vec![Value::Int(1)]).unwrap(), Value::Int(104));

    let second = factory.new_instance().unwrap();
    assert_eq!(second.execute(vec![Value::Int(5)]).unwrap(), Value::Int(110));
}

#[test]
fn test_binding_unknown_to_default_context() {
    let engine = ScriptEngine::with_defaults(CompilerSettings::default()).unwrap();
    match engine.compile("doubled", "return twice(2);", "script") {
        Err(EngineError::Compile(_)) => {}
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("binding resolved against the standard whitelist"),
    }
}

// ============================================================================
// Parameter groups
// ============================================================================

fn scaled_engine() -> ScriptEngine {
    let engine = ScriptEngine::with_defaults(CompilerSettings::default()).unwrap();
    let context = ScriptContext::new("scaled", "int")
        .factory_param("offset", "int")
        .stateful_param("scale", "int")
        .execute_param("x", "int")
        .execute_param("unused", "int");
    engine.register_context(context, quill_engine::standard()).unwrap();
    engine
}

#[test]
fn test_parameter_groups_bind_in_order() {
    let engine = scaled_engine();
    let script = engine.compile("scaled", "return x * scale + offset;", "scaled").unwrap();
    let instance = script
        .factory(vec![Value::Int(1)])
        .unwrap()
        .new_stateful(vec![Value::Int(10)])
        .unwrap();
    assert_eq!(instance.execute(vec![Value::Int(4), Value::Int(0)]).unwrap(), Value::Int(41));
    assert_eq!(instance.execute(vec![Value::Int(5), Value::Int(0)]).unwrap(), Value::Int(51));
}

#[test]
fn test_needs_reports_used_parameters() {
    let engine = scaled_engine();
    let script = engine.compile("scaled", "return x * scale + offset;", "scaled").unwrap();
    assert!(script.needs("x"));
    assert!(script.needs("scale"));
    assert!(!script.needs("unused"));
}

#[test]
fn test_group_arity_is_checked() {
    let engine = scaled_engine();
    let script = engine.compile("scaled", "return x;", "scaled").unwrap();
    assert!(matches!(script.factory(Vec::new()), Err(EngineError::Arity { .. })));

    let factory = script.factory(vec![Value::Int(0)]).unwrap();
    assert!(matches!(factory.new_instance(), Err(EngineError::Arity { .. })));

    let instance = factory.new_stateful(vec![Value::Int(1)]).unwrap();
    let exception = instance.execute(vec![Value::Int(1)]).unwrap_err();
    assert_eq!(exception.class_name, "IllegalArgumentException");
}

// ============================================================================
// Dynamic dispatch over host classes
// ============================================================================

#[derive(Debug)]
struct Both;

impl HostObject for Both {
    fn class_name(&self) -> &str {
        "Both"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `Both` inherits `describe()` from two unrelated supertypes.
fn diamond_engine() -> ScriptEngine {
    let mut builder = standard_builder();
    builder
        .class("Left")
        .method("describe", &[], "String", native(|_ctx, _args| Ok(Value::string("left"))));
    builder
        .class("Right")
        .method("describe", &[], "String", native(|_ctx, _args| Ok(Value::string("right"))));
    builder
        .class("Both")
        .extends(&["Left", "Right"])
        .constructor(&[], native(|_ctx, _args| Ok(Value::Object(Arc::new(Both)))));
    let whitelist = Arc::new(builder.build().unwrap());

    let engine = ScriptEngine::new(CompilerSettings::default());
    engine
        .register_context(ScriptContext::new("diamond", "def"), whitelist)
        .unwrap();
    engine
}

#[test]
fn test_ambiguous_dynamic_call_is_a_sandbox_fault() {
    let engine = diamond_engine();
    let script = engine
        .compile(
            "diamond",
            "def b = new Both(); try { return b.describe(); } catch (Exception e) { return 'caught'; }",
            "diamond",
        )
        .unwrap();
    let instance = script.factory(Vec::new()).unwrap().new_instance().unwrap();
    let exception = instance.execute(Vec::new()).unwrap_err();
    assert_eq!(exception.class_name, "AmbiguousDispatchError");
    assert!(exception.is_sandbox_fault());
    assert!(exception.message.contains("ambiguous"), "{}", exception.message);
}
