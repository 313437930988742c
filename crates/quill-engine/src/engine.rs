//! Host-facing engine
//!
//! ```text
//! ScriptEngine --compile--> CompiledScript --factory--> ScriptFactory
//!                                                          |
//!                                   new_instance / new_stateful
//!                                                          v
//!                                                    ScriptInstance --execute--> Value
//! ```
//!
//! Contexts are registered once with the whitelist their scripts see.
//! Compiling produces a loaded, immutable unit; each instance carries the
//! factory and stateful arguments of its context plus its own class
//! binding state, and every `execute` runs with a fresh loop budget.

use crate::compiler::bytecode::CodeUnit;
use crate::compiler::lower::NEEDS_PREFIX;
use crate::compiler::{self, IrClass};
use crate::context::{ContextError, ParamGroup, ResolvedContext, ScriptContext};
use crate::error::CompileError;
use crate::settings::CompilerSettings;
use crate::vm::{load, BindingStates, Fault, Interpreter, LoadError, LoadedUnit, ScriptException, Value};
use crate::whitelist::{standard, Whitelist};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown script context [{0}]")]
    UnknownContext(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Context [{context}] expects {expected} {group} arguments, got {actual}")]
    Arity {
        context: String,
        group: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;

struct RegisteredContext {
    context: ScriptContext,
    resolved: ResolvedContext,
    whitelist: Arc<Whitelist>,
}

/// Compiles scripts against registered contexts.
pub struct ScriptEngine {
    settings: CompilerSettings,
    contexts: RwLock<FxHashMap<String, Arc<RegisteredContext>>>,
}

impl ScriptEngine {
    pub fn new(settings: CompilerSettings) -> Self {
        Self {
            settings,
            contexts: RwLock::new(FxHashMap::default()),
        }
    }

    /// An engine with the default context over the standard whitelist.
    pub fn with_defaults(settings: CompilerSettings) -> EngineResult<Self> {
        let engine = Self::new(settings);
        engine.register_context(ScriptContext::default_context(), standard())?;
        Ok(engine)
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Register (or replace) a context and the whitelist its scripts see.
    pub fn register_context(&self, context: ScriptContext, whitelist: Arc<Whitelist>) -> EngineResult<()> {
        let resolved = context.resolve(&whitelist)?;
        tracing::debug!(context = %context.name, params = resolved.params.len(), "registered context");
        self.contexts.write().insert(
            context.name.clone(),
            Arc::new(RegisteredContext {
                context,
                resolved,
                whitelist,
            }),
        );
        Ok(())
    }

    pub fn has_context(&self, name: &str) -> bool {
        self.contexts.read().contains_key(name)
    }

    fn context(&self, name: &str) -> EngineResult<Arc<RegisteredContext>> {
        self.contexts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownContext(name.to_string()))
    }

    /// Compile `source` for `context` and load the result.
    pub fn compile(&self, name: &str, source: &str, context: &str) -> EngineResult<CompiledScript> {
        let registered = self.context(context)?;
        let code = compiler::compile(name, source, &registered.context, &registered.whitelist, &self.settings)?;
        let unit = load(&code, Arc::clone(&registered.whitelist), &self.settings)?;
        tracing::info!(script = name, context, "script compiled");
        Ok(CompiledScript {
            unit,
            code: Arc::new(code),
            context: registered,
        })
    }

    /// Compile to IR only; used for inspection.
    pub fn compile_ir(&self, name: &str, source: &str, context: &str) -> EngineResult<IrClass> {
        let registered = self.context(context)?;
        Ok(compiler::compile_ir(
            name,
            source,
            &registered.context,
            &registered.whitelist,
            &self.settings,
        )?)
    }

    /// Load a previously encoded code unit for `context`.
    pub fn load(&self, bytes: &[u8], context: &str) -> EngineResult<CompiledScript> {
        let registered = self.context(context)?;
        let code = CodeUnit::decode(bytes).map_err(LoadError::from)?;
        let unit = load(&code, Arc::clone(&registered.whitelist), &self.settings)?;
        Ok(CompiledScript {
            unit,
            code: Arc::new(code),
            context: registered,
        })
    }
}

/// A compiled and loaded script. Cheap to clone; shared by all instances.
#[derive(Clone)]
pub struct CompiledScript {
    unit: Arc<LoadedUnit>,
    code: Arc<CodeUnit>,
    context: Arc<RegisteredContext>,
}

impl CompiledScript {
    pub fn unit(&self) -> &Arc<LoadedUnit> {
        &self.unit
    }

    pub fn code(&self) -> &CodeUnit {
        &self.code
    }

    pub fn encode(&self) -> Vec<u8> {
        self.code.encode()
    }

    fn accessor(&self, name: &str) -> Option<Value> {
        let index = self.unit.function_index(name)?;
        Interpreter::new(&self.unit).call(&self.unit, index, Vec::new()).ok()
    }

    /// Script name as compiled.
    pub fn name(&self) -> String {
        match self.accessor("$name") {
            Some(Value::Str(s)) => s.to_string(),
            _ => self.unit.name.clone(),
        }
    }

    pub fn source(&self) -> String {
        match self.accessor("$source") {
            Some(Value::Str(s)) => s.to_string(),
            _ => self.unit.source.clone(),
        }
    }

    /// Start offsets of every statement in the source.
    pub fn statements(&self) -> Vec<usize> {
        match self.accessor("$statements") {
            Some(Value::Array(array)) => array
                .items
                .read()
                .iter()
                .filter_map(|v| v.as_int().and_then(|i| usize::try_from(i).ok()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the script reads context parameter `param`.
    pub fn needs(&self, param: &str) -> bool {
        matches!(self.accessor(&format!("{}{}", NEEDS_PREFIX, param)), Some(Value::Bool(true)))
    }

    /// Bind the factory arguments of the context.
    pub fn factory(&self, args: Vec<Value>) -> EngineResult<ScriptFactory> {
        self.check_arity(ParamGroup::Factory, args.len())?;
        Ok(ScriptFactory {
            script: self.clone(),
            factory_args: args,
        })
    }

    fn check_arity(&self, group: ParamGroup, actual: usize) -> EngineResult<()> {
        let expected = self.context.resolved.count(group);
        if expected != actual {
            return Err(EngineError::Arity {
                context: self.context.context.name.clone(),
                group: match group {
                    ParamGroup::Factory => "factory",
                    ParamGroup::Stateful => "stateful",
                    ParamGroup::Execute => "execute",
                },
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// A script with its factory arguments bound.
#[derive(Clone)]
pub struct ScriptFactory {
    script: CompiledScript,
    factory_args: Vec<Value>,
}

impl ScriptFactory {
    /// An instance of a context without stateful parameters.
    pub fn new_instance(&self) -> EngineResult<ScriptInstance> {
        self.new_stateful(Vec::new())
    }

    /// An instance with the stateful arguments bound.
    pub fn new_stateful(&self, args: Vec<Value>) -> EngineResult<ScriptInstance> {
        self.script.check_arity(ParamGroup::Stateful, args.len())?;
        let mut bound = self.factory_args.clone();
        bound.extend(args);
        Ok(ScriptInstance {
            script: self.script.clone(),
            bound,
            bindings: BindingStates::new(),
        })
    }
}

/// One executable script instance.
pub struct ScriptInstance {
    script: CompiledScript,
    /// Factory then stateful arguments
    bound: Vec<Value>,
    bindings: BindingStates,
}

impl ScriptInstance {
    pub fn script(&self) -> &CompiledScript {
        &self.script
    }

    /// Run the script with the execute arguments of its context.
    pub fn execute(&self, args: Vec<Value>) -> Result<Value, ScriptException> {
        let unit = &self.script.unit;
        if let Err(error) = self.script.check_arity(ParamGroup::Execute, args.len()) {
            let fault = Fault::illegal_argument(&unit.whitelist, error.to_string());
            return Err(ScriptException::from_fault(fault, &unit.source, None));
        }
        let mut all = Vec::with_capacity(self.bound.len() + args.len());
        all.extend_from_slice(&self.bound);
        all.extend(args);

        let _span = tracing::debug_span!("execute", script = %unit.name).entered();
        Interpreter::new(unit).with_bindings(&self.bindings).execute(unit, all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ScriptEngine {
        ScriptEngine::with_defaults(CompilerSettings::default()).unwrap()
    }

    #[test]
    fn test_unknown_context() {
        let err = engine().compile("s", "return 1;", "nope").err().unwrap();
        assert!(matches!(err, EngineError::UnknownContext(name) if name == "nope"));
    }

    #[test]
    fn test_accessors() {
        let script = engine().compile("acc", "int x = 1;\nreturn params;", "script").unwrap();
        assert_eq!(script.name(), "acc");
        assert_eq!(script.source(), "int x = 1;\nreturn params;");
        assert_eq!(script.statements(), vec![0, 11]);
        assert!(script.needs("params"));
    }

    #[test]
    fn test_execute_arity_is_checked() {
        let script = engine().compile("s", "return 1;", "script").unwrap();
        let instance = script.factory(Vec::new()).unwrap().new_instance().unwrap();
        let err = instance.execute(Vec::new()).unwrap_err();
        assert_eq!(err.class_name, "IllegalArgumentException");
        assert!(script.factory(vec![Value::Int(1)]).is_err());
    }
}
