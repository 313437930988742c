//! Native call boundary
//!
//! Whitelisted members are host closures taking a [`NativeContext`]. The
//! context gives them the whitelist (to raise exceptions of script classes)
//! and a way to call back into script function values.

use crate::vm::fault::Fault;
use crate::vm::value::{ScriptMap, Value};
use crate::whitelist::entry::NativeFn;
use crate::whitelist::Whitelist;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What a native implementation can ask of the running script.
pub trait NativeContext {
    fn whitelist(&self) -> &Whitelist;

    /// Invoke a script function value (a lambda or function reference).
    fn call_function(&mut self, function: &Value, args: &[Value]) -> Result<Value, Fault>;
}

/// Run a native, converting panics into internal faults.
pub fn call_native(target: &NativeFn, ctx: &mut dyn NativeContext, args: &[Value]) -> Result<Value, Fault> {
    guard(|| target(ctx, args))
}

/// Run host code, converting panics into internal faults.
pub fn guard<T>(f: impl FnOnce() -> Result<T, Fault>) -> Result<T, Fault> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "native call panicked".to_string());
            tracing::warn!(%message, "host code panicked");
            Err(Fault::Internal(message))
        }
    }
}

/// Typed access to native arguments; mismatches become script exceptions.
pub struct Args<'c, 'a> {
    ctx: &'c dyn NativeContext,
    values: &'a [Value],
}

impl<'c, 'a> Args<'c, 'a> {
    pub fn new(ctx: &'c dyn NativeContext, values: &'a [Value]) -> Self {
        Self { ctx, values }
    }

    fn get(&self, index: usize) -> Result<&'a Value, Fault> {
        self.values.get(index).ok_or_else(|| {
            Fault::illegal_argument(self.ctx.whitelist(), format!("missing argument {}", index))
        })
    }

    fn mismatch(&self, index: usize, expected: &str) -> Fault {
        match self.values.get(index) {
            Some(Value::Null) => Fault::null_pointer(
                self.ctx.whitelist(),
                format!("argument {} must not be null", index),
            ),
            Some(value) => Fault::class_cast(
                self.ctx.whitelist(),
                format!("Cannot cast {} to {}", value.type_name(), expected),
            ),
            None => Fault::illegal_argument(self.ctx.whitelist(), format!("missing argument {}", index)),
        }
    }

    pub fn value(&self, index: usize) -> Result<Value, Fault> {
        self.get(index).cloned()
    }

    pub fn bool(&self, index: usize) -> Result<bool, Fault> {
        self.get(index)?.as_bool().ok_or_else(|| self.mismatch(index, "boolean"))
    }

    pub fn int(&self, index: usize) -> Result<i32, Fault> {
        self.get(index)?.as_int().ok_or_else(|| self.mismatch(index, "int"))
    }

    pub fn long(&self, index: usize) -> Result<i64, Fault> {
        self.get(index)?.as_long().ok_or_else(|| self.mismatch(index, "long"))
    }

    pub fn double(&self, index: usize) -> Result<f64, Fault> {
        self.get(index)?.as_double().ok_or_else(|| self.mismatch(index, "double"))
    }

    pub fn str(&self, index: usize) -> Result<&'a str, Fault> {
        match self.get(index)? {
            Value::Str(s) => Ok(&**s),
            _ => Err(self.mismatch(index, "String")),
        }
    }

    pub fn list(&self, index: usize) -> Result<&'a Arc<RwLock<Vec<Value>>>, Fault> {
        match self.get(index)? {
            Value::List(list) => Ok(list),
            _ => Err(self.mismatch(index, "List")),
        }
    }

    pub fn map(&self, index: usize) -> Result<&'a Arc<RwLock<ScriptMap>>, Fault> {
        match self.get(index)? {
            Value::Map(map) => Ok(map),
            _ => Err(self.mismatch(index, "Map")),
        }
    }

    pub fn pattern(&self, index: usize) -> Result<&'a Arc<regex::Regex>, Fault> {
        match self.get(index)? {
            Value::Pattern(p) => Ok(p),
            _ => Err(self.mismatch(index, "Pattern")),
        }
    }
}
