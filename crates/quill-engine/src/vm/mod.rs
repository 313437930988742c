//! Sandboxed runtime: values, loading, dispatch and the interpreter.

pub mod dispatch;
pub mod exception;
pub mod fault;
pub mod interpreter;
pub mod iter;
pub mod loader;
pub mod native;
pub mod ops;
pub mod value;

pub use exception::ScriptException;
pub use fault::Fault;
pub use interpreter::{BindingStates, Interpreter};
pub use loader::{load, load_bytes, LoadError, LoadResult, LoadedUnit};
pub use native::{Args, NativeContext};
pub use value::{HostObject, ScriptMap, Value};
