//! Quill - an embeddable, sandboxed scripting language
//!
//! Scripts are compiled against a whitelist of host classes and a script
//! context, lowered to an IR, optimized, emitted as bytecode and run by a
//! sandboxed interpreter that bounds loops, recursion and allocations.

pub mod compiler;
pub mod context;
pub mod diagnostic;
pub mod engine;
pub mod error;
pub mod parser;
pub mod semantic;
pub mod settings;
pub mod vm;
pub mod whitelist;

pub use context::ScriptContext;
pub use engine::{CompiledScript, EngineError, EngineResult, ScriptEngine, ScriptFactory, ScriptInstance};
pub use error::{CompileError, CompileErrorKind, CompileResult};
pub use settings::CompilerSettings;
pub use vm::{ScriptException, Value};
pub use whitelist::{standard, Whitelist, WhitelistBuilder};
