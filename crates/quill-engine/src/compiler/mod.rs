//! Compiler pipeline: syntax tree to code unit.
//!
//! ```text
//! source -> parse -> analyze -> lower -> optimize -> generate -> CodeUnit
//! ```

pub mod bytecode;
pub mod codegen;
pub mod ir;
pub mod lower;
pub mod optimize;

pub use bytecode::CodeUnit;
pub use codegen::generate;
pub use ir::{IrClass, PrettyPrint};

use crate::context::ScriptContext;
use crate::error::CompileResult;
use crate::parser::parse;
use crate::semantic::analyze;
use crate::settings::CompilerSettings;
use crate::whitelist::Whitelist;

/// Compile `source` to IR, optimized when the settings ask for it.
#[tracing::instrument(skip_all, fields(script = name))]
pub fn compile_ir(
    name: &str,
    source: &str,
    context: &ScriptContext,
    whitelist: &Whitelist,
    settings: &CompilerSettings,
) -> CompileResult<IrClass> {
    let tree = parse(source, &|type_name: &str| context.is_type_name(whitelist, type_name))?;
    let analysis = analyze(&tree, whitelist, context, settings)?;
    let mut class = lower::lower(&tree, &analysis, whitelist, name, source)?;
    if settings.optimize {
        optimize::optimize(&mut class, whitelist);
    }
    Ok(class)
}

/// Compile `source` all the way to a code unit.
#[tracing::instrument(skip_all, fields(script = name))]
pub fn compile(
    name: &str,
    source: &str,
    context: &ScriptContext,
    whitelist: &Whitelist,
    settings: &CompilerSettings,
) -> CompileResult<CodeUnit> {
    let class = compile_ir(name, source, context, whitelist, settings)?;
    let unit = generate(&class, whitelist, settings)?;
    tracing::debug!(
        functions = unit.functions.len(),
        constants = unit.constants.len(),
        members = unit.members.len(),
        call_sites = unit.call_sites.len(),
        "compiled"
    );
    Ok(unit)
}
