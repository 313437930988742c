//! `quill ir`: print the optimized IR or the disassembled code unit.

use super::{engine, read_script, CONTEXT};
use anyhow::Context;
use quill_engine::compiler::PrettyPrint;
use quill_engine::settings::CompilerSettings;
use quill_engine::standard;
use std::path::Path;

pub fn execute(file: &Path, bytecode: bool, emit: Option<&Path>, settings: CompilerSettings) -> anyhow::Result<()> {
    let engine = engine(settings)?;
    let (name, source) = read_script(file)?;

    if bytecode || emit.is_some() {
        let script = engine.compile(&name, &source, CONTEXT)?;
        if bytecode {
            print!("{}", script.code().disassemble());
        }
        if let Some(path) = emit {
            std::fs::write(path, script.encode()).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote code unit");
        }
    }
    if !bytecode {
        let class = engine.compile_ir(&name, &source, CONTEXT)?;
        print!("{}", class.pretty_print(&standard()));
    }
    Ok(())
}
