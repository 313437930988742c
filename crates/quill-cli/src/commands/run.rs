//! `quill run`: compile (or load) a script and execute it once.

use super::{engine, read_script, CONTEXT};
use crate::output::StyledOutput;
use anyhow::{anyhow, bail, Context};
use quill_engine::diagnostic::{script_file, Diagnostic};
use quill_engine::settings::CompilerSettings;
use quill_engine::vm::exception::HEADER_SCRIPT_STACK;
use quill_engine::{EngineError, Value};
use std::path::Path;
use termcolor::ColorChoice;

/// Extension of encoded code units
pub const UNIT_EXTENSION: &str = "qbc";

pub fn execute(
    file: &Path,
    params: Option<&str>,
    json: bool,
    settings: CompilerSettings,
    color: ColorChoice,
) -> anyhow::Result<()> {
    let engine = engine(settings)?;
    let mut out = StyledOutput::new(color);

    let script = if file.extension().is_some_and(|e| e == UNIT_EXTENSION) {
        let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        engine.load(&bytes, CONTEXT)?
    } else {
        let (name, source) = read_script(file)?;
        match engine.compile(&name, &source, CONTEXT) {
            Ok(script) => script,
            Err(EngineError::Compile(error)) => {
                let rendered = script_file(file.display().to_string(), source);
                let _ = Diagnostic::from_compile_error(&error).write_to(out.stderr(), &rendered);
                bail!("compilation failed");
            }
            Err(other) => return Err(other.into()),
        }
    };

    let params = match params {
        Some(text) => {
            let json: serde_json::Value = serde_json::from_str(text).context("parsing --params")?;
            if !json.is_object() {
                bail!("--params must be a JSON object");
            }
            Value::from_json(&json)
        }
        None => Value::map(Default::default()),
    };

    let instance = script.factory(Vec::new())?.new_instance()?;
    match instance.execute(vec![params]) {
        Ok(value) if json => {
            out.plain(&serde_json::to_string_pretty(&value.to_json())?);
            out.newline();
            Ok(())
        }
        Ok(value) => {
            out.plain(&value.to_string());
            out.newline();
            Ok(())
        }
        Err(exception) => {
            let rendered = script_file(file.display().to_string(), script.source());
            let _ = Diagnostic::from_script_exception(&exception).write_to(out.stderr(), &rendered);
            if let Some(stack) = exception.header(HEADER_SCRIPT_STACK) {
                for line in stack {
                    out.note(line);
                    out.note("\n");
                }
            }
            if json {
                eprintln!("{}", serde_json::to_string_pretty(&exception.to_json())?);
            }
            Err(anyhow!("{}", exception))
        }
    }
}
