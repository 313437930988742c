//! `quill check`: compile scripts without running them.

use super::{engine, read_script, CONTEXT};
use crate::output::StyledOutput;
use anyhow::bail;
use quill_engine::diagnostic::{script_file, Diagnostic};
use quill_engine::settings::CompilerSettings;
use quill_engine::EngineError;
use std::path::PathBuf;
use termcolor::ColorChoice;

pub fn execute(files: &[PathBuf], format: &str, settings: CompilerSettings, color: ColorChoice) -> anyhow::Result<()> {
    if format != "pretty" && format != "json" {
        bail!("unknown format `{}` (expected pretty or json)", format);
    }
    let engine = engine(settings)?;
    let mut out = StyledOutput::new(color);
    let mut failed = 0usize;
    let mut json = Vec::new();

    for file in files {
        let (name, source) = read_script(file)?;
        match engine.compile(&name, &source, CONTEXT) {
            Ok(_) => {
                if format == "pretty" {
                    out.success("ok");
                    out.plain(&format!("  {}", file.display()));
                    out.newline();
                }
            }
            Err(EngineError::Compile(error)) => {
                failed += 1;
                let rendered = script_file(file.display().to_string(), source);
                let diag = Diagnostic::from_compile_error(&error);
                if format == "json" {
                    json.push(diag.to_json(&rendered));
                } else {
                    let _ = diag.write_to(out.stderr(), &rendered);
                }
            }
            Err(other) => return Err(other.into()),
        }
    }

    if format == "json" {
        out.plain(&serde_json::to_string_pretty(&json)?);
        out.newline();
    }
    if failed > 0 {
        out.error(&format!("{} of {} scripts failed to compile\n", failed, files.len()));
        bail!("check failed");
    }
    Ok(())
}
