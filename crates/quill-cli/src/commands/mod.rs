pub mod check;
pub mod ir;
pub mod run;

use crate::SettingsArgs;
use anyhow::Context;
use quill_engine::settings::CompilerSettings;
use quill_engine::ScriptEngine;
use std::path::Path;

/// Context every command compiles against
pub const CONTEXT: &str = "script";

/// Settings from `config` (or defaults), then command-line overrides.
pub fn load_settings(config: Option<&Path>, args: &SettingsArgs) -> anyhow::Result<CompilerSettings> {
    let mut settings = match config {
        Some(path) => CompilerSettings::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => CompilerSettings::default(),
    };
    if args.no_optimize {
        settings.optimize = false;
    }
    if args.no_regex {
        settings.regex_enabled = false;
    }
    if let Some(limit) = args.max_loop_counter {
        settings.max_loop_counter = limit;
    }
    if let Some(depth) = args.max_call_depth {
        settings.max_call_depth = depth;
    }
    if let Some(length) = args.max_array_length {
        settings.max_array_length = length;
    }
    settings.validate()?;
    tracing::debug!(?settings, "settings");
    Ok(settings)
}

pub fn engine(settings: CompilerSettings) -> anyhow::Result<ScriptEngine> {
    Ok(ScriptEngine::with_defaults(settings)?)
}

/// Script name (file stem) and source text.
pub fn read_script(path: &Path) -> anyhow::Result<(String, String)> {
    let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    Ok((name, source))
}
