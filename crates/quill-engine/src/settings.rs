//! Compiler and runtime settings.
//!
//! Loaded from a TOML file such as `quill.toml` or built in
//! code; every field has a default so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading or validating settings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file
    #[error("Failed to read settings: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse settings: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A value is out of its allowed range
    #[error("Invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

pub const DEFAULT_MAX_LOOP_COUNTER: u32 = 1_000_000;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1 << 24;
pub const DEFAULT_MAX_CALL_SITE_DEPTH: usize = 4;
pub const DEFAULT_MAX_STACK_BYTES: usize = 1 << 20;

/// Largest accepted `max_call_depth`
pub const MAX_CALL_DEPTH_LIMIT: usize = 4096;
/// Smallest accepted `max_stack_bytes`
pub const MIN_STACK_BYTES: usize = 64 << 10;

/// Settings shared by the compiler and the runtime of a script engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerSettings {
    /// Allow regex literals and the `=~` / `==~` operators
    pub regex_enabled: bool,

    /// Loop iterations (and user function calls) allowed per execution; 0 disables the counter
    pub max_loop_counter: u32,

    /// Maximum nesting of script function calls
    pub max_call_depth: usize,

    /// Native stack one execution may use for nested script calls; calls
    /// beyond it fail with a stack overflow even below `max_call_depth`
    pub max_stack_bytes: usize,

    /// Largest array a script may allocate
    pub max_array_length: usize,

    /// Receiver types cached per dynamic call site before it turns megamorphic
    pub max_call_site_depth: usize,

    /// Run the IR optimizers
    pub optimize: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            regex_enabled: true,
            max_loop_counter: DEFAULT_MAX_LOOP_COUNTER,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_stack_bytes: DEFAULT_MAX_STACK_BYTES,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
            max_call_site_depth: DEFAULT_MAX_CALL_SITE_DEPTH,
            optimize: true,
        }
    }
}

impl CompilerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from TOML text and validate them.
    pub fn from_toml(text: &str) -> Result<Self, SettingsError> {
        let settings: CompilerSettings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_call_depth == 0 || self.max_call_depth > MAX_CALL_DEPTH_LIMIT {
            return Err(SettingsError::Invalid {
                name: "max_call_depth",
                reason: format!("must be between 1 and {}", MAX_CALL_DEPTH_LIMIT),
            });
        }
        if self.max_stack_bytes < MIN_STACK_BYTES {
            return Err(SettingsError::Invalid {
                name: "max_stack_bytes",
                reason: format!("must be at least {}", MIN_STACK_BYTES),
            });
        }
        if self.max_call_site_depth == 0 {
            return Err(SettingsError::Invalid {
                name: "max_call_site_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_array_length > i32::MAX as usize {
            return Err(SettingsError::Invalid {
                name: "max_array_length",
                reason: format!("must not exceed {}", i32::MAX),
            });
        }
        Ok(())
    }

    /// Whether the loop counter is active.
    pub fn loop_counter_enabled(&self) -> bool {
        self.max_loop_counter > 0
    }

    pub fn with_regex(mut self, enabled: bool) -> Self {
        self.regex_enabled = enabled;
        self
    }

    pub fn with_max_loop_counter(mut self, limit: u32) -> Self {
        self.max_loop_counter = limit;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_stack_bytes(mut self, bytes: usize) -> Self {
        self.max_stack_bytes = bytes;
        self
    }

    pub fn with_max_array_length(mut self, length: usize) -> Self {
        self.max_array_length = length;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = CompilerSettings::default();
        assert!(settings.regex_enabled);
        assert!(settings.optimize);
        assert_eq!(settings.max_loop_counter, DEFAULT_MAX_LOOP_COUNTER);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = CompilerSettings::from_toml("regex_enabled = false\nmax_loop_counter = 0\n").unwrap();
        assert!(!settings.regex_enabled);
        assert!(!settings.loop_counter_enabled());
        assert_eq!(settings.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = CompilerSettings::from_toml("regex = true").unwrap_err();
        assert!(matches!(err, SettingsError::ParseError(_)));
    }

    #[test]
    fn test_invalid_value_rejected() {
        let err = CompilerSettings::from_toml("max_call_depth = 0").unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                name: "max_call_depth",
                ..
            }
        ));
    }

    #[test]
    fn test_call_depth_is_bounded() {
        assert!(CompilerSettings::default().with_max_call_depth(MAX_CALL_DEPTH_LIMIT).validate().is_ok());
        let err = CompilerSettings::from_toml("max_call_depth = 100000").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { name: "max_call_depth", .. }));
        let err = CompilerSettings::from_toml("max_stack_bytes = 1024").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { name: "max_stack_bytes", .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "optimize = false").unwrap();
        let settings = CompilerSettings::load(file.path()).unwrap();
        assert!(!settings.optimize);
    }
}
