//! Diagnostic rendering
//!
//! Compile errors carry a source span; this module turns them into
//! `codespan-reporting` diagnostics for terminals and into JSON for tools.
//! Runtime exceptions carry a position only, so they are rendered with a
//! zero-width label.

use crate::error::{CompileError, CompileErrorKind};
use crate::vm::exception::ScriptException;
use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, LabelStyle, Severity};
use codespan_reporting::files::{Files, SimpleFile};
use codespan_reporting::term;
use serde::{Deserialize, Serialize};
use termcolor::{ColorChoice, NoColor, StandardStream, WriteColor};

/// Error code for a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        self.0
    }
}

/// Error code of a compile error kind.
pub fn error_code(kind: CompileErrorKind) -> ErrorCode {
    match kind {
        CompileErrorKind::Syntax => ErrorCode("Q1001"),
        CompileErrorKind::Unresolved => ErrorCode("Q2001"),
        CompileErrorKind::Type => ErrorCode("Q2002"),
        CompileErrorKind::Structure => ErrorCode("Q2003"),
        CompileErrorKind::Disabled => ErrorCode("Q2004"),
        CompileErrorKind::Limit => ErrorCode("Q3001"),
        CompileErrorKind::Internal => ErrorCode("Q9001"),
    }
}

fn label_text(kind: CompileErrorKind) -> &'static str {
    match kind {
        CompileErrorKind::Syntax => "invalid syntax",
        CompileErrorKind::Unresolved => "not found",
        CompileErrorKind::Type => "type error",
        CompileErrorKind::Structure => "invalid structure",
        CompileErrorKind::Disabled => "disabled by settings",
        CompileErrorKind::Limit => "limit exceeded",
        CompileErrorKind::Internal => "compiler bug",
    }
}

/// A diagnostic bound to one script source.
pub struct Diagnostic {
    inner: CsDiagnostic<()>,
    code: Option<ErrorCode>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            inner: CsDiagnostic::error().with_message(message),
            code: None,
        }
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self.inner = self.inner.with_code(code.0);
        self
    }

    pub fn with_primary_label(mut self, range: std::ops::Range<usize>, message: impl Into<String>) -> Self {
        self.inner.labels.push(Label::primary((), range).with_message(message));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.inner.notes.push(note.into());
        self
    }

    pub fn from_compile_error(error: &CompileError) -> Self {
        let mut diag = Diagnostic::error(error.message.clone())
            .with_code(error_code(error.kind))
            .with_primary_label(error.span.start..error.span.end, label_text(error.kind));
        if error.kind == CompileErrorKind::Internal {
            diag = diag.with_note("this is a bug in the compiler");
        }
        diag
    }

    pub fn from_script_exception(exception: &ScriptException) -> Self {
        let mut diag = Diagnostic::error(exception.to_string());
        if let Some(position) = exception.position {
            diag = diag.with_primary_label(position..position, "raised here");
        }
        if exception.is_sandbox_fault() {
            diag = diag.with_note("the script was stopped by the sandbox");
        }
        diag
    }

    pub fn inner(&self) -> &CsDiagnostic<()> {
        &self.inner
    }

    /// Write the diagnostic to `writer`.
    pub fn write_to(&self, writer: &mut dyn WriteColor, file: &SimpleFile<String, String>) -> Result<(), codespan_reporting::files::Error> {
        let config = term::Config::default();
        term::emit(writer, &config, file, &self.inner)
    }

    /// Emit to stderr with colors when the terminal supports them.
    pub fn emit(&self, file: &SimpleFile<String, String>) -> Result<(), codespan_reporting::files::Error> {
        let mut writer = StandardStream::stderr(ColorChoice::Auto);
        self.write_to(&mut writer, file)
    }

    /// Render without colors.
    pub fn render(&self, file: &SimpleFile<String, String>) -> String {
        let mut writer = NoColor::new(Vec::new());
        match self.write_to(&mut writer, file) {
            Ok(()) => String::from_utf8_lossy(&writer.into_inner()).into_owned(),
            Err(_) => self.inner.message.clone(),
        }
    }

    pub fn to_json(&self, file: &SimpleFile<String, String>) -> JsonDiagnostic {
        JsonDiagnostic::from_diagnostic(self, file)
    }
}

/// JSON form of a diagnostic
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonDiagnostic {
    pub code: Option<String>,
    pub severity: String,
    pub message: String,
    pub labels: Vec<JsonLabel>,
    pub notes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonLabel {
    pub file: String,
    /// 1-indexed
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub message: String,
    pub style: String,
}

impl JsonDiagnostic {
    pub fn from_diagnostic(diag: &Diagnostic, file: &SimpleFile<String, String>) -> Self {
        let severity = match diag.inner.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Help => "help",
            Severity::Bug => "bug",
        };
        let labels = diag
            .inner
            .labels
            .iter()
            .filter_map(|label| {
                let start = file.location((), label.range.start).ok()?;
                let end = file.location((), label.range.end).ok()?;
                Some(JsonLabel {
                    file: file.name().clone(),
                    start_line: start.line_number,
                    start_column: start.column_number,
                    end_line: end.line_number,
                    end_column: end.column_number,
                    message: label.message.clone(),
                    style: match label.style {
                        LabelStyle::Primary => "primary",
                        LabelStyle::Secondary => "secondary",
                    }
                    .to_string(),
                })
            })
            .collect();

        JsonDiagnostic {
            code: diag.code.map(|c| c.0.to_string()),
            severity: severity.to_string(),
            message: diag.inner.message.clone(),
            labels,
            notes: diag.inner.notes.clone(),
        }
    }
}

/// A codespan file for one script.
pub fn script_file(name: impl Into<String>, source: impl Into<String>) -> SimpleFile<String, String> {
    SimpleFile::new(name.into(), source.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Span;

    #[test]
    fn test_compile_error_has_code_and_label() {
        let error = CompileError::unresolved("Unknown variable [y]", Span::new(7, 8));
        let diag = Diagnostic::from_compile_error(&error);
        assert_eq!(diag.code, Some(ErrorCode("Q2001")));
        assert_eq!(diag.inner().labels[0].range, 7..8);
    }

    #[test]
    fn test_render_mentions_message_and_name() {
        let file = script_file("test.quill", "return y;");
        let error = CompileError::unresolved("Unknown variable [y]", Span::new(7, 8));
        let text = Diagnostic::from_compile_error(&error).render(&file);
        assert!(text.contains("Unknown variable [y]"));
        assert!(text.contains("test.quill"));
    }

    #[test]
    fn test_json_locations_are_one_indexed() {
        let file = script_file("s", "int x;\nreturn y;");
        let error = CompileError::unresolved("Unknown variable [y]", Span::new(14, 15));
        let json = Diagnostic::from_compile_error(&error).to_json(&file);
        assert_eq!(json.labels[0].start_line, 2);
        assert_eq!(json.labels[0].start_column, 8);
        assert_eq!(json.code.as_deref(), Some("Q2001"));
    }
}
