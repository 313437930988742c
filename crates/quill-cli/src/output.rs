//! Colored terminal output.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// `NO_COLOR` wins over `--color`, which wins over TTY detection.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    fn write_styled(stream: &mut StandardStream, text: &str, color: Color, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color)).set_bold(bold);
        let _ = stream.set_color(&spec);
        let _ = write!(stream, "{}", text);
        let _ = stream.reset();
    }

    /// Green bold text on stdout.
    pub fn success(&mut self, text: &str) {
        Self::write_styled(&mut self.stdout, text, Color::Green, true);
    }

    pub fn plain(&mut self, text: &str) {
        let _ = write!(self.stdout, "{}", text);
    }

    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    /// Red bold text on stderr.
    pub fn error(&mut self, text: &str) {
        Self::write_styled(&mut self.stderr, text, Color::Red, true);
    }

    /// Dimmed text on stderr.
    pub fn note(&mut self, text: &str) {
        Self::write_styled(&mut self.stderr, text, Color::Cyan, false);
    }

    pub fn stderr(&mut self) -> &mut StandardStream {
        &mut self.stderr
    }
}
