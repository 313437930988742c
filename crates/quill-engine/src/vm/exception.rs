//! The uniform script exception.
//!
//! Whatever fault ends a script execution, the host sees one
//! [`ScriptException`]: the fault's class name and message, the fault itself
//! as the cause, and a header map locating the failure in the source.

use crate::vm::fault::Fault;
use indexmap::IndexMap;
use std::fmt;
use thiserror::Error;

/// Header naming the source snippet around the failure.
pub const HEADER_SCRIPT_STACK: &str = "script_stack";
/// Header naming the script source.
pub const HEADER_SCRIPT: &str = "script";
/// Header naming the failure offset.
pub const HEADER_POSITION: &str = "position";

const SNIPPET_RADIUS: usize = 25;

#[derive(Debug, Clone, Error)]
pub struct ScriptException {
    pub class_name: String,
    pub message: String,
    pub cause: Box<Fault>,
    /// Byte offset of the statement that faulted, when known
    pub position: Option<usize>,
    pub headers: IndexMap<String, Vec<String>>,
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)
    }
}

impl ScriptException {
    /// Normalize `fault`, raised at `position` of `source`.
    pub fn from_fault(fault: Fault, source: &str, position: Option<usize>) -> Self {
        if let Fault::Translated(exception) = fault {
            return *exception;
        }
        let class_name = fault.class_name().to_string();
        let message = match &fault {
            Fault::Thrown(e) => e.message.clone().unwrap_or_default(),
            other => other.to_string(),
        };

        let mut headers = IndexMap::new();
        if let Some(offset) = position {
            headers.insert(HEADER_SCRIPT_STACK.to_string(), script_stack(source, offset));
            headers.insert(HEADER_POSITION.to_string(), vec![offset.to_string()]);
        }
        headers.insert(HEADER_SCRIPT.to_string(), vec![source.to_string()]);

        Self {
            class_name,
            message,
            cause: Box::new(fault),
            position,
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers.get(name).map(Vec::as_slice)
    }

    /// Whether the cause is a sandbox fault rather than a script exception.
    pub fn is_sandbox_fault(&self) -> bool {
        !self.cause.is_catchable()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "class": self.class_name,
            "message": self.message,
            "position": self.position,
            "headers": self.headers,
        })
    }
}

/// A snippet of at most 25 characters either side of `offset` on its line,
/// with a pointer line under the failing character.
fn script_stack(source: &str, offset: usize) -> Vec<String> {
    let offset = floor_char_boundary(source, offset.min(source.len()));
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[offset..].find('\n').map_or(source.len(), |i| offset + i);

    let before: Vec<(usize, char)> = source[line_start..offset].char_indices().collect();
    let start = before
        .len()
        .checked_sub(SNIPPET_RADIUS)
        .and_then(|skip| before.get(skip))
        .map_or(line_start, |(i, _)| line_start + i);
    let end = source[offset..line_end]
        .char_indices()
        .nth(SNIPPET_RADIUS)
        .map_or(line_end, |(i, _)| offset + i);

    let snippet = &source[start..end];
    let column = source[start..offset].chars().count();
    vec![snippet.to_string(), format!("{}^---- HERE", " ".repeat(column))]
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_stack_points_at_offset() {
        let stack = script_stack("int x = 1;\nreturn x / 0;", 18);
        assert_eq!(stack[0], "return x / 0;");
        assert_eq!(stack[1], "       ^---- HERE");
    }

    #[test]
    fn test_script_stack_is_windowed() {
        let source = "a".repeat(40) + "X" + &"b".repeat(40);
        let stack = script_stack(&source, 40);
        assert_eq!(stack[0].chars().count(), 50);
        assert!(stack[1].starts_with(&" ".repeat(25)));
    }

    #[test]
    fn test_translated_passes_through() {
        let inner = ScriptException::from_fault(Fault::StackOverflow { depth: 8 }, "x", Some(0));
        let outer = ScriptException::from_fault(Fault::Translated(Box::new(inner)), "y", None);
        assert_eq!(outer.class_name, "StackOverflowError");
        assert_eq!(outer.header(HEADER_SCRIPT), Some(&["x".to_string()][..]));
    }

    #[test]
    fn test_sandbox_faults_are_flagged() {
        let e = ScriptException::from_fault(Fault::TooManyOperations { limit: 3 }, "", None);
        assert!(e.is_sandbox_fault());
        assert!(e.message.contains("(3)"));
    }
}
