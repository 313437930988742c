//! Regex literal validation.

use crate::error::{CompileError, CompileResult};
use crate::parser::Span;
use crate::semantic::decoration::RegexInfo;
use regex::Regex;

/// Validate a `/pattern/flags` literal and compile it once.
pub fn validate(pattern: &str, flags: &str, enabled: bool, span: Span) -> CompileResult<RegexInfo> {
    if !enabled {
        return Err(CompileError::disabled(
            "Regexes are disabled; set [regex_enabled] to [true] in the compiler settings",
            span,
        ));
    }

    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' | 'x' => {
                if !inline.contains(flag) {
                    inline.push(flag);
                }
            }
            // unicode case and character classes are always on
            'U' | 'u' => {}
            'c' => {
                return Err(CompileError::type_error(
                    "Regex flag [c] (canonical equivalence) is not supported",
                    span,
                ))
            }
            other => {
                return Err(CompileError::type_error(
                    format!("Invalid regex flag [{}]", other),
                    span,
                ))
            }
        }
    }

    check_backreferences(pattern, span)?;

    let full = if inline.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", inline, pattern)
    };
    Regex::new(&full).map_err(|e| {
        CompileError::type_error(format!("Invalid regex [{}]: {}", pattern, summary(&e.to_string())), span)
    })?;

    Ok(RegexInfo {
        pattern: full,
        flags: flags.to_string(),
    })
}

fn summary(message: &str) -> &str {
    message.lines().last().unwrap_or(message).trim()
}

/// Capture groups of a pattern: total count and the names of named groups.
fn scan_groups(pattern: &str) -> (usize, Vec<String>) {
    let chars: Vec<char> = pattern.chars().collect();
    let mut count = 0;
    let mut names = Vec::new();
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' if !in_class => {
                in_class = true;
                if chars.get(i + 1) == Some(&'^') {
                    i += 1;
                }
                if chars.get(i + 1) == Some(&']') {
                    i += 1;
                }
            }
            ']' if in_class => in_class = false,
            '(' if !in_class => {
                if chars.get(i + 1) != Some(&'?') {
                    count += 1;
                } else {
                    let rest: String = chars[i + 2..].iter().collect();
                    let name_start = if rest.starts_with("P<") {
                        Some(2)
                    } else if rest.starts_with('<') && !rest.starts_with("<=") && !rest.starts_with("<!") {
                        Some(1)
                    } else {
                        None
                    };
                    if let Some(offset) = name_start {
                        count += 1;
                        let name: String = rest[offset..].chars().take_while(|c| *c != '>').collect();
                        names.push(name);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    (count, names)
}

/// Reject `\N` and `\k<name>`: an existing group is unsupported, a missing
/// one is invalid.
fn check_backreferences(pattern: &str, span: Span) -> CompileResult<()> {
    let (groups, names) = scan_groups(pattern);
    let chars: Vec<char> = pattern.chars().collect();
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let next = chars.get(i + 1).copied();
                match next {
                    Some(d) if !in_class && ('1'..='9').contains(&d) => {
                        let digits: String = chars[i + 1..].iter().take_while(|c| c.is_ascii_digit()).collect();
                        let group: usize = digits.parse().unwrap_or(usize::MAX);
                        let shown = format!("\\{}", digits);
                        return Err(if group > groups {
                            CompileError::type_error(
                                format!("Invalid backreference [{}]: group {} does not exist", shown, digits),
                                span,
                            )
                        } else {
                            unsupported(&shown, span)
                        });
                    }
                    Some('k') if !in_class && chars.get(i + 2) == Some(&'<') => {
                        let name: String = chars[i + 3..].iter().take_while(|c| **c != '>').collect();
                        let shown = format!("\\k<{}>", name);
                        return Err(if names.contains(&name) {
                            unsupported(&shown, span)
                        } else {
                            CompileError::type_error(
                                format!("Invalid backreference [{}]: no group named [{}]", shown, name),
                                span,
                            )
                        });
                    }
                    _ => i += 1,
                }
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

fn unsupported(shown: &str, span: Span) -> CompileError {
    CompileError::type_error(
        format!("Backreference [{}] is not supported by the regex engine", shown),
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    fn check(pattern: &str, flags: &str) -> CompileResult<RegexInfo> {
        validate(pattern, flags, true, Span::new(0, 1))
    }

    #[test]
    fn test_flags_are_inlined() {
        let info = check("ab+c", "iU").unwrap();
        assert_eq!(info.pattern, "(?i)ab+c");
        assert_eq!(check("x", "").unwrap().pattern, "x");
    }

    #[test]
    fn test_disabled_regex() {
        let err = validate("a", "", false, Span::new(2, 5)).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Disabled);
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn test_bad_flags() {
        assert!(check("a", "c").unwrap_err().message.contains("canonical"));
        assert!(check("a", "q").unwrap_err().message.contains("Invalid regex flag [q]"));
    }

    #[test]
    fn test_backreferences() {
        let missing = check("(a)\\2", "").unwrap_err();
        assert!(missing.message.contains("group 2 does not exist"), "{}", missing.message);
        let existing = check("(a)\\1", "").unwrap_err();
        assert!(existing.message.contains("not supported"), "{}", existing.message);
        let named = check("(?P<x>a)\\k<x>", "").unwrap_err();
        assert!(named.message.contains("not supported"));
        let unnamed = check("(a)\\k<y>", "").unwrap_err();
        assert!(unnamed.message.contains("no group named [y]"));
    }

    #[test]
    fn test_group_scan_skips_classes_and_lookarounds() {
        assert_eq!(scan_groups("(a)(?:b)[(]\\(").0, 1);
        assert_eq!(scan_groups("(?<n>a)(?P<m>b)").1, vec!["n".to_string(), "m".to_string()]);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(check("(unclosed", "").is_err());
    }
}
