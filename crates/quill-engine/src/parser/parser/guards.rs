//! Parser guards against runaway loops and deep recursion

use super::ParseError;
use crate::parser::token::Span;

/// Maximum iterations for any parser loop
const MAX_LOOP_ITERATIONS: usize = 100_000;

/// Maximum nesting depth of statements and parenthesized expressions.
///
/// Every nested expression passes through the full precedence ladder, so the
/// limit is kept low enough to stay clear of the thread stack in debug builds.
pub const MAX_PARSE_DEPTH: usize = 48;

/// Guard against infinite loops in the parser.
///
/// ```ignore
/// let mut guard = LoopGuard::new("arguments");
/// while !parser.check(&Token::RightParen) {
///     guard.check(parser.current_span())?;
///     // ...
/// }
/// ```
pub struct LoopGuard {
    name: &'static str,
    count: usize,
    max: usize,
}

impl LoopGuard {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            count: 0,
            max: MAX_LOOP_ITERATIONS,
        }
    }

    #[inline]
    pub fn with_limit(name: &'static str, max: usize) -> Self {
        Self { name, count: 0, max }
    }

    /// Count one iteration, failing once the limit is passed.
    #[inline]
    pub fn check(&mut self, span: Span) -> Result<(), ParseError> {
        self.count += 1;
        if self.count > self.max {
            return Err(ParseError::limit_exceeded(
                format!("loop '{}' exceeded {} iterations", self.name, self.max),
                span,
            ));
        }
        Ok(())
    }
}

/// Tracks recursion depth; callers pair `enter` with `leave`.
#[derive(Debug, Default)]
pub struct DepthCounter {
    depth: usize,
}

impl DepthCounter {
    pub fn enter(&mut self, what: &str, span: Span) -> Result<(), ParseError> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(ParseError::limit_exceeded(
                format!("maximum nesting depth ({}) exceeded in {}", MAX_PARSE_DEPTH, what),
                span,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn current(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_guard_under_limit() {
        let mut guard = LoopGuard::with_limit("test", 10);
        for _ in 0..10 {
            assert!(guard.check(Span::default()).is_ok());
        }
    }

    #[test]
    fn test_loop_guard_exceeds_limit() {
        let mut guard = LoopGuard::with_limit("test", 3);
        for _ in 0..3 {
            let _ = guard.check(Span::default());
        }
        assert!(guard.check(Span::default()).is_err());
    }

    #[test]
    fn test_depth_counter_rejects_past_limit() {
        let mut depth = DepthCounter::default();
        for _ in 0..MAX_PARSE_DEPTH {
            depth.enter("test", Span::default()).unwrap();
        }
        assert!(depth.enter("test", Span::default()).is_err());
        assert_eq!(depth.current(), MAX_PARSE_DEPTH);
        depth.leave();
        assert!(depth.enter("test", Span::default()).is_ok());
    }
}
