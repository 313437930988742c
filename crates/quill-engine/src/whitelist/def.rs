//! Dynamic ("def") call-site references.
//!
//! A def call site is compiled to a compact string key naming what the site
//! does; the loader decodes the key and the runtime dispatcher resolves it
//! against each receiver type it sees.
//!
//! Encoding: `<strategy>:<name>/<arity>` optionally followed by
//! `#<c0>,<c1>,...`, one capture count per argument (`-` for arguments that
//! are not lambdas or function references). Strategies are `M` (method
//! call), `L` (field load) and `S` (field store).

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefStrategy {
    Method,
    Load,
    Store,
}

impl DefStrategy {
    fn tag(self) -> char {
        match self {
            DefStrategy::Method => 'M',
            DefStrategy::Load => 'L',
            DefStrategy::Store => 'S',
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "M" => DefStrategy::Method,
            "L" => DefStrategy::Load,
            "S" => DefStrategy::Store,
            _ => return None,
        })
    }
}

/// A decoded dynamic call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefReference {
    pub strategy: DefStrategy,
    pub name: String,
    /// Argument count, excluding the receiver
    pub arity: u16,
    /// Per-argument capture counts of function-valued arguments
    pub captures: Vec<Option<u16>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed def reference `{encoded}`: {reason}")]
pub struct DefReferenceError {
    pub encoded: String,
    pub reason: &'static str,
}

impl DefReference {
    pub fn method(name: impl Into<String>, arity: u16, captures: Vec<Option<u16>>) -> Self {
        let captures = if captures.iter().all(Option::is_none) {
            Vec::new()
        } else {
            captures
        };
        Self {
            strategy: DefStrategy::Method,
            name: name.into(),
            arity,
            captures,
        }
    }

    pub fn load(name: impl Into<String>) -> Self {
        Self {
            strategy: DefStrategy::Load,
            name: name.into(),
            arity: 0,
            captures: Vec::new(),
        }
    }

    pub fn store(name: impl Into<String>) -> Self {
        Self {
            strategy: DefStrategy::Store,
            name: name.into(),
            arity: 1,
            captures: Vec::new(),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn decode(encoded: &str) -> Result<Self, DefReferenceError> {
        let fail = |reason| DefReferenceError {
            encoded: encoded.to_string(),
            reason,
        };
        let (head, captures) = match encoded.split_once('#') {
            Some((head, tail)) => (head, Some(tail)),
            None => (encoded, None),
        };
        let (tag, rest) = head.split_once(':').ok_or_else(|| fail("missing strategy"))?;
        let strategy = DefStrategy::from_tag(tag).ok_or_else(|| fail("unknown strategy"))?;
        let (name, arity) = rest.rsplit_once('/').ok_or_else(|| fail("missing arity"))?;
        if name.is_empty() {
            return Err(fail("empty name"));
        }
        let arity: u16 = arity.parse().map_err(|_| fail("invalid arity"))?;

        let captures = match captures {
            None => Vec::new(),
            Some(list) => list
                .split(',')
                .map(|item| match item {
                    "-" => Ok(None),
                    n => n.parse::<u16>().map(Some).map_err(|_| fail("invalid capture count")),
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        if !captures.is_empty() && captures.len() != arity as usize {
            return Err(fail("capture list does not match arity"));
        }

        Ok(Self {
            strategy,
            name: name.to_string(),
            arity,
            captures,
        })
    }
}

impl fmt::Display for DefReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.strategy.tag(), self.name, self.arity)?;
        if self.captures.iter().any(Option::is_some) {
            f.write_str("#")?;
            for (i, capture) in self.captures.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                match capture {
                    Some(n) => write!(f, "{}", n)?,
                    None => f.write_str("-")?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_plain_method() {
        let r = DefReference::method("add", 1, vec![None]);
        assert_eq!(r.encode(), "M:add/1");
    }

    #[test]
    fn test_encode_with_captures() {
        let r = DefReference::method("sort", 2, vec![None, Some(2)]);
        assert_eq!(r.encode(), "M:sort/2#-,2");
        assert_eq!(DefReference::decode("M:sort/2#-,2").unwrap(), r);
    }

    #[test]
    fn test_decode_field_strategies() {
        assert_eq!(DefReference::decode("L:size/0").unwrap(), DefReference::load("size"));
        assert_eq!(DefReference::decode("S:x/1").unwrap(), DefReference::store("x"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(DefReference::decode("X:foo/1").is_err());
        assert!(DefReference::decode("M:foo").is_err());
        assert!(DefReference::decode("M:/1").is_err());
        assert!(DefReference::decode("M:foo/2#1").is_err());
    }
}
