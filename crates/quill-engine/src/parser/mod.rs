//! Syntax front-end: tokens, lexer, arena syntax tree, parser and traversal.
//!
//! ```ignore
//! use quill_engine::parser::parse;
//!
//! let tree = parse("int x = 1; x + 2", &|name: &str| name == "String")?;
//! let (functions, statements) = tree.source_parts();
//! ```

pub mod ast;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;
pub mod token;
pub mod visit;

pub use ast::{NodeId, NodeKind, SyntaxNode, SyntaxTree, TypeName};
pub use lexer::{LexError, Lexer};
pub use parser::{parse, ParseError, ParseErrorKind, Parser, TypeNames, PRIMITIVE_TYPES};
pub use token::{Span, Token};
