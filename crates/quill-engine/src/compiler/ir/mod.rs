//! Intermediate representation
//!
//! A typed tree, one [`IrClass`] per script. Lowering produces it from the
//! decorated syntax tree, the optimizers rewrite it in place, and codegen
//! turns it into bytecode.
//!
//! # Structure
//!
//! - `IrClass` - the compiled script: functions plus static slots
//! - `IrFunction` - entry, declared, lambda, adapter, accessor or static init
//! - `Stmt` - structured control flow
//! - `Expr` - value-producing nodes with explicit casts and call kinds

pub mod node;
pub mod pretty;

pub use node::{
    rewrite_expr, rewrite_exprs, CatchClause, Constant, Expr, FieldRef, FunctionKind, Invoke, IrClass,
    IrFunction, Stmt, Target,
};
pub use pretty::PrettyPrint;
