//! String concatenation strategy
//!
//! `a + b + c` on strings lowers to nested binary additions. This pass
//! replaces every string-typed addition with a `Concat` node and merges
//! directly nested concatenations, so codegen emits a single `Concat n`
//! instead of n-1 intermediate strings.

use crate::compiler::ir::{rewrite_exprs, Expr, IrClass};
use crate::parser::ast::BinaryOp;
use crate::semantic::casts::is_string;
use crate::whitelist::Whitelist;

pub struct StringConcat<'a> {
    whitelist: &'a Whitelist,
}

impl<'a> StringConcat<'a> {
    pub fn new(whitelist: &'a Whitelist) -> Self {
        Self { whitelist }
    }

    /// Rewrite every function; returns the number of concatenations built.
    pub fn run(&self, class: &mut IrClass) -> usize {
        let mut count = 0;
        for function in &mut class.functions {
            rewrite_exprs(&mut function.body, &mut |expr| {
                if self.join(expr) {
                    count += 1;
                }
            });
        }
        count
    }

    fn join(&self, expr: &mut Expr) -> bool {
        let Expr::Binary {
            op: BinaryOp::Add,
            ty,
            left,
            right,
        } = expr
        else {
            return false;
        };
        if !is_string(self.whitelist, ty) {
            return false;
        }
        let mut parts = Vec::new();
        for side in [left, right] {
            match std::mem::replace(&mut **side, Expr::Seq(Vec::new())) {
                Expr::Concat(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        *expr = Expr::Concat(parts);
        true
    }
}
