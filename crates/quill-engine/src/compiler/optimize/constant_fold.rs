//! Constant folding
//!
//! Evaluates operations whose operands are all compile-time constants and
//! replaces them with the result. Arithmetic follows the run time exactly:
//! `int` and `long` wrap, shift distances are masked, and integer division
//! by zero is left in place so it still faults when executed.

use crate::compiler::ir::{rewrite_exprs, Constant, Expr, IrClass};
use crate::parser::ast::{BinaryOp, CompareOp, LogicalOp, UnaryOp};
use crate::semantic::Cast;
use crate::whitelist::ScriptType;

/// Folds constant subexpressions in place.
pub struct ConstantFolder;

impl ConstantFolder {
    pub fn new() -> Self {
        Self
    }

    /// Fold every function of `class`; returns the number of rewrites.
    pub fn fold(&self, class: &mut IrClass) -> usize {
        let mut count = 0;
        for function in &mut class.functions {
            rewrite_exprs(&mut function.body, &mut |expr| {
                if let Some(folded) = self.fold_expr(expr) {
                    *expr = folded;
                    count += 1;
                }
            });
        }
        tracing::trace!(count, "constant folding");
        count
    }

    /// Replacement for `expr`, if it folds. Children are already folded.
    fn fold_expr(&self, expr: &mut Expr) -> Option<Expr> {
        match expr {
            Expr::Unary { op, operand, .. } => fold_unary(*op, operand.constant()?).map(Expr::Const),
            Expr::Binary { op, left, right, .. } => {
                fold_binary(*op, left.constant()?, right.constant()?).map(Expr::Const)
            }
            Expr::Compare { op, left, right, .. } => {
                fold_compare(*op, left.constant()?, right.constant()?).map(|b| Expr::Const(Constant::Bool(b)))
            }
            Expr::Logical { op, left, right } => {
                let Constant::Bool(first) = left.constant()? else {
                    return None;
                };
                // a decided left side makes the right side dead
                match (op, first) {
                    (LogicalOp::And, false) => Some(Expr::Const(Constant::Bool(false))),
                    (LogicalOp::Or, true) => Some(Expr::Const(Constant::Bool(true))),
                    _ => Some(std::mem::replace(&mut **right, Expr::Seq(Vec::new()))),
                }
            }
            Expr::Cast { cast, value } => fold_cast(cast, value.constant()?).map(Expr::Const),
            Expr::Concat(parts) => fold_concat(parts),
            Expr::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                let Constant::Bool(taken) = condition.constant()? else {
                    return None;
                };
                let branch = if *taken { then_value } else { else_value };
                Some(std::mem::replace(&mut **branch, Expr::Seq(Vec::new())))
            }
            Expr::Elvis { value, fallback } => {
                let replacement = match value.constant()? {
                    Constant::Null => std::mem::replace(&mut **fallback, Expr::Seq(Vec::new())),
                    _ => std::mem::replace(&mut **value, Expr::Seq(Vec::new())),
                };
                Some(replacement)
            }
            Expr::IsNull(value) => value
                .constant()
                .map(|c| Expr::Const(Constant::Bool(*c == Constant::Null))),
            _ => None,
        }
    }
}

impl Default for ConstantFolder {
    fn default() -> Self {
        Self::new()
    }
}

fn fold_unary(op: UnaryOp, operand: &Constant) -> Option<Constant> {
    Some(match (op, operand) {
        (UnaryOp::Neg, Constant::Int(v)) => Constant::Int(v.wrapping_neg()),
        (UnaryOp::Neg, Constant::Long(v)) => Constant::Long(v.wrapping_neg()),
        (UnaryOp::Neg, Constant::Double(v)) => Constant::Double(-v),
        (UnaryOp::Plus, c) if !matches!(c, Constant::Str(_) | Constant::Null) => c.clone(),
        (UnaryOp::Not, Constant::Bool(b)) => Constant::Bool(!b),
        (UnaryOp::BitNot, Constant::Int(v)) => Constant::Int(!v),
        (UnaryOp::BitNot, Constant::Long(v)) => Constant::Long(!v),
        _ => return None,
    })
}

fn fold_binary(op: BinaryOp, left: &Constant, right: &Constant) -> Option<Constant> {
    match (left, right) {
        (Constant::Int(a), Constant::Int(b)) => fold_int(op, *a, *b).map(Constant::Int),
        (Constant::Long(a), Constant::Long(b)) => fold_long(op, *a, *b).map(Constant::Long),
        (Constant::Long(a), Constant::Int(b)) if is_shift(op) => fold_long(op, *a, i64::from(*b)).map(Constant::Long),
        (Constant::Double(a), Constant::Double(b)) => fold_double(op, *a, *b).map(Constant::Double),
        (Constant::Bool(a), Constant::Bool(b)) => Some(Constant::Bool(match op {
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            BinaryOp::BitXor => a ^ b,
            _ => return None,
        })),
        _ => None,
    }
}

fn is_shift(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
}

fn fold_int(op: BinaryOp, a: i32, b: i32) -> Option<i32> {
    Some(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b != 0 => a.wrapping_div(b),
        BinaryOp::Rem if b != 0 => a.wrapping_rem(b),
        BinaryOp::Shl => a.wrapping_shl(b as u32 & 31),
        BinaryOp::Shr => a.wrapping_shr(b as u32 & 31),
        BinaryOp::Ushr => ((a as u32) >> (b as u32 & 31)) as i32,
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        _ => return None,
    })
}

fn fold_long(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b != 0 => a.wrapping_div(b),
        BinaryOp::Rem if b != 0 => a.wrapping_rem(b),
        BinaryOp::Shl => a.wrapping_shl(b as u32 & 63),
        BinaryOp::Shr => a.wrapping_shr(b as u32 & 63),
        BinaryOp::Ushr => ((a as u64) >> (b as u32 & 63)) as i64,
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        _ => return None,
    })
}

fn fold_double(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
    Some(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return None,
    })
}

fn fold_compare(op: CompareOp, left: &Constant, right: &Constant) -> Option<bool> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Constant::Int(a), Constant::Int(b)) => a.partial_cmp(b),
        (Constant::Long(a), Constant::Long(b)) => a.partial_cmp(b),
        (Constant::Double(a), Constant::Double(b)) => a.partial_cmp(b),
        (Constant::Bool(a), Constant::Bool(b)) if matches!(op, CompareOp::Eq | CompareOp::Ne) => a.partial_cmp(b),
        (Constant::Str(a), Constant::Str(b)) if matches!(op, CompareOp::Eq | CompareOp::Ne) => a.partial_cmp(b),
        (Constant::Null, Constant::Null) => Some(Ordering::Equal),
        _ => return None,
    };
    // NaN compares false everywhere except `!=`
    let Some(ordering) = ordering else {
        return Some(matches!(op, CompareOp::Ne | CompareOp::RefNe));
    };
    Some(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        // identity of two null literals only
        CompareOp::RefEq if *left == Constant::Null => true,
        CompareOp::RefNe if *left == Constant::Null => false,
        CompareOp::RefEq | CompareOp::RefNe => return None,
    })
}

fn fold_cast(cast: &Cast, value: &Constant) -> Option<Constant> {
    let Cast::Numeric { to, .. } = cast else {
        return None;
    };
    // `as` saturates float-to-integer conversions and maps NaN to zero
    Some(match (value, to) {
        (Constant::Int(v), ScriptType::Int) => Constant::Int(*v),
        (Constant::Int(v), ScriptType::Long) => Constant::Long(i64::from(*v)),
        (Constant::Int(v), ScriptType::Double) => Constant::Double(f64::from(*v)),
        (Constant::Long(v), ScriptType::Int) => Constant::Int(*v as i32),
        (Constant::Long(v), ScriptType::Long) => Constant::Long(*v),
        (Constant::Long(v), ScriptType::Double) => Constant::Double(*v as f64),
        (Constant::Double(v), ScriptType::Int) => Constant::Int(*v as i32),
        (Constant::Double(v), ScriptType::Long) => Constant::Long(*v as i64),
        (Constant::Double(v), ScriptType::Double) => Constant::Double(*v),
        _ => return None,
    })
}

/// Merge adjacent constant parts; a fully constant concatenation becomes a
/// string constant.
fn fold_concat(parts: &mut Vec<Expr>) -> Option<Expr> {
    let mut merged: Vec<Expr> = Vec::with_capacity(parts.len());
    let mut changed = false;
    for part in parts.drain(..) {
        if let (Some(Expr::Const(previous)), Expr::Const(next)) = (merged.last_mut(), &part) {
            let text = previous.concat_text() + &next.concat_text();
            *previous = Constant::Str(text);
            changed = true;
            continue;
        }
        merged.push(part);
    }
    if let [Expr::Const(only)] = merged.as_slice() {
        return Some(Expr::Const(Constant::Str(only.concat_text())));
    }
    *parts = merged;
    changed.then(|| Expr::Concat(std::mem::take(parts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{FunctionKind, IrFunction, Stmt};

    fn binary(op: BinaryOp, ty: ScriptType, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            ty,
            left: left.boxed(),
            right: right.boxed(),
        }
    }

    fn int(v: i32) -> Expr {
        Expr::Const(Constant::Int(v))
    }

    fn folded(value: Expr) -> Stmt {
        let mut class = IrClass {
            name: "t".to_string(),
            source: String::new(),
            functions: vec![IrFunction {
                name: "execute".to_string(),
                kind: FunctionKind::Entry,
                params: 1,
                slots: 1,
                body: vec![Stmt::Return(Some(value))],
            }],
            static_slots: 0,
            static_init: None,
        };
        ConstantFolder::new().fold(&mut class);
        class.functions.remove(0).body.remove(0)
    }

    #[test]
    fn test_fold_nested_arithmetic() {
        let expr = binary(
            BinaryOp::Add,
            ScriptType::Int,
            int(1),
            binary(BinaryOp::Mul, ScriptType::Int, int(2), int(3)),
        );
        assert_eq!(folded(expr), Stmt::Return(Some(int(7))));
    }

    #[test]
    fn test_int_overflow_wraps() {
        let expr = binary(BinaryOp::Add, ScriptType::Int, int(i32::MAX), int(1));
        assert_eq!(folded(expr), Stmt::Return(Some(int(i32::MIN))));
    }

    #[test]
    fn test_division_by_zero_is_kept() {
        let expr = binary(BinaryOp::Div, ScriptType::Int, int(1), int(0));
        assert_eq!(folded(expr.clone()), Stmt::Return(Some(expr)));
    }

    #[test]
    fn test_shift_distance_is_masked() {
        let expr = binary(BinaryOp::Shl, ScriptType::Int, int(1), int(33));
        assert_eq!(folded(expr), Stmt::Return(Some(int(2))));
        let expr = binary(BinaryOp::Ushr, ScriptType::Int, int(-1), int(28));
        assert_eq!(folded(expr), Stmt::Return(Some(int(15))));
    }

    #[test]
    fn test_concat_merges_constants() {
        let expr = Expr::Concat(vec![
            Expr::Const(Constant::Str("a".into())),
            Expr::Const(Constant::Int(1)),
            Expr::Local(0),
            Expr::Const(Constant::Double(2.0)),
            Expr::Const(Constant::Bool(true)),
        ]);
        assert_eq!(
            folded(expr),
            Stmt::Return(Some(Expr::Concat(vec![
                Expr::Const(Constant::Str("a1".into())),
                Expr::Local(0),
                Expr::Const(Constant::Str("2.0true".into())),
            ])))
        );

        let expr = Expr::Concat(vec![Expr::Const(Constant::Str("x".into())), Expr::Const(Constant::Null)]);
        assert_eq!(folded(expr), Stmt::Return(Some(Expr::Const(Constant::Str("xnull".into())))));
    }

    #[test]
    fn test_numeric_cast_of_constant() {
        let expr = Expr::Cast {
            cast: Cast::Numeric {
                from: ScriptType::Double,
                to: ScriptType::Int,
            },
            value: Expr::Const(Constant::Double(3.9)).boxed(),
        };
        assert_eq!(folded(expr), Stmt::Return(Some(int(3))));
    }

    #[test]
    fn test_constant_condition_picks_branch() {
        let expr = Expr::Conditional {
            condition: Expr::Compare {
                op: CompareOp::Lt,
                ty: ScriptType::Int,
                left: int(1).boxed(),
                right: int(2).boxed(),
            }
            .boxed(),
            then_value: Expr::Local(0).boxed(),
            else_value: int(0).boxed(),
        };
        assert_eq!(folded(expr), Stmt::Return(Some(Expr::Local(0))));
    }

    #[test]
    fn test_nan_comparisons() {
        let nan = || Expr::Const(Constant::Double(f64::NAN));
        let compare = |op| Expr::Compare {
            op,
            ty: ScriptType::Double,
            left: nan().boxed(),
            right: nan().boxed(),
        };
        assert_eq!(
            folded(compare(CompareOp::Eq)),
            Stmt::Return(Some(Expr::Const(Constant::Bool(false))))
        );
        assert_eq!(
            folded(compare(CompareOp::Ne)),
            Stmt::Return(Some(Expr::Const(Constant::Bool(true))))
        );
    }
}
