//! Operator semantics.
//!
//! Statically typed operators arrive with their operand kind; `def`
//! operators promote at run time from the operands' actual types. Integer
//! arithmetic wraps, division by zero raises `ArithmeticException`, shift
//! distances are masked to the operand width.

use crate::compiler::bytecode::{NumKind, Opcode};
use crate::vm::fault::Fault;
use crate::vm::value::{value_equals, Value};
use crate::whitelist::{ScriptType, Whitelist};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i32),
    Long(i64),
    Double(f64),
}

impl Num {
    fn rank(self) -> u8 {
        match self {
            Num::Int(_) => 0,
            Num::Long(_) => 1,
            Num::Double(_) => 2,
        }
    }

    fn to_rank(self, rank: u8) -> Num {
        match (self, rank) {
            (Num::Int(i), 1) => Num::Long(i as i64),
            (Num::Int(i), 2) => Num::Double(i as f64),
            (Num::Long(l), 0) => Num::Int(l as i32),
            (Num::Long(l), 2) => Num::Double(l as f64),
            (Num::Double(d), 0) => Num::Int(d as i32),
            (Num::Double(d), 1) => Num::Long(d as i64),
            (n, _) => n,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::Int(i),
            Num::Long(l) => Value::Long(l),
            Num::Double(d) => Value::Double(d),
        }
    }
}

fn kind_rank(kind: NumKind) -> Option<u8> {
    match kind {
        NumKind::Int => Some(0),
        NumKind::Long => Some(1),
        NumKind::Double => Some(2),
        NumKind::Def | NumKind::Bool => None,
    }
}

fn operand_error(wl: &Whitelist, op: &str, value: &Value) -> Fault {
    if value.is_null() {
        Fault::null_pointer(wl, format!("Cannot apply [{}] to a null value", op))
    } else {
        Fault::class_cast(wl, format!("Cannot apply [{}] to type [{}]", op, value.type_name()))
    }
}

fn num(wl: &Whitelist, op: &str, value: &Value) -> Result<Num, Fault> {
    match value {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Long(l) => Ok(Num::Long(*l)),
        Value::Double(d) => Ok(Num::Double(*d)),
        other => Err(operand_error(wl, op, other)),
    }
}

/// Both operands at the operation's rank: the static kind, or the wider of
/// the two for `def`.
fn promote(wl: &Whitelist, op: &str, kind: NumKind, a: &Value, b: &Value) -> Result<(Num, Num), Fault> {
    let (a, b) = (num(wl, op, a)?, num(wl, op, b)?);
    let rank = kind_rank(kind).unwrap_or_else(|| a.rank().max(b.rank()));
    Ok((a.to_rank(rank), b.to_rank(rank)))
}

fn op_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Rem => "%",
        Opcode::Shl => "<<",
        Opcode::Shr => ">>",
        Opcode::Ushr => ">>>",
        Opcode::BitAnd => "&",
        Opcode::BitOr => "|",
        Opcode::BitXor => "^",
        Opcode::Eq => "==",
        Opcode::Ne => "!=",
        Opcode::Lt => "<",
        Opcode::Le => "<=",
        Opcode::Gt => ">",
        Opcode::Ge => ">=",
        Opcode::Neg => "-",
        Opcode::BitNot => "~",
        _ => "?",
    }
}

/// Apply a binary arithmetic, shift or bitwise opcode.
pub fn binary(wl: &Whitelist, op: Opcode, kind: NumKind, a: &Value, b: &Value) -> Result<Value, Fault> {
    let symbol = op_symbol(op);
    if kind == NumKind::Def && op == Opcode::Add && (matches!(a, Value::Str(_)) || matches!(b, Value::Str(_))) {
        return Ok(Value::string(format!("{}{}", a, b)));
    }
    if matches!(op, Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor) {
        if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
            return Ok(Value::Bool(match op {
                Opcode::BitAnd => x & y,
                Opcode::BitOr => x | y,
                _ => x ^ y,
            }));
        }
    }
    if matches!(op, Opcode::Shl | Opcode::Shr | Opcode::Ushr) {
        return shift(wl, op, kind, a, b);
    }

    let (x, y) = promote(wl, symbol, kind, a, b)?;
    let divide_by_zero = || Fault::arithmetic(wl, "/ by zero");
    let result = match (x, y) {
        (Num::Int(x), Num::Int(y)) => Num::Int(match op {
            Opcode::Add => x.wrapping_add(y),
            Opcode::Sub => x.wrapping_sub(y),
            Opcode::Mul => x.wrapping_mul(y),
            Opcode::Div if y == 0 => return Err(divide_by_zero()),
            Opcode::Div => x.wrapping_div(y),
            Opcode::Rem if y == 0 => return Err(divide_by_zero()),
            Opcode::Rem => x.wrapping_rem(y),
            Opcode::BitAnd => x & y,
            Opcode::BitOr => x | y,
            Opcode::BitXor => x ^ y,
            _ => return Err(operand_error(wl, symbol, a)),
        }),
        (Num::Long(x), Num::Long(y)) => Num::Long(match op {
            Opcode::Add => x.wrapping_add(y),
            Opcode::Sub => x.wrapping_sub(y),
            Opcode::Mul => x.wrapping_mul(y),
            Opcode::Div if y == 0 => return Err(divide_by_zero()),
            Opcode::Div => x.wrapping_div(y),
            Opcode::Rem if y == 0 => return Err(divide_by_zero()),
            Opcode::Rem => x.wrapping_rem(y),
            Opcode::BitAnd => x & y,
            Opcode::BitOr => x | y,
            Opcode::BitXor => x ^ y,
            _ => return Err(operand_error(wl, symbol, a)),
        }),
        (Num::Double(x), Num::Double(y)) => Num::Double(match op {
            Opcode::Add => x + y,
            Opcode::Sub => x - y,
            Opcode::Mul => x * y,
            Opcode::Div => x / y,
            Opcode::Rem => x % y,
            _ => return Err(operand_error(wl, symbol, a)),
        }),
        _ => return Err(Fault::Internal(format!("unpromoted operands for [{}]", symbol))),
    };
    Ok(result.into_value())
}

fn shift(wl: &Whitelist, op: Opcode, kind: NumKind, a: &Value, b: &Value) -> Result<Value, Fault> {
    let symbol = op_symbol(op);
    let left = num(wl, symbol, a)?;
    let left = match kind_rank(kind) {
        Some(rank) => left.to_rank(rank),
        None => left,
    };
    let distance = match num(wl, symbol, b)? {
        Num::Int(i) => i as i64,
        Num::Long(l) => l,
        Num::Double(_) => return Err(operand_error(wl, symbol, b)),
    };
    Ok(match left {
        Num::Int(x) => {
            let s = (distance & 31) as u32;
            Value::Int(match op {
                Opcode::Shl => x.wrapping_shl(s),
                Opcode::Shr => x >> s,
                _ => ((x as u32) >> s) as i32,
            })
        }
        Num::Long(x) => {
            let s = (distance & 63) as u32;
            Value::Long(match op {
                Opcode::Shl => x.wrapping_shl(s),
                Opcode::Shr => x >> s,
                _ => ((x as u64) >> s) as i64,
            })
        }
        Num::Double(_) => return Err(operand_error(wl, symbol, a)),
    })
}

/// `-x` and `~x`.
pub fn unary(wl: &Whitelist, op: Opcode, kind: NumKind, value: &Value) -> Result<Value, Fault> {
    let symbol = op_symbol(op);
    let x = num(wl, symbol, value)?;
    let x = match kind_rank(kind) {
        Some(rank) => x.to_rank(rank),
        None => x,
    };
    Ok(match (op, x) {
        (Opcode::Neg, Num::Int(i)) => Value::Int(i.wrapping_neg()),
        (Opcode::Neg, Num::Long(l)) => Value::Long(l.wrapping_neg()),
        (Opcode::Neg, Num::Double(d)) => Value::Double(-d),
        (Opcode::BitNot, Num::Int(i)) => Value::Int(!i),
        (Opcode::BitNot, Num::Long(l)) => Value::Long(!l),
        _ => return Err(operand_error(wl, symbol, value)),
    })
}

pub fn not(wl: &Whitelist, value: &Value) -> Result<bool, Fault> {
    value.as_bool().map(|b| !b).ok_or_else(|| operand_error(wl, "!", value))
}

/// Apply a comparison opcode.
pub fn compare(wl: &Whitelist, op: Opcode, kind: NumKind, a: &Value, b: &Value) -> Result<bool, Fault> {
    let symbol = op_symbol(op);
    match op {
        Opcode::RefEq => return Ok(a.ref_eq(b)),
        Opcode::RefNe => return Ok(!a.ref_eq(b)),
        Opcode::Eq | Opcode::Ne => {
            let equal = match kind {
                NumKind::Def | NumKind::Bool => value_equals(a, b),
                _ => {
                    let (x, y) = promote(wl, symbol, kind, a, b)?;
                    x == y
                }
            };
            return Ok(equal == (op == Opcode::Eq));
        }
        _ => {}
    }
    let (x, y) = promote(wl, symbol, kind, a, b)?;
    let ordering = match (x, y) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
        (Num::Long(x), Num::Long(y)) => Some(x.cmp(&y)),
        (Num::Double(x), Num::Double(y)) => x.partial_cmp(&y),
        _ => None,
    };
    // NaN compares false both ways
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        Opcode::Lt => ordering == Ordering::Less,
        Opcode::Le => ordering != Ordering::Greater,
        Opcode::Gt => ordering == Ordering::Greater,
        Opcode::Ge => ordering != Ordering::Less,
        _ => return Err(Fault::Internal(format!("not a comparison: {}", op.name()))),
    })
}

/// Primitive numeric conversion to `to`.
pub fn convert(wl: &Whitelist, to: NumKind, value: &Value) -> Result<Value, Fault> {
    let Some(rank) = kind_rank(to) else {
        return Ok(value.clone());
    };
    let x = num(wl, &format!("({})", to.name()), value)?;
    Ok(x.to_rank(rank).into_value())
}

/// Box class to primitive: null check, then conversion.
pub fn unbox(wl: &Whitelist, to: NumKind, value: &Value) -> Result<Value, Fault> {
    match (to, value) {
        (_, Value::Null) => Err(Fault::null_pointer(wl, "Cannot unbox a null value")),
        (NumKind::Bool, Value::Bool(_)) | (NumKind::Def, _) => Ok(value.clone()),
        (NumKind::Bool, other) => Err(Fault::class_cast(
            wl,
            format!("Cannot cast [{}] to [boolean]", other.type_name()),
        )),
        (kind, other) => convert(wl, kind, other),
    }
}

fn cast_error(wl: &Whitelist, value: &Value, ty: &ScriptType) -> Fault {
    Fault::class_cast(
        wl,
        format!("Cannot cast from [{}] to [{}].", value.type_name(), wl.type_name(ty)),
    )
}

/// Checked reference downcast; null passes.
pub fn check_cast(wl: &Whitelist, ty: &ScriptType, value: Value) -> Result<Value, Fault> {
    if value.is_null() || wl.is_instance(&value, ty) {
        Ok(value)
    } else {
        Err(cast_error(wl, &value, ty))
    }
}

/// Convert a `def` value to a static type. Implicit conversions only widen
/// numbers; explicit ones may narrow.
pub fn from_def(wl: &Whitelist, ty: &ScriptType, explicit: bool, value: Value) -> Result<Value, Fault> {
    match ty {
        ScriptType::Def | ScriptType::Void => Ok(value),
        ScriptType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            Value::Null => Err(Fault::null_pointer(wl, "Cannot cast null to a primitive type [boolean].")),
            other => Err(cast_error(wl, &other, ty)),
        },
        ScriptType::Int | ScriptType::Long | ScriptType::Double => {
            let target = match ty {
                ScriptType::Int => 0,
                ScriptType::Long => 1,
                _ => 2,
            };
            let x = match &value {
                Value::Int(i) => Num::Int(*i),
                Value::Long(l) => Num::Long(*l),
                Value::Double(d) => Num::Double(*d),
                Value::Null => {
                    return Err(Fault::null_pointer(
                        wl,
                        format!("Cannot cast null to a primitive type [{}].", wl.type_name(ty)),
                    ))
                }
                other => return Err(cast_error(wl, other, ty)),
            };
            if !explicit && x.rank() > target {
                return Err(cast_error(wl, &value, ty));
            }
            Ok(x.to_rank(target).into_value())
        }
        ScriptType::Class(_) | ScriptType::Array(_) => check_cast(wl, ty, value),
    }
}

/// Join the parts of a string concatenation.
pub fn concat(parts: &[Value]) -> Value {
    let mut out = String::new();
    for part in parts {
        use std::fmt::Write;
        let _ = write!(out, "{}", part);
    }
    Value::string(out)
}

/// `=~` (find) and `==~` (whole-input match).
pub fn regex_match(wl: &Whitelist, op: Opcode, input: &Value, pattern: &Value) -> Result<bool, Fault> {
    let Value::Pattern(regex) = pattern else {
        return Err(operand_error(wl, "=~", pattern));
    };
    let Value::Str(text) = input else {
        return Err(operand_error(wl, "=~", input));
    };
    Ok(match op {
        Opcode::RegexFind => regex.is_match(text),
        _ => regex
            .captures(text)
            .and_then(|c| c.get(0))
            .is_some_and(|m| m.start() == 0 && m.end() == text.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::standard;

    #[test]
    fn test_int_arithmetic_wraps() {
        let wl = standard();
        let r = binary(&wl, Opcode::Add, NumKind::Int, &Value::Int(i32::MAX), &Value::Int(1)).unwrap();
        assert_eq!(r, Value::Int(i32::MIN));
    }

    #[test]
    fn test_divide_by_zero_throws_arithmetic() {
        let wl = standard();
        let err = binary(&wl, Opcode::Div, NumKind::Int, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.class_name(), "ArithmeticException");
        let r = binary(&wl, Opcode::Div, NumKind::Double, &Value::Double(1.0), &Value::Double(0.0)).unwrap();
        assert_eq!(r, Value::Double(f64::INFINITY));
    }

    #[test]
    fn test_def_promotion() {
        let wl = standard();
        let r = binary(&wl, Opcode::Mul, NumKind::Def, &Value::Int(2), &Value::Double(1.5)).unwrap();
        assert_eq!(r, Value::Double(3.0));
        let r = binary(&wl, Opcode::Add, NumKind::Def, &Value::Int(1), &Value::string("x")).unwrap();
        assert_eq!(r, Value::string("1x"));
    }

    #[test]
    fn test_null_operand_is_null_pointer() {
        let wl = standard();
        let err = binary(&wl, Opcode::Add, NumKind::Def, &Value::Null, &Value::Int(1)).unwrap_err();
        assert_eq!(err.class_name(), "NullPointerException");
    }

    #[test]
    fn test_shifts_mask_distance() {
        let wl = standard();
        let r = binary(&wl, Opcode::Shl, NumKind::Int, &Value::Int(1), &Value::Int(33)).unwrap();
        assert_eq!(r, Value::Int(2));
        let r = binary(&wl, Opcode::Ushr, NumKind::Long, &Value::Long(-1), &Value::Int(60)).unwrap();
        assert_eq!(r, Value::Long(15));
    }

    #[test]
    fn test_compare_nan_and_def_equality() {
        let wl = standard();
        let nan = Value::Double(f64::NAN);
        assert!(!compare(&wl, Opcode::Lt, NumKind::Double, &nan, &nan).unwrap());
        assert!(!compare(&wl, Opcode::Ge, NumKind::Double, &nan, &nan).unwrap());
        assert!(compare(&wl, Opcode::Eq, NumKind::Def, &Value::Int(1), &Value::Long(1)).unwrap());
        assert!(compare(&wl, Opcode::Eq, NumKind::Def, &Value::Null, &Value::Null).unwrap());
    }

    #[test]
    fn test_from_def_widens_only_implicitly() {
        let wl = standard();
        assert_eq!(from_def(&wl, &ScriptType::Long, false, Value::Int(3)).unwrap(), Value::Long(3));
        assert!(from_def(&wl, &ScriptType::Int, false, Value::Long(3)).is_err());
        assert_eq!(from_def(&wl, &ScriptType::Int, true, Value::Double(3.9)).unwrap(), Value::Int(3));
        let err = from_def(&wl, &ScriptType::Int, false, Value::Null).unwrap_err();
        assert_eq!(err.class_name(), "NullPointerException");
    }

    #[test]
    fn test_regex_find_and_match() {
        let wl = standard();
        let pattern = Value::Pattern(std::sync::Arc::new(regex::Regex::new("a|ab").unwrap()));
        let input = Value::string("xab");
        assert!(regex_match(&wl, Opcode::RegexFind, &input, &pattern).unwrap());
        assert!(!regex_match(&wl, Opcode::RegexMatch, &input, &pattern).unwrap());
    }
}
