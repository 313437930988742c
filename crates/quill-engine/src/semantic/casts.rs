//! Cast legality and numeric promotion.

use crate::whitelist::{ScriptType, Whitelist};

/// A conversion applied to a value of one static type to use it as another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cast {
    /// Primitive numeric conversion (widening or explicit narrowing)
    Numeric { from: ScriptType, to: ScriptType },
    /// Primitive to its box class or a supertype of the box
    Box,
    /// Box class to primitive: null check, then numeric conversion
    Unbox { from: ScriptType, to: ScriptType },
    /// Reference to one of its supertypes
    Upcast,
    /// Reference to a subtype, checked at run time
    Checked(ScriptType),
    /// Anything to `def`
    ToDef,
    /// `def` to a static type, checked and converted at run time
    FromDef { to: ScriptType, explicit: bool },
}

impl Cast {
    /// Whether the cast changes nothing at run time.
    pub fn is_noop(&self) -> bool {
        matches!(self, Cast::Box | Cast::Upcast | Cast::ToDef)
    }
}

/// The minimal cast from `from` to `to`. `None` when the conversion is
/// illegal; `Some(None)` when no conversion is needed.
pub fn cast_for(wl: &Whitelist, from: &ScriptType, to: &ScriptType, explicit: bool) -> Option<Option<Cast>> {
    if from == to {
        return Some(None);
    }
    if from.is_void() || to.is_void() {
        return None;
    }
    if to.is_def() {
        return Some(Some(Cast::ToDef));
    }
    if from.is_def() {
        return Some(Some(Cast::FromDef {
            to: to.clone(),
            explicit,
        }));
    }

    match (from, to) {
        (a, b) if a.is_numeric() && b.is_numeric() => {
            (explicit || a.numeric_rank() < b.numeric_rank()).then(|| {
                Some(Cast::Numeric {
                    from: a.clone(),
                    to: b.clone(),
                })
            })
        }
        (a, ScriptType::Class(target)) if a.is_primitive() => {
            let boxed = wl.box_class(a)?;
            wl.is_subclass(boxed, *target).then_some(Some(Cast::Box))
        }
        (ScriptType::Class(source), b) if b.is_primitive() => {
            if let Some(inner) = wl.unboxed(*source) {
                let legal = inner == *b
                    || (inner.is_numeric()
                        && b.is_numeric()
                        && (explicit || inner.numeric_rank() < b.numeric_rank()));
                return legal.then(|| {
                    Some(Cast::Unbox {
                        from: inner,
                        to: b.clone(),
                    })
                });
            }
            let boxed = wl.box_class(b)?;
            (explicit && wl.is_subclass(boxed, *source)).then(|| {
                Some(Cast::FromDef {
                    to: b.clone(),
                    explicit: true,
                })
            })
        }
        (a, b) if a.is_reference() && b.is_reference() => {
            if wl.is_assignable(a, b) {
                Some(Some(Cast::Upcast))
            } else if explicit && wl.is_assignable(b, a) {
                Some(Some(Cast::Checked(b.clone())))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// The primitive behind a numeric type or numeric box.
pub fn unboxed_numeric(wl: &Whitelist, ty: &ScriptType) -> Option<ScriptType> {
    match ty {
        t if t.is_numeric() => Some(t.clone()),
        ScriptType::Class(id) => wl.unboxed(*id).filter(ScriptType::is_numeric),
        _ => None,
    }
}

fn unboxed_boolean(wl: &Whitelist, ty: &ScriptType) -> bool {
    match ty {
        ScriptType::Boolean => true,
        ScriptType::Class(id) => wl.unboxed(*id) == Some(ScriptType::Boolean),
        _ => false,
    }
}

fn wider(a: ScriptType, b: ScriptType) -> ScriptType {
    if a.numeric_rank() >= b.numeric_rank() {
        a
    } else {
        b
    }
}

/// Operation type of a unary numeric operator.
pub fn promote_unary(wl: &Whitelist, ty: &ScriptType) -> Option<ScriptType> {
    if ty.is_def() {
        return Some(ScriptType::Def);
    }
    unboxed_numeric(wl, ty)
}

/// Operation type of `*`, `/`, `%`, `-` and relational comparisons.
pub fn promote_numeric(wl: &Whitelist, a: &ScriptType, b: &ScriptType) -> Option<ScriptType> {
    if a.is_def() || b.is_def() {
        return Some(ScriptType::Def);
    }
    Some(wider(unboxed_numeric(wl, a)?, unboxed_numeric(wl, b)?))
}

pub fn is_string(wl: &Whitelist, ty: &ScriptType) -> bool {
    matches!(ty, ScriptType::Class(id) if Some(*id) == wl.core().string)
}

/// Operation type of `+`: string concatenation when either side is a String.
pub fn promote_add(wl: &Whitelist, a: &ScriptType, b: &ScriptType) -> Option<ScriptType> {
    if is_string(wl, a) && !b.is_void() {
        return Some(a.clone());
    }
    if is_string(wl, b) && !a.is_void() {
        return Some(b.clone());
    }
    promote_numeric(wl, a, b)
}

/// Operation type of `&`, `|`, `^`: integral or boolean.
pub fn promote_bitwise(wl: &Whitelist, a: &ScriptType, b: &ScriptType) -> Option<ScriptType> {
    if a.is_def() || b.is_def() {
        return Some(ScriptType::Def);
    }
    if unboxed_boolean(wl, a) && unboxed_boolean(wl, b) {
        return Some(ScriptType::Boolean);
    }
    let promoted = wider(unboxed_numeric(wl, a)?, unboxed_numeric(wl, b)?);
    promoted.is_integral().then_some(promoted)
}

/// Operation type of a shift: the promoted left operand.
pub fn promote_shift(wl: &Whitelist, left: &ScriptType) -> Option<ScriptType> {
    if left.is_def() {
        return Some(ScriptType::Def);
    }
    unboxed_numeric(wl, left).filter(ScriptType::is_integral)
}

/// Operand type of `==`/`!=`: a primitive type for value comparisons, `def`
/// for reference and dynamic comparisons.
pub fn promote_equality(a: &ScriptType, b: &ScriptType) -> ScriptType {
    if a.is_numeric() && b.is_numeric() {
        return wider(a.clone(), b.clone());
    }
    if *a == ScriptType::Boolean && *b == ScriptType::Boolean {
        return ScriptType::Boolean;
    }
    ScriptType::Def
}

/// Result type of `c ? a : b` and `a ?: b`. `a_null`/`b_null` mark branches
/// that are the `null` literal.
pub fn promote_conditional(
    wl: &Whitelist,
    a: &ScriptType,
    b: &ScriptType,
    a_null: bool,
    b_null: bool,
) -> ScriptType {
    if a_null && !b_null {
        return boxed_or_self(wl, b);
    }
    if b_null && !a_null {
        return boxed_or_self(wl, a);
    }
    if a == b {
        return a.clone();
    }
    if a.is_def() || b.is_def() {
        return ScriptType::Def;
    }
    if a.is_primitive() && b.is_primitive() {
        if let (Some(x), Some(y)) = (unboxed_numeric(wl, a), unboxed_numeric(wl, b)) {
            return wider(x, y);
        }
        return ScriptType::Def;
    }
    if let (Some(x), Some(y)) = (unboxed_numeric(wl, a), unboxed_numeric(wl, b)) {
        return wider(x, y);
    }
    let a = boxed_or_self(wl, a);
    let b = boxed_or_self(wl, b);
    if wl.is_assignable(&a, &b) {
        b
    } else if wl.is_assignable(&b, &a) {
        a
    } else {
        ScriptType::Class(wl.object())
    }
}

fn boxed_or_self(wl: &Whitelist, ty: &ScriptType) -> ScriptType {
    if ty.is_primitive() {
        wl.box_class(ty).map(ScriptType::Class).unwrap_or(ScriptType::Def)
    } else {
        ty.clone()
    }
}

/// The type a primitive turns into when it may be null (null-safe results).
pub fn nullable(wl: &Whitelist, ty: &ScriptType) -> ScriptType {
    boxed_or_self(wl, ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::standard;

    fn class(wl: &Whitelist, name: &str) -> ScriptType {
        ScriptType::Class(wl.class_by_name(name).unwrap())
    }

    #[test]
    fn test_numeric_widening_is_implicit() {
        let wl = standard();
        assert_eq!(
            cast_for(&wl, &ScriptType::Int, &ScriptType::Long, false),
            Some(Some(Cast::Numeric {
                from: ScriptType::Int,
                to: ScriptType::Long
            }))
        );
        assert_eq!(cast_for(&wl, &ScriptType::Double, &ScriptType::Int, false), None);
        assert!(cast_for(&wl, &ScriptType::Double, &ScriptType::Int, true).is_some());
    }

    #[test]
    fn test_equality_operand_type() {
        let wl = standard();
        assert_eq!(promote_equality(&ScriptType::Int, &ScriptType::Long), ScriptType::Long);
        assert_eq!(promote_equality(&ScriptType::Boolean, &ScriptType::Boolean), ScriptType::Boolean);
        assert_eq!(promote_equality(&class(&wl, "String"), &ScriptType::Int), ScriptType::Def);
    }

    #[test]
    fn test_boxing_and_unboxing() {
        let wl = standard();
        let integer = class(&wl, "Integer");
        let number = class(&wl, "Number");
        assert_eq!(cast_for(&wl, &ScriptType::Int, &integer, false), Some(Some(Cast::Box)));
        assert_eq!(cast_for(&wl, &ScriptType::Int, &number, false), Some(Some(Cast::Box)));
        assert_eq!(cast_for(&wl, &ScriptType::Int, &class(&wl, "String"), false), None);
        assert_eq!(
            cast_for(&wl, &integer, &ScriptType::Long, false),
            Some(Some(Cast::Unbox {
                from: ScriptType::Int,
                to: ScriptType::Long
            }))
        );
        assert_eq!(cast_for(&wl, &number, &ScriptType::Int, false), None);
        assert!(matches!(
            cast_for(&wl, &number, &ScriptType::Int, true),
            Some(Some(Cast::FromDef { explicit: true, .. }))
        ));
    }

    #[test]
    fn test_reference_casts() {
        let wl = standard();
        let list = class(&wl, "List");
        let array_list = class(&wl, "ArrayList");
        assert_eq!(cast_for(&wl, &array_list, &list, false), Some(Some(Cast::Upcast)));
        assert_eq!(cast_for(&wl, &list, &array_list, false), None);
        assert_eq!(
            cast_for(&wl, &list, &array_list, true),
            Some(Some(Cast::Checked(array_list.clone())))
        );
        assert_eq!(cast_for(&wl, &list, &class(&wl, "String"), true), None);
    }

    #[test]
    fn test_def_casts() {
        let wl = standard();
        assert_eq!(cast_for(&wl, &ScriptType::Int, &ScriptType::Def, false), Some(Some(Cast::ToDef)));
        assert_eq!(
            cast_for(&wl, &ScriptType::Def, &ScriptType::Int, false),
            Some(Some(Cast::FromDef {
                to: ScriptType::Int,
                explicit: false
            }))
        );
        assert_eq!(cast_for(&wl, &ScriptType::Void, &ScriptType::Def, false), None);
    }

    #[test]
    fn test_promotions() {
        let wl = standard();
        let string = class(&wl, "String");
        let integer = class(&wl, "Integer");
        assert_eq!(promote_numeric(&wl, &ScriptType::Int, &ScriptType::Long), Some(ScriptType::Long));
        assert_eq!(promote_numeric(&wl, &integer, &ScriptType::Double), Some(ScriptType::Double));
        assert_eq!(promote_numeric(&wl, &ScriptType::Int, &ScriptType::Def), Some(ScriptType::Def));
        assert_eq!(promote_add(&wl, &ScriptType::Int, &string), Some(string.clone()));
        assert_eq!(promote_numeric(&wl, &ScriptType::Int, &string), None);
        assert_eq!(
            promote_bitwise(&wl, &ScriptType::Boolean, &ScriptType::Boolean),
            Some(ScriptType::Boolean)
        );
        assert_eq!(promote_bitwise(&wl, &ScriptType::Double, &ScriptType::Int), None);
        assert_eq!(promote_shift(&wl, &ScriptType::Long), Some(ScriptType::Long));
    }

    #[test]
    fn test_conditional_promotion() {
        let wl = standard();
        let integer = class(&wl, "Integer");
        let list = class(&wl, "List");
        let array_list = class(&wl, "ArrayList");
        assert_eq!(
            promote_conditional(&wl, &ScriptType::Int, &ScriptType::Double, false, false),
            ScriptType::Double
        );
        assert_eq!(promote_conditional(&wl, &ScriptType::Def, &ScriptType::Int, true, false), integer);
        assert_eq!(promote_conditional(&wl, &list, &array_list, false, false), list);
    }
}
