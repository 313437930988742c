//! Script types

use std::fmt;

/// Index of a whitelisted class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// A static type as seen by the analyzer.
///
/// Primitive types are value types; `Class` covers every whitelisted
/// reference type (including the boxes `Integer`, `Long`, ...). `Def` is the
/// dynamic type whose members are resolved at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScriptType {
    Void,
    Boolean,
    Int,
    Long,
    Double,
    Def,
    Class(ClassId),
    Array(Box<ScriptType>),
}

impl ScriptType {
    pub fn array_of(element: ScriptType) -> Self {
        ScriptType::Array(Box::new(element))
    }

    /// Array type with `dims` dimensions around `self`.
    pub fn with_dims(self, dims: u8) -> Self {
        (0..dims).fold(self, |ty, _| ScriptType::array_of(ty))
    }

    pub fn element(&self) -> Option<&ScriptType> {
        match self {
            ScriptType::Array(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ScriptType::Boolean | ScriptType::Int | ScriptType::Long | ScriptType::Double
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ScriptType::Int | ScriptType::Long | ScriptType::Double)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, ScriptType::Int | ScriptType::Long)
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            ScriptType::Def | ScriptType::Class(_) | ScriptType::Array(_)
        )
    }

    pub fn is_def(&self) -> bool {
        matches!(self, ScriptType::Def)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ScriptType::Void)
    }

    pub fn class_id(&self) -> Option<ClassId> {
        match self {
            ScriptType::Class(id) => Some(*id),
            _ => None,
        }
    }

    /// Widening order of numeric primitives (int < long < double).
    pub fn numeric_rank(&self) -> Option<u8> {
        match self {
            ScriptType::Int => Some(0),
            ScriptType::Long => Some(1),
            ScriptType::Double => Some(2),
            _ => None,
        }
    }

    /// Keyword spelling of primitive types.
    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            ScriptType::Void => "void",
            ScriptType::Boolean => "boolean",
            ScriptType::Int => "int",
            ScriptType::Long => "long",
            ScriptType::Double => "double",
            ScriptType::Def => "def",
            _ => return None,
        })
    }

    pub fn from_primitive_name(name: &str) -> Option<ScriptType> {
        Some(match name {
            "void" => ScriptType::Void,
            "boolean" => ScriptType::Boolean,
            "int" => ScriptType::Int,
            "long" => ScriptType::Long,
            "double" => ScriptType::Double,
            "def" => ScriptType::Def,
            _ => return None,
        })
    }
}

/// Split `int[][]` into (`int`, 2).
pub fn split_array_suffix(name: &str) -> (&str, u8) {
    let mut base = name.trim();
    let mut dims = 0u8;
    while let Some(stripped) = base.strip_suffix("[]") {
        base = stripped.trim_end();
        dims = dims.saturating_add(1);
    }
    (base, dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_array_suffix() {
        assert_eq!(split_array_suffix("int"), ("int", 0));
        assert_eq!(split_array_suffix("String[][]"), ("String", 2));
    }

    #[test]
    fn test_with_dims() {
        let ty = ScriptType::Int.with_dims(2);
        assert_eq!(ty.element(), Some(&ScriptType::array_of(ScriptType::Int)));
        assert!(ty.is_reference());
        assert!(!ty.is_primitive());
    }

    #[test]
    fn test_numeric_rank_orders_widening() {
        assert!(ScriptType::Int.numeric_rank() < ScriptType::Long.numeric_rank());
        assert!(ScriptType::Long.numeric_rank() < ScriptType::Double.numeric_rank());
        assert_eq!(ScriptType::Boolean.numeric_rank(), None);
    }
}
