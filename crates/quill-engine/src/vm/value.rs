//! Runtime values
//!
//! Every script value is a [`Value`]. Primitives and their boxes share one
//! representation (`Int` is both `int` and `Integer`), so boxing is free and
//! unboxing is a null check. Reference values are `Arc`-shared; mutable
//! containers sit behind `parking_lot` locks so loaded units stay `Send + Sync`.

use crate::vm::loader::LoadedUnit;
use crate::whitelist::{ClassId, ScriptType};
use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;
use rustc_hash::FxBuildHasher;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Insertion-ordered map used for script `Map` values.
pub type ScriptMap = IndexMap<Value, Value, FxBuildHasher>;

/// A value produced or consumed by a script.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(Arc<str>),
    Array(Arc<ArrayObject>),
    List(Arc<RwLock<Vec<Value>>>),
    Map(Arc<RwLock<ScriptMap>>),
    Pattern(Arc<Regex>),
    Function(Arc<Closure>),
    Exception(Arc<ExceptionObject>),
    Object(Arc<dyn HostObject>),
}

/// Fixed-length typed array.
#[derive(Debug)]
pub struct ArrayObject {
    pub element: ScriptType,
    pub items: RwLock<Vec<Value>>,
}

/// A script function value: a function of a loaded unit plus the values it
/// captured when it was created.
pub struct Closure {
    pub unit: Arc<LoadedUnit>,
    pub function: u16,
    pub captures: Vec<Value>,
}

impl Closure {
    /// Number of arguments the function takes beyond its captures.
    pub fn arity(&self) -> usize {
        self.unit
            .function(self.function)
            .map(|f| (f.param_count as usize).saturating_sub(self.captures.len()))
            .unwrap_or(0)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("function", &self.function)
            .field("captures", &self.captures.len())
            .finish()
    }
}

/// A thrown or constructed exception.
#[derive(Debug, Clone)]
pub struct ExceptionObject {
    pub class: ClassId,
    pub class_name: String,
    pub message: Option<String>,
    pub cause: Option<Arc<ExceptionObject>>,
}

impl fmt::Display for ExceptionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.class_name, message),
            None => f.write_str(&self.class_name),
        }
    }
}

/// Host-defined objects exposed to scripts through the whitelist.
pub trait HostObject: Send + Sync + fmt::Debug {
    /// Name of the whitelisted class this object is an instance of.
    fn class_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn map(entries: ScriptMap) -> Self {
        Value::Map(Arc::new(RwLock::new(entries)))
    }

    pub fn array(element: ScriptType, items: Vec<Value>) -> Self {
        Value::Array(Arc::new(ArrayObject {
            element,
            items: RwLock::new(items),
        }))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Long(_) | Value::Double(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integral value widened to `long`.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i as i64),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Any numeric value widened to `double`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Long(l) => Some(*l as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in runtime error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "Boolean".to_string(),
            Value::Int(_) => "Integer".to_string(),
            Value::Long(_) => "Long".to_string(),
            Value::Double(_) => "Double".to_string(),
            Value::Str(_) => "String".to_string(),
            Value::Array(array) => format!("{}[]", element_name(&array.element)),
            Value::List(_) => "ArrayList".to_string(),
            Value::Map(_) => "HashMap".to_string(),
            Value::Pattern(_) => "Pattern".to_string(),
            Value::Function(_) => "Function".to_string(),
            Value::Exception(e) => e.class_name.clone(),
            Value::Object(o) => o.class_name().to_string(),
        }
    }

    /// Identity comparison (`===`).
    pub fn ref_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Pattern(a), Value::Pattern(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (a, b) if a.is_numeric() || matches!(a, Value::Bool(_)) => a == b,
            _ => false,
        }
    }

    /// Convert to JSON for hosts and the CLI.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Long(l) => Json::from(*l),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .unwrap_or_else(|| Json::String(format_double(*d))),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Array(array) => Json::Array(array.items.read().iter().map(Value::to_json).collect()),
            Value::List(list) => Json::Array(list.read().iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.read()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            other => Json::String(other.to_string()),
        }
    }

    /// Build a value from JSON; objects become maps, arrays become lists.
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(i) => Value::Int(i),
                        Err(_) => Value::Long(i),
                    }
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::string(s),
            Json::Array(items) => Value::list(items.iter().map(Value::from_json).collect()),
            Json::Object(entries) => Value::map(
                entries
                    .iter()
                    .map(|(k, v)| (Value::string(k), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn element_name(ty: &ScriptType) -> String {
    match ty {
        ScriptType::Array(inner) => format!("{}[]", element_name(inner)),
        ScriptType::Class(_) => "Object".to_string(),
        other => other.primitive_name().unwrap_or("def").to_string(),
    }
}

/// `equals` semantics: same runtime type and equal contents. Doubles compare
/// by bit pattern so that values are usable as map keys.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b) || *a.read() == *b.read(),
            (Value::Pattern(a), Value::Pattern(b)) => a.as_str() == b.as_str(),
            _ => self.ref_eq(other),
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Long(l) => l.hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::List(list) => {
                for item in list.read().iter() {
                    item.hash(state);
                }
            }
            Value::Map(map) => map.read().len().hash(state),
            Value::Pattern(p) => p.as_str().hash(state),
            Value::Array(a) => (Arc::as_ptr(a) as usize).hash(state),
            Value::Function(c) => (Arc::as_ptr(c) as usize).hash(state),
            Value::Exception(e) => (Arc::as_ptr(e) as usize).hash(state),
            Value::Object(o) => (Arc::as_ptr(o) as *const () as usize).hash(state),
        }
    }
}

/// Format a double the way scripts print it: `1.0`, `1.5E10`, `NaN`.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let magnitude = d.abs();
    if (1e-3..1e7).contains(&magnitude) {
        let text = format!("{}", d);
        if text.contains('.') {
            text
        } else {
            format!("{}.0", text)
        }
    } else {
        let text = format!("{:E}", d);
        match text.split_once('E') {
            Some((mantissa, exponent)) if !mantissa.contains('.') => {
                format!("{}.0E{}", mantissa, exponent)
            }
            _ => text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Double(d) => f.write_str(&format_double(*d)),
            Value::Str(s) => f.write_str(s),
            Value::Array(array) => {
                let items = array.items.read();
                write_seq(f, items.iter())
            }
            Value::List(list) => {
                let items = list.read();
                write_seq(f, items.iter())
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Pattern(p) => f.write_str(p.as_str()),
            Value::Function(_) => f.write_str("<function>"),
            Value::Exception(e) => write!(f, "{}", e),
            Value::Object(o) => write!(f, "{:?}", o),
        }
    }
}

fn write_seq<'a>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = &'a Value>) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str("]")
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Function(c) => write!(f, "{:?}", c),
            other => write!(f, "{}", other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

/// `==` semantics: numeric operands compare by value after promotion,
/// everything else uses `equals`.
pub fn value_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Double(_), _) | (_, Value::Double(_)) if a.is_numeric() && b.is_numeric() => {
            a.as_double() == b.as_double()
        }
        (Value::Long(_), _) | (_, Value::Long(_)) if a.is_numeric() && b.is_numeric() => {
            a.as_long() == b.as_long()
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_double() {
        assert_eq!(format_double(1.0), "1.0");
        assert_eq!(format_double(2.5), "2.5");
        assert_eq!(format_double(-0.25), "-0.25");
        assert_eq!(format_double(1e10), "1.0E10");
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_equals_is_type_strict() {
        assert_ne!(Value::Int(1), Value::Long(1));
        assert!(value_equals(&Value::Int(1), &Value::Long(1)));
        assert!(value_equals(&Value::Int(2), &Value::Double(2.0)));
        assert!(!value_equals(&Value::Int(2), &Value::string("2")));
    }

    #[test]
    fn test_collection_display() {
        let list = Value::list(vec![Value::Int(1), Value::string("a")]);
        assert_eq!(list.to_string(), "[1, a]");
        let mut entries = ScriptMap::default();
        entries.insert(Value::string("k"), Value::Double(1.0));
        assert_eq!(Value::map(entries).to_string(), "{k=1.0}");
    }

    #[test]
    fn test_ref_eq_distinguishes_instances() {
        let a = Value::list(vec![]);
        let b = Value::list(vec![]);
        assert_eq!(a, b);
        assert!(!a.ref_eq(&b));
        assert!(a.ref_eq(&a.clone()));
    }

    #[test]
    fn test_json_round_trip_shape() {
        let json = serde_json::json!({"a": [1, 2.5, "x"], "b": null});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
    }
}
