//! The default whitelist shipped with the engine.

use super::builder::WhitelistBuilder;
use super::entry::{native, NativeFn};
use super::Whitelist;
use crate::vm::fault::Fault;
use crate::vm::iter::SnapshotIterator;
use crate::vm::native::{Args, NativeContext};
use crate::vm::value::{value_equals, ExceptionObject, HostObject, ScriptMap, Value};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHasher;
use std::any::Any;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

static STANDARD: Lazy<Arc<Whitelist>> = Lazy::new(|| match standard_builder().build() {
    Ok(whitelist) => Arc::new(whitelist),
    Err(err) => {
        tracing::error!(%err, "standard whitelist failed to build");
        Arc::new(Whitelist::minimal())
    }
});

/// The shared standard whitelist.
pub fn standard() -> Arc<Whitelist> {
    STANDARD.clone()
}

/// A builder with every standard class declared, for hosts that extend the
/// standard whitelist with their own classes.
pub fn standard_builder() -> WhitelistBuilder {
    let mut builder = WhitelistBuilder::new();
    declare_object(&mut builder);
    declare_numbers(&mut builder);
    declare_string(&mut builder);
    declare_math(&mut builder);
    declare_functional(&mut builder);
    declare_collections(&mut builder);
    declare_regex(&mut builder);
    declare_exceptions(&mut builder);
    builder
}

impl Whitelist {
    /// A whitelist containing only `Object`.
    pub fn minimal() -> Whitelist {
        match WhitelistBuilder::new().build() {
            Ok(whitelist) => whitelist,
            Err(_) => Whitelist::from_parts(
                vec![super::ClassDef::new(super::ClassId(0), "Object".to_string())],
                [("Object".to_string(), super::ClassId(0))].into_iter().collect(),
                Vec::new(),
                Default::default(),
                Default::default(),
            ),
        }
    }
}

fn args<'c, 'a>(ctx: &'c dyn NativeContext, values: &'a [Value]) -> Args<'c, 'a> {
    Args::new(ctx, values)
}

fn throw(ctx: &dyn NativeContext, class: &str, message: impl Into<String>) -> Fault {
    Fault::exception(ctx.whitelist(), class, message)
}

// ============================================================================
// Object, numbers, String
// ============================================================================

fn declare_object(builder: &mut WhitelistBuilder) {
    builder
        .class("Object")
        .method("toString", &[], "String", native(|_, a| Ok(Value::string(a[0].to_string()))))
        .method(
            "equals",
            &["def"],
            "boolean",
            native(|ctx, a| Ok(Value::Bool(args(ctx, a).value(0)? == args(ctx, a).value(1)?))),
        )
        .method(
            "hashCode",
            &[],
            "int",
            native(|_, a| {
                let mut hasher = FxHasher::default();
                a[0].hash(&mut hasher);
                Ok(Value::Int(hasher.finish() as i32))
            }),
        );
}

/// Natural ordering of comparable values.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ if a.is_numeric() && b.is_numeric() => match (a.as_long(), b.as_long()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_double()?.partial_cmp(&b.as_double()?),
        },
        _ => None,
    }
}

fn compare_native() -> NativeFn {
    native(|ctx, a| {
        let args = args(ctx, a);
        let (x, y) = (args.value(0)?, args.value(1)?);
        match compare_values(&x, &y) {
            Some(ordering) => Ok(Value::Int(ordering as i32)),
            None => Err(throw(
                &*ctx,
                "ClassCastException",
                format!("Cannot compare {} with {}", x.type_name(), y.type_name()),
            )),
        }
    })
}

fn parse_number<T: std::str::FromStr>(ctx: &dyn NativeContext, text: &str) -> Result<T, Fault> {
    text.trim().parse::<T>().map_err(|_| {
        throw(
            ctx,
            "NumberFormatException",
            format!("For input string: \"{}\"", text),
        )
    })
}

fn declare_numbers(builder: &mut WhitelistBuilder) {
    builder
        .class("Comparable")
        .method("compareTo", &["def"], "int", compare_native());

    builder
        .class("Number")
        .method(
            "intValue",
            &[],
            "int",
            native(|ctx, a| {
                let value = args(ctx, a).value(0)?;
                Ok(Value::Int(match value {
                    Value::Long(l) => l as i32,
                    Value::Double(d) => d as i32,
                    _ => args(ctx, a).int(0)?,
                }))
            }),
        )
        .method("longValue", &[], "long", native(|ctx, a| {
            let value = args(ctx, a).value(0)?;
            Ok(Value::Long(match value {
                Value::Double(d) => d as i64,
                _ => args(ctx, a).long(0)?,
            }))
        }))
        .method("doubleValue", &[], "double", native(|ctx, a| Ok(Value::Double(args(ctx, a).double(0)?))));

    builder
        .class("Integer")
        .extends(&["Number", "Comparable"])
        .boxes("int")
        .static_method("parseInt", &["String"], "int", native(|ctx, a| {
            let text = args(ctx, a).str(0)?;
            Ok(Value::Int(parse_number(&*ctx, text)?))
        }))
        .static_method("valueOf", &["int"], "Integer", native(|ctx, a| Ok(Value::Int(args(ctx, a).int(0)?))))
        .constant("MAX_VALUE", "int", Value::Int(i32::MAX))
        .constant("MIN_VALUE", "int", Value::Int(i32::MIN));

    builder
        .class("Long")
        .extends(&["Number", "Comparable"])
        .boxes("long")
        .static_method("parseLong", &["String"], "long", native(|ctx, a| {
            let text = args(ctx, a).str(0)?;
            Ok(Value::Long(parse_number(&*ctx, text)?))
        }))
        .static_method("valueOf", &["long"], "Long", native(|ctx, a| Ok(Value::Long(args(ctx, a).long(0)?))))
        .constant("MAX_VALUE", "long", Value::Long(i64::MAX))
        .constant("MIN_VALUE", "long", Value::Long(i64::MIN));

    builder
        .class("Double")
        .extends(&["Number", "Comparable"])
        .boxes("double")
        .static_method("parseDouble", &["String"], "double", native(|ctx, a| {
            let text = args(ctx, a).str(0)?;
            Ok(Value::Double(parse_number(&*ctx, text)?))
        }))
        .static_method("valueOf", &["double"], "Double", native(|ctx, a| Ok(Value::Double(args(ctx, a).double(0)?))))
        .static_method("isNaN", &["double"], "boolean", native(|ctx, a| Ok(Value::Bool(args(ctx, a).double(0)?.is_nan()))))
        .constant("MAX_VALUE", "double", Value::Double(f64::MAX))
        .constant("MIN_VALUE", "double", Value::Double(f64::from_bits(1)))
        .constant("NaN", "double", Value::Double(f64::NAN))
        .constant("POSITIVE_INFINITY", "double", Value::Double(f64::INFINITY))
        .constant("NEGATIVE_INFINITY", "double", Value::Double(f64::NEG_INFINITY));

    builder
        .class("Boolean")
        .extends(&["Comparable"])
        .boxes("boolean")
        .static_method("parseBoolean", &["String"], "boolean", native(|ctx, a| {
            Ok(Value::Bool(args(ctx, a).str(0)?.eq_ignore_ascii_case("true")))
        }))
        .method("booleanValue", &[], "boolean", native(|ctx, a| Ok(Value::Bool(args(ctx, a).bool(0)?))));
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn char_index(s: &str, byte: usize) -> i32 {
    s[..byte].chars().count() as i32
}

fn substring(ctx: &dyn NativeContext, s: &str, begin: i32, end: Option<i32>) -> Result<Value, Fault> {
    let len = char_len(s) as i32;
    let end = end.unwrap_or(len);
    if begin < 0 || end > len || begin > end {
        return Err(throw(
            ctx,
            "IndexOutOfBoundsException",
            format!("begin {}, end {}, length {}", begin, end, len),
        ));
    }
    Ok(Value::string(
        s.chars()
            .skip(begin as usize)
            .take((end - begin) as usize)
            .collect::<String>(),
    ))
}

fn string_method(
    builder: &mut WhitelistBuilder,
    name: &str,
    params: &[&str],
    ret: &str,
    f: fn(&dyn NativeContext, &str, &Args<'_, '_>) -> Result<Value, Fault>,
) {
    builder.class("String").method(
        name,
        params,
        ret,
        native(move |ctx, a| {
            let args = args(ctx, a);
            let receiver = args.str(0)?;
            f(&*ctx, receiver, &args)
        }),
    );
}

fn declare_string(builder: &mut WhitelistBuilder) {
    builder.class("String").extends(&["Comparable"]);

    string_method(builder, "length", &[], "int", |_, s, _| Ok(Value::Int(char_len(s) as i32)));
    string_method(builder, "isEmpty", &[], "boolean", |_, s, _| Ok(Value::Bool(s.is_empty())));
    string_method(builder, "substring", &["int"], "String", |ctx, s, a| substring(ctx, s, a.int(1)?, None));
    string_method(builder, "substring", &["int", "int"], "String", |ctx, s, a| {
        substring(ctx, s, a.int(1)?, Some(a.int(2)?))
    });
    string_method(builder, "indexOf", &["String"], "int", |_, s, a| {
        let needle = a.str(1)?;
        Ok(Value::Int(s.find(needle).map(|b| char_index(s, b)).unwrap_or(-1)))
    });
    string_method(builder, "contains", &["String"], "boolean", |_, s, a| Ok(Value::Bool(s.contains(a.str(1)?))));
    string_method(builder, "startsWith", &["String"], "boolean", |_, s, a| {
        Ok(Value::Bool(s.starts_with(a.str(1)?)))
    });
    string_method(builder, "endsWith", &["String"], "boolean", |_, s, a| Ok(Value::Bool(s.ends_with(a.str(1)?))));
    string_method(builder, "toUpperCase", &[], "String", |_, s, _| Ok(Value::string(s.to_uppercase())));
    string_method(builder, "toLowerCase", &[], "String", |_, s, _| Ok(Value::string(s.to_lowercase())));
    string_method(builder, "trim", &[], "String", |_, s, _| Ok(Value::string(s.trim())));
    string_method(builder, "concat", &["String"], "String", |_, s, a| Ok(Value::string(format!("{}{}", s, a.str(1)?))));
    string_method(builder, "equalsIgnoreCase", &["String"], "boolean", |_, s, a| {
        Ok(Value::Bool(
            a.value(1)?.as_str().is_some_and(|other| other.to_lowercase() == s.to_lowercase()),
        ))
    });
    string_method(builder, "replace", &["String", "String"], "String", |_, s, a| {
        Ok(Value::string(s.replace(a.str(1)?, a.str(2)?)))
    });
    string_method(builder, "split", &["String"], "String[]", |ctx, s, a| {
        let regex = Regex::new(a.str(1)?).map_err(|e| throw(ctx, "IllegalArgumentException", e.to_string()))?;
        let mut parts: Vec<Value> = regex.split(s).map(Value::string).collect();
        while parts.len() > 1 && parts.last().and_then(Value::as_str) == Some("") {
            parts.pop();
        }
        let string = ctx.whitelist().core().string.map(crate::whitelist::ScriptType::Class);
        Ok(Value::array(string.unwrap_or(crate::whitelist::ScriptType::Def), parts))
    });

    builder
        .class("String")
        .static_method("valueOf", &["def"], "String", native(|ctx, a| Ok(Value::string(args(ctx, a).value(0)?.to_string()))))
        .static_method(
            "join",
            &["String", "def"],
            "String",
            native(|ctx, a| {
                let args = args(ctx, a);
                let separator = args.str(0)?;
                let items = args.value(1)?;
                let iterator = SnapshotIterator::over(&items).ok_or_else(|| {
                    throw(&*ctx, "ClassCastException", format!("Cannot join {}", items.type_name()))
                })?;
                let mut parts = Vec::new();
                while let Some(item) = iterator.next_value() {
                    parts.push(item.to_string());
                }
                Ok(Value::string(parts.join(separator)))
            }),
        );
}

// ============================================================================
// Math
// ============================================================================

fn math_binary(a: &Value, b: &Value, int: fn(i32, i32) -> i32, long: fn(i64, i64) -> i64, double: fn(f64, f64) -> f64) -> Option<Value> {
    Some(match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(int(*x, *y)),
        (Value::Double(_), _) | (_, Value::Double(_)) => Value::Double(double(a.as_double()?, b.as_double()?)),
        _ => Value::Long(long(a.as_long()?, b.as_long()?)),
    })
}

fn declare_math(builder: &mut WhitelistBuilder) {
    fn unary(f: fn(f64) -> f64) -> NativeFn {
        native(move |ctx, a| Ok(Value::Double(f(args(ctx, a).double(0)?))))
    }
    fn binary_numeric(int: fn(i32, i32) -> i32, long: fn(i64, i64) -> i64, double: fn(f64, f64) -> f64) -> NativeFn {
        native(move |ctx, a| {
            let args = args(ctx, a);
            let (x, y) = (args.value(0)?, args.value(1)?);
            math_binary(&x, &y, int, long, double).ok_or_else(|| {
                throw(&*ctx, "ClassCastException", format!("Cannot apply Math to {} and {}", x.type_name(), y.type_name()))
            })
        })
    }

    builder
        .class("Math")
        .static_method(
            "abs",
            &["def"],
            "def",
            native(|ctx, a| {
                Ok(match args(ctx, a).value(0)? {
                    Value::Int(i) => Value::Int(i.wrapping_abs()),
                    Value::Long(l) => Value::Long(l.wrapping_abs()),
                    _ => Value::Double(args(ctx, a).double(0)?.abs()),
                })
            }),
        )
        .static_method("max", &["def", "def"], "def", binary_numeric(i32::max, i64::max, f64::max))
        .static_method("min", &["def", "def"], "def", binary_numeric(i32::min, i64::min, f64::min))
        .static_method(
            "pow",
            &["double", "double"],
            "double",
            native(|ctx, a| {
                let args = args(ctx, a);
                Ok(Value::Double(args.double(0)?.powf(args.double(1)?)))
            }),
        )
        .static_method("sqrt", &["double"], "double", unary(f64::sqrt))
        .static_method("floor", &["double"], "double", unary(f64::floor))
        .static_method("ceil", &["double"], "double", unary(f64::ceil))
        .static_method(
            "round",
            &["double"],
            "long",
            native(|ctx, a| Ok(Value::Long((args(ctx, a).double(0)? + 0.5).floor() as i64))),
        )
        .constant("PI", "double", Value::Double(std::f64::consts::PI))
        .constant("E", "double", Value::Double(std::f64::consts::E));
}

// ============================================================================
// Functional interfaces
// ============================================================================

fn declare_functional(builder: &mut WhitelistBuilder) {
    builder.class("Supplier").functional("get", &[], "def");
    builder.class("Function").functional("apply", &["def"], "def");
    builder.class("BiFunction").functional("apply", &["def", "def"], "def");
    builder.class("Predicate").functional("test", &["def"], "boolean");
    builder.class("Consumer").functional("accept", &["def"], "void");
    builder.class("Comparator").functional("compare", &["def", "def"], "int");
}

// ============================================================================
// Collections
// ============================================================================

fn index_arg(ctx: &dyn NativeContext, index: i32, len: usize) -> Result<usize, Fault> {
    if index < 0 || index as usize >= len {
        return Err(Fault::index_out_of_bounds(ctx.whitelist(), index as i64, len));
    }
    Ok(index as usize)
}

fn items_of(ctx: &dyn NativeContext, value: &Value) -> Result<Vec<Value>, Fault> {
    let iterator = SnapshotIterator::over(value).ok_or_else(|| {
        throw(ctx, "ClassCastException", format!("Cannot iterate over {}", value.type_name()))
    })?;
    let mut items = Vec::new();
    while let Some(item) = iterator.next_value() {
        items.push(item);
    }
    Ok(items)
}

fn collection_size(ctx: &dyn NativeContext, value: &Value) -> Result<usize, Fault> {
    match value {
        Value::List(list) => Ok(list.read().len()),
        Value::Map(map) => Ok(map.read().len()),
        other => Ok(items_of(ctx, other)?.len()),
    }
}

/// Sort with a script comparator; `null` means natural order.
fn sort_values(ctx: &mut dyn NativeContext, items: &mut [Value], comparator: &Value) -> Result<(), Fault> {
    let mut failure = None;
    items.sort_by(|a, b| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        let result = if comparator.is_null() {
            compare_values(a, b).ok_or_else(|| {
                throw(&*ctx, "ClassCastException", format!("Cannot compare {} with {}", a.type_name(), b.type_name()))
            })
        } else {
            ctx.call_function(comparator, &[a.clone(), b.clone()])
                .map(|v| v.as_long().unwrap_or(0).cmp(&0))
        };
        result.unwrap_or_else(|fault| {
            failure = Some(fault);
            Ordering::Equal
        })
    });
    match failure {
        Some(fault) => Err(fault),
        None => Ok(()),
    }
}

fn declare_collections(builder: &mut WhitelistBuilder) {
    builder
        .class("Iterable")
        .method(
            "iterator",
            &[],
            "Iterator",
            native(|ctx, a| {
                let items = items_of(&*ctx, &a[0])?;
                Ok(Value::Object(Arc::new(SnapshotIterator::new(items))))
            }),
        )
        .method(
            "forEach",
            &["Consumer"],
            "void",
            native(|ctx, a| {
                let items = items_of(&*ctx, &a[0])?;
                let consumer = args(ctx, a).value(1)?;
                for item in items {
                    ctx.call_function(&consumer, &[item])?;
                }
                Ok(Value::Null)
            }),
        );

    fn iterator(ctx: &dyn NativeContext, value: &Value) -> Result<Arc<dyn HostObject>, Fault> {
        match value {
            Value::Object(object) if object.as_any().is::<SnapshotIterator>() => Ok(object.clone()),
            other => Err(throw(ctx, "ClassCastException", format!("Cannot cast {} to Iterator", other.type_name()))),
        }
    }
    builder
        .class("Iterator")
        .method(
            "hasNext",
            &[],
            "boolean",
            native(|ctx, a| {
                let object = iterator(&*ctx, &a[0])?;
                let has_next = object
                    .as_any()
                    .downcast_ref::<SnapshotIterator>()
                    .is_some_and(SnapshotIterator::has_next);
                Ok(Value::Bool(has_next))
            }),
        )
        .method(
            "next",
            &[],
            "def",
            native(|ctx, a| {
                let object = iterator(&*ctx, &a[0])?;
                object
                    .as_any()
                    .downcast_ref::<SnapshotIterator>()
                    .and_then(SnapshotIterator::next_value)
                    .ok_or_else(|| throw(&*ctx, "IllegalStateException", "iterator is exhausted"))
            }),
        );

    builder
        .class("Collection")
        .extends(&["Iterable"])
        .method("size", &[], "int", native(|ctx, a| Ok(Value::Int(collection_size(&*ctx, &a[0])? as i32))))
        .method("isEmpty", &[], "boolean", native(|ctx, a| Ok(Value::Bool(collection_size(&*ctx, &a[0])? == 0))))
        .method(
            "contains",
            &["def"],
            "boolean",
            native(|ctx, a| {
                let needle = args(ctx, a).value(1)?;
                Ok(Value::Bool(items_of(&*ctx, &a[0])?.iter().any(|item| value_equals(item, &needle))))
            }),
        )
        .method(
            "add",
            &["def"],
            "boolean",
            native(|ctx, a| {
                let list = args(ctx, a).list(0)?;
                list.write().push(args(ctx, a).value(1)?);
                Ok(Value::Bool(true))
            }),
        )
        .method(
            "clear",
            &[],
            "void",
            native(|ctx, a| {
                match &a[0] {
                    Value::Map(map) => map.write().clear(),
                    _ => args(ctx, a).list(0)?.write().clear(),
                }
                Ok(Value::Null)
            }),
        )
        .method(
            "removeIf",
            &["Predicate"],
            "boolean",
            native(|ctx, a| {
                let list = args(ctx, a).list(0)?.clone();
                let predicate = args(ctx, a).value(1)?;
                let items = list.read().clone();
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if ctx.call_function(&predicate, &[item.clone()])?.as_bool() != Some(true) {
                        kept.push(item);
                    }
                }
                let mut guard = list.write();
                let removed = guard.len() != kept.len();
                *guard = kept;
                Ok(Value::Bool(removed))
            }),
        );

    builder
        .class("List")
        .extends(&["Collection"])
        .method(
            "get",
            &["int"],
            "def",
            native(|ctx, a| {
                let args = args(ctx, a);
                let list = args.list(0)?.read();
                let index = index_arg(&*ctx, args.int(1)?, list.len())?;
                Ok(list[index].clone())
            }),
        )
        .method(
            "set",
            &["int", "def"],
            "def",
            native(|ctx, a| {
                let args = args(ctx, a);
                let mut list = args.list(0)?.write();
                let index = index_arg(&*ctx, args.int(1)?, list.len())?;
                Ok(std::mem::replace(&mut list[index], args.value(2)?))
            }),
        )
        .method(
            "add",
            &["int", "def"],
            "void",
            native(|ctx, a| {
                let args = args(ctx, a);
                let mut list = args.list(0)?.write();
                let len = list.len();
                let index = args.int(1)?;
                if index < 0 || index as usize > len {
                    return Err(Fault::index_out_of_bounds(ctx.whitelist(), index as i64, len));
                }
                list.insert(index as usize, args.value(2)?);
                Ok(Value::Null)
            }),
        )
        .method(
            "remove",
            &["int"],
            "def",
            native(|ctx, a| {
                let args = args(ctx, a);
                let mut list = args.list(0)?.write();
                let index = index_arg(&*ctx, args.int(1)?, list.len())?;
                Ok(list.remove(index))
            }),
        )
        .method(
            "indexOf",
            &["def"],
            "int",
            native(|ctx, a| {
                let args = args(ctx, a);
                let needle = args.value(1)?;
                let list = args.list(0)?.read();
                Ok(Value::Int(
                    list.iter()
                        .position(|item| value_equals(item, &needle))
                        .map(|i| i as i32)
                        .unwrap_or(-1),
                ))
            }),
        )
        .method(
            "addAll",
            &["Collection"],
            "boolean",
            native(|ctx, a| {
                let list = args(ctx, a).list(0)?.clone();
                let items = items_of(&*ctx, &args(ctx, a).value(1)?)?;
                let changed = !items.is_empty();
                list.write().extend(items);
                Ok(Value::Bool(changed))
            }),
        )
        .method(
            "sort",
            &["Comparator"],
            "void",
            native(|ctx, a| {
                let list = args(ctx, a).list(0)?.clone();
                let comparator = args(ctx, a).value(1)?;
                let mut items = list.read().clone();
                sort_values(ctx, &mut items, &comparator)?;
                *list.write() = items;
                Ok(Value::Null)
            }),
        );

    builder
        .class("ArrayList")
        .extends(&["List"])
        .constructor(&[], native(|_, _| Ok(Value::list(Vec::new()))))
        .constructor(&["Collection"], native(|ctx, a| Ok(Value::list(items_of(&*ctx, &a[0])?))));

    fn map_method(
        builder: &mut WhitelistBuilder,
        name: &str,
        params: &[&str],
        ret: &str,
        f: fn(&dyn NativeContext, &mut ScriptMap, &Args<'_, '_>) -> Result<Value, Fault>,
    ) {
        builder.class("Map").method(
            name,
            params,
            ret,
            native(move |ctx, a| {
                let args = args(ctx, a);
                let map = args.map(0)?;
                let mut guard = map.write();
                f(&*ctx, &mut guard, &args)
            }),
        );
    }

    builder.class("Map");
    map_method(builder, "get", &["def"], "def", |_, m, a| Ok(m.get(&a.value(1)?).cloned().unwrap_or_default()));
    map_method(builder, "put", &["def", "def"], "def", |_, m, a| {
        Ok(m.insert(a.value(1)?, a.value(2)?).unwrap_or_default())
    });
    map_method(builder, "getOrDefault", &["def", "def"], "def", |_, m, a| match m.get(&a.value(1)?) {
        Some(value) => Ok(value.clone()),
        None => a.value(2),
    });
    map_method(builder, "containsKey", &["def"], "boolean", |_, m, a| Ok(Value::Bool(m.contains_key(&a.value(1)?))));
    map_method(builder, "containsValue", &["def"], "boolean", |_, m, a| {
        let needle = a.value(1)?;
        Ok(Value::Bool(m.values().any(|v| value_equals(v, &needle))))
    });
    map_method(builder, "remove", &["def"], "def", |_, m, a| Ok(m.shift_remove(&a.value(1)?).unwrap_or_default()));
    map_method(builder, "size", &[], "int", |_, m, _| Ok(Value::Int(m.len() as i32)));
    map_method(builder, "isEmpty", &[], "boolean", |_, m, _| Ok(Value::Bool(m.is_empty())));
    map_method(builder, "clear", &[], "void", |_, m, _| {
        m.clear();
        Ok(Value::Null)
    });
    map_method(builder, "keySet", &[], "Collection", |_, m, _| Ok(Value::list(m.keys().cloned().collect())));
    map_method(builder, "values", &[], "Collection", |_, m, _| Ok(Value::list(m.values().cloned().collect())));

    builder
        .class("HashMap")
        .extends(&["Map"])
        .constructor(&[], native(|_, _| Ok(Value::map(ScriptMap::default()))));
}

// ============================================================================
// Regex
// ============================================================================

/// Stateful matcher over one input string.
#[derive(Debug)]
pub struct Matcher {
    regex: Arc<Regex>,
    input: String,
    state: Mutex<MatchState>,
}

#[derive(Debug, Default)]
struct MatchState {
    /// Byte offset where the next `find` starts
    position: usize,
    /// Byte ranges of the groups of the last successful match
    groups: Option<Vec<Option<(usize, usize)>>>,
}

impl Matcher {
    pub fn new(regex: Arc<Regex>, input: String) -> Self {
        Self {
            regex,
            input,
            state: Mutex::new(MatchState::default()),
        }
    }

    fn record(&self, captures: Option<regex::Captures<'_>>, state: &mut MatchState) -> bool {
        match captures {
            Some(captures) => {
                let groups: Vec<_> = captures.iter().map(|m| m.map(|m| (m.start(), m.end()))).collect();
                if let Some(Some((start, end))) = groups.first().copied() {
                    state.position = if end == start {
                        self.input[end..]
                            .chars()
                            .next()
                            .map(|c| end + c.len_utf8())
                            .unwrap_or(end + 1)
                    } else {
                        end
                    };
                }
                state.groups = Some(groups);
                true
            }
            None => {
                state.groups = None;
                false
            }
        }
    }

    pub fn find(&self) -> bool {
        let mut state = self.state.lock();
        if state.position > self.input.len() {
            state.groups = None;
            return false;
        }
        let captures = self.regex.captures_at(&self.input, state.position);
        self.record(captures, &mut state)
    }

    pub fn matches(&self) -> bool {
        let mut state = self.state.lock();
        let captures = self
            .regex
            .captures(&self.input)
            .filter(|c| c.get(0).is_some_and(|m| m.start() == 0 && m.end() == self.input.len()));
        self.record(captures, &mut state)
    }

    fn group_range(&self, group: usize) -> Result<Option<(usize, usize)>, &'static str> {
        let state = self.state.lock();
        let groups = state.groups.as_ref().ok_or("No match available")?;
        groups.get(group).copied().ok_or("No group with that index")
    }
}

impl HostObject for Matcher {
    fn class_name(&self) -> &str {
        "Matcher"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn with_matcher(
    f: fn(&dyn NativeContext, &Matcher, &Args<'_, '_>) -> Result<Value, Fault>,
) -> NativeFn {
    native(move |ctx, a| {
        let args = args(ctx, a);
        let matcher = match &a[0] {
            Value::Object(object) => object.as_any().downcast_ref::<Matcher>(),
            _ => None,
        };
        match matcher {
            Some(matcher) => f(&*ctx, matcher, &args),
            None => Err(throw(&*ctx, "ClassCastException", format!("Cannot cast {} to Matcher", a[0].type_name()))),
        }
    })
}

fn group_value(ctx: &dyn NativeContext, matcher: &Matcher, group: usize) -> Result<Value, Fault> {
    match matcher.group_range(group) {
        Ok(Some((start, end))) => Ok(Value::string(&matcher.input[start..end])),
        Ok(None) => Ok(Value::Null),
        Err(message) => Err(throw(ctx, "IllegalStateException", message)),
    }
}

fn declare_regex(builder: &mut WhitelistBuilder) {
    builder
        .class("Pattern")
        .static_method(
            "compile",
            &["String"],
            "Pattern",
            native(|ctx, a| {
                let source = args(ctx, a).str(0)?;
                Regex::new(source)
                    .map(|regex| Value::Pattern(Arc::new(regex)))
                    .map_err(|e| throw(&*ctx, "IllegalArgumentException", e.to_string()))
            }),
        )
        .method(
            "matcher",
            &["String"],
            "Matcher",
            native(|ctx, a| {
                let args = args(ctx, a);
                let regex = args.pattern(0)?.clone();
                let input = args.str(1)?.to_string();
                Ok(Value::Object(Arc::new(Matcher::new(regex, input))))
            }),
        )
        .method("pattern", &[], "String", native(|ctx, a| Ok(Value::string(args(ctx, a).pattern(0)?.as_str()))));

    builder
        .class("Matcher")
        .method("matches", &[], "boolean", with_matcher(|_, m, _| Ok(Value::Bool(m.matches()))))
        .method("find", &[], "boolean", with_matcher(|_, m, _| Ok(Value::Bool(m.find()))))
        .method("group", &[], "String", with_matcher(|ctx, m, _| group_value(ctx, m, 0)))
        .method(
            "group",
            &["int"],
            "String",
            with_matcher(|ctx, m, a| {
                let group = a.int(1)?;
                if group < 0 {
                    return Err(throw(ctx, "IndexOutOfBoundsException", format!("No group {}", group)));
                }
                group_value(ctx, m, group as usize)
            }),
        )
        .method(
            "start",
            &[],
            "int",
            with_matcher(|ctx, m, _| match m.group_range(0) {
                Ok(Some((start, _))) => Ok(Value::Int(char_index(&m.input, start))),
                _ => Err(throw(ctx, "IllegalStateException", "No match available")),
            }),
        )
        .method(
            "end",
            &[],
            "int",
            with_matcher(|ctx, m, _| match m.group_range(0) {
                Ok(Some((_, end))) => Ok(Value::Int(char_index(&m.input, end))),
                _ => Err(throw(ctx, "IllegalStateException", "No match available")),
            }),
        );
}

// ============================================================================
// Exceptions
// ============================================================================

fn exception_constructor(name: &'static str, with_message: bool) -> NativeFn {
    native(move |ctx, a| {
        let message = if with_message {
            match args(ctx, a).value(0)? {
                Value::Null => None,
                other => Some(other.to_string()),
            }
        } else {
            None
        };
        let whitelist = ctx.whitelist();
        let class = whitelist.exception_class(name);
        Ok(Value::Exception(Arc::new(ExceptionObject {
            class,
            class_name: whitelist.class(class).name.clone(),
            message,
            cause: None,
        })))
    })
}

fn declare_exceptions(builder: &mut WhitelistBuilder) {
    const HIERARCHY: &[(&str, &str)] = &[
        ("Exception", "Object"),
        ("RuntimeException", "Exception"),
        ("IllegalArgumentException", "RuntimeException"),
        ("NumberFormatException", "IllegalArgumentException"),
        ("IllegalStateException", "RuntimeException"),
        ("ArithmeticException", "RuntimeException"),
        ("NullPointerException", "RuntimeException"),
        ("ClassCastException", "RuntimeException"),
        ("IndexOutOfBoundsException", "RuntimeException"),
        ("UnsupportedOperationException", "RuntimeException"),
        ("NegativeArraySizeException", "RuntimeException"),
    ];

    for &(name, parent) in HIERARCHY {
        builder
            .class(name)
            .extends(&[parent])
            .constructor(&[], exception_constructor(name, false))
            .constructor(&["String"], exception_constructor(name, true));
    }

    builder.class("Exception").method(
        "getMessage",
        &[],
        "String",
        native(|ctx, a| match &a[0] {
            Value::Exception(e) => Ok(e.message.as_deref().map(Value::string).unwrap_or_default()),
            other => Err(throw(&*ctx, "ClassCastException", format!("Cannot cast {} to Exception", other.type_name()))),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::{Member, ScriptType};

    struct TestContext {
        whitelist: Arc<Whitelist>,
    }

    impl NativeContext for TestContext {
        fn whitelist(&self) -> &Whitelist {
            &self.whitelist
        }

        fn call_function(&mut self, _function: &Value, _args: &[Value]) -> Result<Value, Fault> {
            Err(Fault::Internal("no functions in this context".to_string()))
        }
    }

    fn call(class: &str, name: &str, is_static: bool, args: &[Value]) -> Result<Value, Fault> {
        let whitelist = standard();
        let class = whitelist.class_by_name(class).unwrap();
        let arity = if is_static { args.len() } else { args.len() - 1 };
        let id = whitelist.lookup_method(class, name, arity, is_static).unwrap();
        let target = match whitelist.member(id) {
            Member::Method(m) => m.target.clone(),
            other => panic!("not a method: {:?}", other),
        };
        let mut ctx = TestContext { whitelist };
        target(&mut ctx, args)
    }

    #[test]
    fn test_standard_builds() {
        let wl = standard_builder().build().unwrap();
        assert!(wl.class_by_name("String").is_some());
        assert!(wl.core().runtime_exception.is_some());
        let comparator = wl.class_by_name("Comparator").unwrap();
        assert!(wl.functional_method(comparator).is_some());
        assert_eq!(wl.box_class(&ScriptType::Int), wl.class_by_name("Integer"));
    }

    #[test]
    fn test_string_methods() {
        let s = Value::string("héllo world");
        assert_eq!(call("String", "length", false, &[s.clone()]).unwrap(), Value::Int(11));
        assert_eq!(
            call("String", "substring", false, &[s.clone(), Value::Int(1), Value::Int(5)]).unwrap(),
            Value::string("éllo")
        );
        assert_eq!(
            call("String", "indexOf", false, &[s.clone(), Value::string("w")]).unwrap(),
            Value::Int(6)
        );
        assert!(call("String", "substring", false, &[s, Value::Int(20)]).is_err());
    }

    #[test]
    fn test_split_drops_trailing_empties() {
        let parts = call("String", "split", false, &[Value::string("a,b,,"), Value::string(",")]).unwrap();
        assert_eq!(parts.to_string(), "[a, b]");
    }

    #[test]
    fn test_parse_int_failure_is_script_exception() {
        match call("Integer", "parseInt", true, &[Value::string("x1")]) {
            Err(Fault::Thrown(e)) => assert_eq!(e.class_name, "NumberFormatException"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_math_keeps_integer_types() {
        assert_eq!(call("Math", "max", true, &[Value::Int(3), Value::Int(7)]).unwrap(), Value::Int(7));
        assert_eq!(
            call("Math", "max", true, &[Value::Int(3), Value::Double(1.5)]).unwrap(),
            Value::Double(3.0)
        );
        assert_eq!(call("Math", "round", true, &[Value::Double(2.5)]).unwrap(), Value::Long(3));
    }

    #[test]
    fn test_list_natural_sort() {
        let list = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        call("List", "sort", false, &[list.clone(), Value::Null]).unwrap();
        assert_eq!(list.to_string(), "[1, 2, 3]");
    }

    #[test]
    fn test_map_methods() {
        let map = Value::map(ScriptMap::default());
        call("Map", "put", false, &[map.clone(), Value::string("a"), Value::Int(1)]).unwrap();
        assert_eq!(call("Map", "get", false, &[map.clone(), Value::string("a")]).unwrap(), Value::Int(1));
        assert_eq!(call("Map", "get", false, &[map.clone(), Value::string("b")]).unwrap(), Value::Null);
        assert_eq!(call("Map", "size", false, &[map]).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_matcher_find_loop() {
        let pattern = call("Pattern", "compile", true, &[Value::string("[0-9]+")]).unwrap();
        let matcher = call("Pattern", "matcher", false, &[pattern, Value::string("a1b22c333")]).unwrap();
        let mut found = Vec::new();
        while call("Matcher", "find", false, &[matcher.clone()]).unwrap() == Value::Bool(true) {
            found.push(call("Matcher", "group", false, &[matcher.clone()]).unwrap().to_string());
        }
        assert_eq!(found, vec!["1", "22", "333"]);
    }
}
