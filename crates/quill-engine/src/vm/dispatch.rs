//! Dynamic (`def`) dispatch.
//!
//! Every def call site of a loaded unit owns a [`CallSite`]: its decoded
//! reference plus a small polymorphic inline cache from receiver type to
//! resolved target. Once a site has seen more receiver types than the cache
//! holds it turns megamorphic and resolves every call without caching.

use crate::vm::fault::Fault;
use crate::vm::value::Value;
use crate::whitelist::{ClassId, DefReference, DefStrategy, LookupError, Member, MemberId, Whitelist};
use parking_lot::RwLock;

/// Cache key: the runtime type of a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverKey {
    Class(ClassId),
    Array,
    Function,
}

impl ReceiverKey {
    fn of(whitelist: &Whitelist, receiver: &Value) -> Option<ReceiverKey> {
        Some(match receiver {
            Value::Null => return None,
            Value::Array(_) => ReceiverKey::Array,
            Value::Function(_) => ReceiverKey::Function,
            other => ReceiverKey::Class(whitelist.runtime_class(other)?),
        })
    }
}

/// What a def call site resolved to for one receiver type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// A whitelisted method, field getter or setter; the receiver is the
    /// first argument
    Member(MemberId),
    /// Map shortcut: `m.key` reads or writes the entry `"key"`
    MapEntry,
    ArrayLength,
    /// Call the receiver function value itself
    Closure,
}

#[derive(Debug, Default)]
struct InlineCache {
    entries: Vec<(ReceiverKey, Resolved)>,
    megamorphic: bool,
}

/// One def call site.
#[derive(Debug)]
pub struct CallSite {
    pub reference: DefReference,
    cache: RwLock<InlineCache>,
}

impl CallSite {
    pub fn new(reference: DefReference) -> Self {
        Self {
            reference,
            cache: RwLock::new(InlineCache::default()),
        }
    }

    /// Resolve the target for `receiver`, consulting and filling the cache.
    pub fn resolve(&self, whitelist: &Whitelist, receiver: &Value, max_depth: usize) -> Result<Resolved, Fault> {
        let Some(key) = ReceiverKey::of(whitelist, receiver) else {
            return Err(Fault::null_pointer(
                whitelist,
                format!("Cannot invoke [{}] on a null value", self.reference.name),
            ));
        };

        {
            let cache = self.cache.read();
            if let Some((_, resolved)) = cache.entries.iter().find(|(k, _)| *k == key) {
                return Ok(*resolved);
            }
            if cache.megamorphic {
                return self.lookup(whitelist, key, receiver);
            }
        }

        let resolved = self.lookup(whitelist, key, receiver)?;
        let mut cache = self.cache.write();
        if cache.entries.iter().all(|(k, _)| *k != key) {
            if cache.entries.len() < max_depth {
                tracing::trace!(site = %self.reference, depth = cache.entries.len() + 1, "def cache miss");
                cache.entries.push((key, resolved));
            } else if !cache.megamorphic {
                tracing::debug!(site = %self.reference, max_depth, "def call site turned megamorphic");
                cache.megamorphic = true;
                cache.entries.clear();
            }
        }
        Ok(resolved)
    }

    /// Number of receiver types currently cached.
    pub fn cached(&self) -> usize {
        self.cache.read().entries.len()
    }

    pub fn is_megamorphic(&self) -> bool {
        self.cache.read().megamorphic
    }

    fn lookup(&self, whitelist: &Whitelist, key: ReceiverKey, receiver: &Value) -> Result<Resolved, Fault> {
        let reference = &self.reference;
        let name = reference.name.as_str();
        let arity = reference.arity as usize;
        let class = match key {
            ReceiverKey::Array if reference.strategy == DefStrategy::Load && name == "length" => {
                return Ok(Resolved::ArrayLength)
            }
            ReceiverKey::Function if reference.strategy == DefStrategy::Method => return Ok(Resolved::Closure),
            ReceiverKey::Class(class) => class,
            _ => whitelist.object(),
        };

        match reference.strategy {
            DefStrategy::Method => whitelist
                .lookup_method(class, name, arity, false)
                .map(Resolved::Member)
                .map_err(|e| dispatch_error(whitelist, e, receiver)),
            DefStrategy::Load | DefStrategy::Store => {
                if matches!(receiver, Value::Map(_)) {
                    return Ok(Resolved::MapEntry);
                }
                let store = reference.strategy == DefStrategy::Store;
                if let Ok(field) = whitelist.lookup_field(class, name, false) {
                    let writable = match whitelist.member(field) {
                        Member::Field(f) => !store || f.setter.is_some(),
                        _ => false,
                    };
                    if writable {
                        return Ok(Resolved::Member(field));
                    }
                }
                self.accessor(whitelist, class, store)
                    .map(Resolved::Member)
                    .map_err(|e| match e {
                        LookupError::AmbiguousOrUnknownMember { candidates: 0, .. } => Fault::illegal_argument(
                            whitelist,
                            format!(
                                "Cannot {} dynamic field [{}] for type [{}]",
                                if store { "store" } else { "load" },
                                name,
                                whitelist.class(class).name
                            ),
                        ),
                        ambiguous => dispatch_error(whitelist, ambiguous, receiver),
                    })
            }
        }
    }

    /// `getX()` / `isX()` for loads, `setX(v)` for stores.
    fn accessor(&self, whitelist: &Whitelist, class: ClassId, store: bool) -> Result<MemberId, LookupError> {
        let name = &self.reference.name;
        let mut chars = name.chars();
        let capitalized: String = chars
            .next()
            .map(|first| first.to_uppercase().chain(chars).collect())
            .unwrap_or_default();
        if store {
            return whitelist.lookup_method(class, &format!("set{}", capitalized), 1, false);
        }
        whitelist
            .lookup_method(class, &format!("get{}", capitalized), 0, false)
            .or_else(|_| whitelist.lookup_method(class, &format!("is{}", capitalized), 0, false))
    }
}

/// A missing member is an ordinary script exception; more than one
/// candidate at the receiver type is a sandbox fault.
fn dispatch_error(whitelist: &Whitelist, error: LookupError, receiver: &Value) -> Fault {
    let LookupError::AmbiguousOrUnknownMember { candidates, .. } = &error;
    let message = format!("dynamic {} (receiver [{}])", error, receiver.type_name());
    if *candidates == 0 {
        Fault::illegal_argument(whitelist, message)
    } else {
        Fault::Dispatch(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::standard;

    #[test]
    fn test_method_resolution_is_cached_per_receiver_type() {
        let wl = standard();
        let site = CallSite::new(DefReference::method("size", 0, Vec::new()));
        let list = Value::list(vec![Value::Int(1)]);
        let first = site.resolve(&wl, &list, 4).unwrap();
        assert!(matches!(first, Resolved::Member(_)));
        assert_eq!(site.resolve(&wl, &list, 4).unwrap(), first);
        assert_eq!(site.cached(), 1);
        site.resolve(&wl, &Value::map(Default::default()), 4).unwrap();
        assert_eq!(site.cached(), 2);
    }

    #[test]
    fn test_site_turns_megamorphic() {
        let wl = standard();
        let site = CallSite::new(DefReference::method("toString", 0, Vec::new()));
        site.resolve(&wl, &Value::Int(1), 1).unwrap();
        site.resolve(&wl, &Value::string("x"), 1).unwrap();
        assert!(site.is_megamorphic());
        assert_eq!(site.cached(), 0);
        assert!(site.resolve(&wl, &Value::Long(2), 1).is_ok());
    }

    #[test]
    fn test_null_receiver_is_null_pointer() {
        let wl = standard();
        let site = CallSite::new(DefReference::load("x"));
        let err = site.resolve(&wl, &Value::Null, 4).unwrap_err();
        assert_eq!(err.class_name(), "NullPointerException");
    }

    #[test]
    fn test_map_and_array_shortcuts() {
        let wl = standard();
        let load = CallSite::new(DefReference::load("length"));
        let array = Value::array(crate::whitelist::ScriptType::Int, vec![]);
        assert_eq!(load.resolve(&wl, &array, 4).unwrap(), Resolved::ArrayLength);
        let key = CallSite::new(DefReference::load("anything"));
        assert_eq!(key.resolve(&wl, &Value::map(Default::default()), 4).unwrap(), Resolved::MapEntry);
    }

    #[test]
    fn test_unknown_method_is_catchable() {
        let wl = standard();
        let site = CallSite::new(DefReference::method("nope", 3, Vec::new()));
        let err = site.resolve(&wl, &Value::Int(1), 4).unwrap_err();
        assert!(err.is_catchable());
        assert_eq!(err.class_name(), "IllegalArgumentException");
    }

    #[test]
    fn test_unknown_field_names_the_field() {
        let wl = standard();
        let site = CallSite::new(DefReference::load("nope"));
        let err = site.resolve(&wl, &Value::string("abc"), 4).unwrap_err();
        assert!(err.is_catchable());
        let message = err.to_string();
        assert!(message.contains("[nope]"), "{}", message);
        assert!(!message.contains("isNope"), "{}", message);
    }
}
