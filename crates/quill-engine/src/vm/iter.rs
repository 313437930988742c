//! Iteration over script collections.

use crate::vm::value::{HostObject, Value};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// Iterator over a snapshot of a collection's elements.
///
/// The snapshot is taken when iteration starts, so a loop body may modify
/// the collection it walks without invalidating the loop.
#[derive(Debug)]
pub struct SnapshotIterator {
    items: Vec<Value>,
    cursor: Mutex<usize>,
}

impl SnapshotIterator {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            cursor: Mutex::new(0),
        }
    }

    /// Start iterating `value`: arrays and lists yield their elements, maps
    /// their keys, and an iterator continues where it stands. `None` when the
    /// value is not iterable.
    pub fn over(value: &Value) -> Option<Arc<SnapshotIterator>> {
        let items = match value {
            Value::Array(array) => array.items.read().clone(),
            Value::List(list) => list.read().clone(),
            Value::Map(map) => map.read().keys().cloned().collect(),
            Value::Object(object) => {
                let iterator = object.as_any().downcast_ref::<SnapshotIterator>()?;
                iterator.remaining()
            }
            _ => return None,
        };
        Some(Arc::new(SnapshotIterator::new(items)))
    }

    pub fn has_next(&self) -> bool {
        *self.cursor.lock() < self.items.len()
    }

    pub fn next_value(&self) -> Option<Value> {
        let mut cursor = self.cursor.lock();
        let item = self.items.get(*cursor).cloned()?;
        *cursor += 1;
        Some(item)
    }

    fn remaining(&self) -> Vec<Value> {
        let cursor = *self.cursor.lock();
        self.items.get(cursor..).map(<[Value]>::to_vec).unwrap_or_default()
    }
}

impl HostObject for SnapshotIterator {
    fn class_name(&self) -> &str {
        "Iterator"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::value::ScriptMap;

    #[test]
    fn test_list_snapshot() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let iter = SnapshotIterator::over(&list).unwrap();
        if let Value::List(items) = &list {
            items.write().push(Value::Int(3));
        }
        assert_eq!(iter.next_value(), Some(Value::Int(1)));
        assert_eq!(iter.next_value(), Some(Value::Int(2)));
        assert!(!iter.has_next());
    }

    #[test]
    fn test_map_yields_keys_in_order() {
        let mut entries = ScriptMap::default();
        entries.insert(Value::string("b"), Value::Int(1));
        entries.insert(Value::string("a"), Value::Int(2));
        let iter = SnapshotIterator::over(&Value::map(entries)).unwrap();
        assert_eq!(iter.next_value(), Some(Value::string("b")));
        assert_eq!(iter.next_value(), Some(Value::string("a")));
    }

    #[test]
    fn test_scalars_are_not_iterable() {
        assert!(SnapshotIterator::over(&Value::Int(1)).is_none());
        assert!(SnapshotIterator::over(&Value::Null).is_none());
    }
}
