//! Entities and cache entries.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EmissaryError, Result};

/// A structured record supplied by a caller.
///
/// Entities are plain JSON objects: a mapping of string keys to scalar or
/// nested values.
pub type Entity = Map<String, Value>;

/// Converts a JSON value into an [`Entity`], rejecting anything that is not an object.
///
/// # Example
///
/// ```
/// use emissary_core::entity_from_value;
/// use serde_json::json;
///
/// let entity = entity_from_value(json!({"name": "Simone", "age": 26})).unwrap();
/// assert_eq!(entity["age"], 26);
///
/// assert!(entity_from_value(json!([1, 2, 3])).is_err());
/// ```
pub fn entity_from_value(value: Value) -> Result<Entity> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(EmissaryError::InvalidEntity(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// An entry resident in the bounded cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Monotonically increasing key, starting at 1 and never reused.
    pub key: u64,
    /// The cached entity.
    pub value: Entity,
}

impl CacheEntry {
    /// Creates a new entry.
    pub fn new(key: u64, value: Entity) -> Self {
        Self { key, value }
    }
}

/// A cloneable handle to one entity while several transformations work on it.
///
/// Every clone points at the same record. Locks are held only for the
/// duration of the closure passed to [`with`](Self::with) or
/// [`with_mut`](Self::with_mut), so concurrent transformations touching
/// disjoint fields interleave safely.
#[derive(Debug, Clone, Default)]
pub struct SharedEntity {
    inner: Arc<Mutex<Entity>>,
}

impl SharedEntity {
    /// Wraps an entity.
    pub fn new(entity: Entity) -> Self {
        Self {
            inner: Arc::new(Mutex::new(entity)),
        }
    }

    /// Reads the entity under the lock.
    pub fn with<R>(&self, f: impl FnOnce(&Entity) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Mutates the entity in place under the lock.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Entity) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> Entity {
        self.inner.lock().clone()
    }

    /// Unwraps the entity, copying it if other handles are still alive.
    pub fn into_inner(self) -> Entity {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => shared.lock().clone(),
        }
    }
}

impl From<Entity> for SharedEntity {
    fn from(entity: Entity) -> Self {
        Self::new(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: Value) -> Entity {
        entity_from_value(value).unwrap()
    }

    #[test]
    fn test_entity_from_non_object_is_rejected() {
        let err = entity_from_value(json!("plain")).unwrap_err();
        assert!(err.to_string().contains("a string"));

        assert!(entity_from_value(Value::Null).is_err());
    }

    #[test]
    fn test_shared_entity_mutations_are_visible_to_all_handles() {
        let shared = SharedEntity::new(entity(json!({"name": "ada"})));
        let other = shared.clone();

        other.with_mut(|e| {
            e.insert("age".into(), json!(36));
        });

        assert_eq!(shared.with(|e| e["age"].clone()), json!(36));
        drop(other);
        assert_eq!(shared.into_inner(), entity(json!({"name": "ada", "age": 36})));
    }

    #[test]
    fn test_into_inner_with_live_handles_copies() {
        let shared = SharedEntity::new(entity(json!({"k": 1})));
        let keep = shared.clone();

        let copy = shared.into_inner();
        keep.with_mut(|e| {
            e.insert("k".into(), json!(2));
        });

        assert_eq!(copy["k"], 1);
        assert_eq!(keep.snapshot()["k"], 2);
    }

    #[test]
    fn test_cache_entry_serializes() {
        let entry = CacheEntry::new(1, entity(json!({"name": "x"})));
        let json = serde_json::to_string(&entry).unwrap();

        assert_eq!(json, r#"{"key":1,"value":{"name":"x"}}"#);
    }
}
