//! Typed key-value bag carried by each request context.
//!
//! Middleware use the bag to hand data to later steps (for example an
//! authenticated user). Values are stored type-erased and read back with a
//! typed accessor; a lookup with the wrong type behaves like a missing key.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    marker::PhantomData,
};

/// A named slot with a fixed value type.
///
/// ```
/// use wirehttp::values::{Key, Values};
///
/// const USER_ID: Key<u64> = Key::new("user_id");
///
/// let mut values = Values::default();
/// values.set(&USER_ID, 42);
/// assert_eq!(values.get_key(&USER_ID), Some(&42));
/// ```
pub struct Key<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Key<T> {
    /// Declare a key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Name the value is stored under.
    #[must_use]
    pub const fn name(&self) -> &'static str { self.name }
}

/// Request-scoped values keyed by string.
#[derive(Default)]
pub struct Values {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Values {
    /// Store `value` under `key`, replacing any previous value.
    pub fn insert<T>(&mut self, key: &str, value: T)
    where
        T: Send + Sync + 'static,
    {
        if let Some(slot) = self.entries.get_mut(key) {
            *slot = Box::new(value);
        } else {
            self.entries.insert(key.to_owned(), Box::new(value));
        }
    }

    /// Borrow the value under `key` if it exists and has type `T`.
    #[must_use]
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Mutably borrow the value under `key` if it exists and has type `T`.
    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.entries
            .get_mut(key)
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Store a value under a typed key.
    pub fn set<T>(&mut self, key: &Key<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.insert(key.name, value);
    }

    /// Read a value through a typed key.
    #[must_use]
    pub fn get_key<T: 'static>(&self, key: &Key<T>) -> Option<&T> { self.get(key.name) }

    /// Remove the value under `key`, returning whether one was present.
    pub fn remove(&mut self, key: &str) -> bool { self.entries.remove(key).is_some() }

    /// Whether any value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool { self.entries.contains_key(key) }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Drop every value while keeping the allocated table.
    pub fn clear(&mut self) { self.entries.clear(); }
}

impl fmt::Debug for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Key, Values};

    #[derive(Debug, PartialEq)]
    struct Session {
        user: &'static str,
        admin: bool,
    }

    const SESSION: Key<Session> = Key::new("session");

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn insert_and_get_multiple_types() {
        let mut values = Values::default();
        values.insert("count", 12u32);
        values.insert("label", "hello".to_string());
        values.set(
            &SESSION,
            Session {
                user: "alice",
                admin: true,
            },
        );

        assert_eq!(values.get::<u32>("count"), Some(&12));
        assert_eq!(values.get::<String>("label").map(String::as_str), Some("hello"));
        assert_eq!(
            values.get_key(&SESSION),
            Some(&Session {
                user: "alice",
                admin: true,
            })
        );
    }

    #[test]
    fn wrong_type_reads_as_missing() {
        let mut values = Values::default();
        values.insert("count", 12u32);
        assert!(values.get::<i64>("count").is_none());
        assert!(values.contains("count"));
    }

    #[test]
    fn insert_overwrites_existing_value() {
        let mut values = Values::default();
        values.insert("n", 10u32);
        values.insert("n", "now a string");
        assert_eq!(values.get::<&str>("n"), Some(&"now a string"));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut values = Values::default();
        values.insert("hits", 1u32);
        if let Some(hits) = values.get_mut::<u32>("hits") {
            *hits += 1;
        }
        assert_eq!(values.get::<u32>("hits"), Some(&2));
    }

    #[test]
    fn clear_removes_all_keys() {
        let mut values = Values::default();
        values.insert("a", 1u8);
        values.insert("b", 2u8);
        values.clear();
        assert!(values.is_empty());
        assert!(!values.contains("a"));
        assert!(!values.remove("b"));
    }

    #[test]
    fn values_are_send_and_sync() { assert_send_sync::<Values>(); }
}
