//! Per-scope singleton storage.
//!
//! The store maps a key to one type-erased instance and remembers the order in which
//! keys were inserted, so teardown can run newest first.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::Singleton;

/// One stored singleton, kept twice behind the same allocation: as `Any` for typed
/// lookups and as `dyn Singleton` for the lifecycle hooks.
pub struct StoreEntry {
    instance: Arc<dyn Any + Send + Sync>,
    hooks: Arc<dyn Singleton>,
    type_name: &'static str,
}

impl StoreEntry {
    pub fn new<T: Singleton>(instance: Arc<T>) -> Self {
        Self {
            instance: instance.clone(),
            hooks: instance,
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast<T: Singleton>(&self) -> Option<Arc<T>> {
        self.instance.clone().downcast::<T>().ok()
    }

    pub fn hooks(&self) -> &dyn Singleton {
        self.hooks.as_ref()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Key to instance map plus insertion order.
#[derive(Default)]
pub struct ScopeStore {
    entries: HashMap<String, StoreEntry>,
    order: Vec<String>,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `instance` under `key`. Returns `false` and leaves the store untouched if
    /// the key is already taken.
    pub fn insert<T: Singleton>(&mut self, key: impl Into<String>, instance: Arc<T>) -> bool {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.order.push(key.clone());
        self.entries.insert(key, StoreEntry::new(instance));
        true
    }

    pub fn get(&self, key: &str) -> Option<&StoreEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Empties the store, returning its entries newest first.
    pub fn drain_newest_first(&mut self) -> Vec<(String, StoreEntry)> {
        let mut drained = Vec::with_capacity(self.order.len());
        while let Some(key) = self.order.pop() {
            if let Some(entry) = self.entries.remove(&key) {
                drained.push((key, entry));
            }
        }
        debug_assert!(self.entries.is_empty());
        drained
    }
}
