//! Resolve-or-create of singletons inside a scope.
//!
//! Every accessor funnels into one double-checked sequence:
//!
//! 1. fast path: read-lock the store and return the instance if it exists;
//! 2. slow path: read-lock the scope lifecycle, take the key's construction gate,
//!    look again, then run the factory and insert the result.
//!
//! The factory runs at most once per key per scope. If it fails, nothing is stored and
//! the next caller runs a factory again.
//!
//! Which constructor form is used is chosen by the caller: [`Scope::get_instance`] takes
//! a plain factory, [`Scope::get_instance_with_scope`] hands the owning scope to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::scope_event::ScopeEvent;
use crate::singleton::key_of;
use crate::{BoxError, Scope, ScopeError, ScopeState, Singleton};

/// Serializes construction for one key.
#[derive(Default)]
pub(crate) struct ConstructionGate {
    turn: Mutex<()>,
}

/// Who is constructing what in one scope.
///
/// Every thread blocks on at most one gate, so following "owner of the key I wait for,
/// then the key that owner waits for" either ends or comes back to the caller. Coming
/// back means waiting would deadlock, whether the chain spans one thread or several.
#[derive(Default)]
pub(crate) struct GateTable {
    gates: HashMap<String, Arc<ConstructionGate>>,
    owners: HashMap<String, ThreadId>,
    waiting: HashMap<ThreadId, String>,
    building: HashMap<ThreadId, usize>,
}

impl GateTable {
    fn waits_on(&self, key: &str, me: ThreadId) -> bool {
        let mut owner = self.owners.get(key);
        for _ in 0..=self.waiting.len() {
            match owner {
                None => return false,
                Some(thread) if *thread == me => return true,
                Some(thread) => {
                    owner = self.waiting.get(thread).and_then(|k| self.owners.get(k));
                }
            }
        }
        false
    }

    pub(crate) fn clear(&mut self) {
        *self = GateTable::default();
    }
}

/// Marks the current thread as the builder of `key` until dropped.
struct Building<'a> {
    scope: &'a Scope,
    key: String,
    thread: ThreadId,
}

impl Drop for Building<'_> {
    fn drop(&mut self) {
        let mut table = self.scope.gates.lock();
        table.owners.remove(&self.key);
        if let Some(depth) = table.building.get_mut(&self.thread) {
            *depth -= 1;
            if *depth == 0 {
                table.building.remove(&self.thread);
            }
        }
    }
}

impl Scope {
    /// The `T` singleton of this scope, created with `factory` on first use.
    ///
    /// The key is `T`'s type name.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::ScopeInactive`] if the scope is not active; `factory` is not called
    /// - [`ScopeError::TypeMismatch`] if the key holds a different type
    /// - [`ScopeError::CyclicConstruction`] if `factory` asks for `T` again, directly or
    ///   through a singleton being built on another thread that is itself waiting for
    ///   one being built here
    ///
    /// While the scope is ending, a factory that was already running keeps resolving
    /// singletons of this scope; any other caller gets `ScopeInactive`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use scoped_registry::{ScopeKind, ScopeRegistry, Singleton};
    ///
    /// struct Config { name: String }
    /// impl Singleton for Config {}
    ///
    /// let registry = ScopeRegistry::new();
    /// let global = registry.begin(ScopeKind::Global, "global").unwrap();
    ///
    /// let config = global.get_instance(|| Config { name: "shop".into() }).unwrap();
    /// let again = global.get_instance(|| Config { name: "ignored".into() }).unwrap();
    /// assert_eq!(again.name, "shop");
    /// assert!(std::sync::Arc::ptr_eq(&config, &again));
    /// ```
    pub fn get_instance<T, F>(self: &Arc<Self>, factory: F) -> Result<Arc<T>, ScopeError>
    where
        T: Singleton,
        F: FnOnce() -> T,
    {
        self.resolve(key_of::<T>(), |_| Ok(factory()))
    }

    /// Like [`get_instance`](Scope::get_instance), but the factory receives the owning
    /// scope, e.g. to correlate request data with the singleton.
    ///
    /// A singleton that keeps the `Arc<Scope>` forms a cycle with the scope's store; the
    /// cycle is broken when the scope ends and its store is emptied.
    pub fn get_instance_with_scope<T, F>(self: &Arc<Self>, factory: F) -> Result<Arc<T>, ScopeError>
    where
        T: Singleton,
        F: FnOnce(&Arc<Scope>) -> T,
    {
        self.resolve(key_of::<T>(), |scope| Ok(factory(scope)))
    }

    /// Resolve-or-create under an explicit key, for several singletons of one type.
    pub fn get_keyed_instance<T, F>(self: &Arc<Self>, key: &str, factory: F) -> Result<Arc<T>, ScopeError>
    where
        T: Singleton,
        F: FnOnce() -> T,
    {
        self.resolve(key, |_| Ok(factory()))
    }

    /// Resolve-or-create with a fallible, scope-aware factory.
    ///
    /// # Errors
    ///
    /// A factory error is returned as [`ScopeError::Construction`] and leaves the key
    /// unregistered.
    pub fn try_get_instance<T, E, F>(self: &Arc<Self>, key: &str, factory: F) -> Result<Arc<T>, ScopeError>
    where
        T: Singleton,
        E: Into<BoxError>,
        F: FnOnce(&Arc<Scope>) -> Result<T, E>,
    {
        self.resolve(key, |scope| factory(scope).map_err(Into::into))
    }

    /// The `T` singleton if it was already created. Never constructs anything.
    pub fn get_if_instantiated<T: Singleton>(&self) -> Option<Arc<T>> {
        self.get_keyed_if_instantiated(key_of::<T>())
    }

    pub fn get_keyed_if_instantiated<T: Singleton>(&self, key: &str) -> Option<Arc<T>> {
        self.existing::<T>(key).ok().flatten()
    }

    pub fn is_instantiated<T: Singleton>(&self) -> bool {
        self.ensure_resolvable().is_ok() && self.store.read().contains(key_of::<T>())
    }

    /// Keys of the stored singletons in creation order.
    pub fn singleton_keys(&self) -> Vec<String> {
        self.store.read().keys().to_vec()
    }

    pub fn singleton_count(&self) -> usize {
        self.store.read().len()
    }

    /// Active scopes resolve for everyone. A destruction-pending scope only resolves for
    /// threads with a construction in flight.
    fn ensure_resolvable(&self) -> Result<(), ScopeError> {
        match self.state() {
            ScopeState::Active => Ok(()),
            ScopeState::DestructionPending
                if self.gates.lock().building.contains_key(&thread::current().id()) =>
            {
                Ok(())
            }
            _ => Err(ScopeError::ScopeInactive(self.id().clone())),
        }
    }

    fn existing<T: Singleton>(&self, key: &str) -> Result<Option<Arc<T>>, ScopeError> {
        self.ensure_resolvable()?;
        let store = self.store.read();
        match store.get(key) {
            None => Ok(None),
            Some(entry) => match entry.downcast::<T>() {
                Some(instance) => Ok(Some(instance)),
                None => Err(ScopeError::TypeMismatch {
                    scope: self.id().clone(),
                    key: key.to_string(),
                    expected: std::any::type_name::<T>(),
                }),
            },
        }
    }

    /// The gate for `key`, or `None` if blocking on it would never return.
    fn gate(&self, key: &str) -> Option<Arc<ConstructionGate>> {
        let me = thread::current().id();
        let mut table = self.gates.lock();
        if table.waits_on(key, me) {
            return None;
        }
        table.waiting.insert(me, key.to_string());
        Some(table.gates.entry(key.to_string()).or_default().clone())
    }

    fn start_building(&self, key: &str) -> Building<'_> {
        let me = thread::current().id();
        let mut table = self.gates.lock();
        table.waiting.remove(&me);
        table.owners.insert(key.to_string(), me);
        *table.building.entry(me).or_insert(0) += 1;
        Building {
            scope: self,
            key: key.to_string(),
            thread: me,
        }
    }

    fn resolve<T, F>(self: &Arc<Self>, key: &str, factory: F) -> Result<Arc<T>, ScopeError>
    where
        T: Singleton,
        F: FnOnce(&Arc<Scope>) -> Result<T, BoxError>,
    {
        if let Some(instance) = self.existing::<T>(key)? {
            return Ok(instance);
        }

        // recursive, so a factory may resolve other singletons of this scope even
        // while `end` is waiting for the write lock
        let _lifecycle = self.lifecycle.read_recursive();
        self.ensure_resolvable()?;

        let Some(gate) = self.gate(key) else {
            return Err(ScopeError::CyclicConstruction {
                scope: self.id().clone(),
                key: key.to_string(),
            });
        };
        let _turn = gate.turn.lock();
        let _building = self.start_building(key);

        if let Some(instance) = self.existing::<T>(key)? {
            return Ok(instance);
        }

        let instance = factory(self).map_err(|source| {
            tracing::debug!(scope = %self.id(), key, error = %source, "singleton construction failed");
            ScopeError::Construction {
                scope: self.id().clone(),
                key: key.to_string(),
                source,
            }
        })?;
        let instance = Arc::new(instance);
        self.store.write().insert(key, instance.clone());

        self.events().emit(ScopeEvent::SingletonCreated {
            scope: self.id().clone(),
            key: key.to_string(),
        });
        instance.on_after_instantiation(self);

        Ok(instance)
    }
}
