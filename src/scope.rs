//! A single lifetime container.
//!
//! A scope owns a [`ScopeStore`] and moves through
//! `Created -> Active -> DestructionPending -> Destroyed`, never backwards.
//!
//! # Locking
//!
//! - `lifecycle` is read-locked by every singleton construction and write-locked by
//!   [`end`](Scope::end), so ending a scope waits for constructions already in flight and
//!   no construction starts once destruction has begun.
//! - `store` is only held for lookups and inserts, never while user code runs.
//! - Each key has its own construction gate, so at most one factory per key runs at a
//!   time while factories for different keys proceed in parallel. Waiting on a gate
//!   that could never open fails with `CyclicConstruction` instead of blocking.
//! - Once `end` has started, only threads with a construction in flight may still
//!   resolve singletons, so those constructions can finish.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::destruction::DestructionCoordinator;
use crate::scope_event::{EventSink, ScopeEvent};
use crate::singleton_factory::GateTable;
use crate::{ScopeError, ScopeId, ScopeKind, ScopeState, ScopeStore};

type Attribute = Arc<dyn Any + Send + Sync>;

pub struct Scope {
    id: ScopeId,
    state: AtomicU8,
    created_at: DateTime<Utc>,
    pub(crate) lifecycle: RwLock<()>,
    pub(crate) store: RwLock<ScopeStore>,
    pub(crate) gates: Mutex<GateTable>,
    attributes: RwLock<HashMap<String, Attribute>>,
    events: Arc<EventSink>,
}

impl Scope {
    pub(crate) fn new(id: ScopeId, events: Arc<EventSink>) -> Self {
        Self {
            id,
            state: AtomicU8::new(ScopeState::Created as u8),
            created_at: Utc::now(),
            lifecycle: RwLock::new(()),
            store: RwLock::new(ScopeStore::new()),
            gates: Mutex::new(GateTable::default()),
            attributes: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// An active scope that no registry knows about.
    #[cfg(test)]
    pub(crate) fn detached(kind: ScopeKind, id: &str) -> Arc<Scope> {
        let events = Arc::new(EventSink::new(crate::ScopeSettings::default()));
        let scope = Arc::new(Scope::new(ScopeId::new(kind, id), events));
        scope.activate();
        scope
    }

    pub fn id(&self) -> &ScopeId {
        &self.id
    }

    pub fn kind(&self) -> ScopeKind {
        self.id.kind
    }

    pub fn instance_id(&self) -> &str {
        &self.id.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> ScopeState {
        ScopeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ScopeState::Active
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == ScopeState::Destroyed
    }

    pub(crate) fn events(&self) -> &EventSink {
        &self.events
    }

    pub(crate) fn ensure_active(&self) -> Result<(), ScopeError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ScopeError::ScopeInactive(self.id.clone()))
        }
    }

    fn transition(&self, from: ScopeState, to: ScopeState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Created -> Active`. Called by the registry while it holds the bucket lock for
    /// this scope's identity; the registry emits the `Begin` event once it let go.
    pub(crate) fn activate(&self) -> bool {
        self.transition(ScopeState::Created, ScopeState::Active)
    }

    /// Ends the scope: `Active -> DestructionPending`, destroys every singleton newest
    /// first, then `Destroyed`.
    ///
    /// Only the first call does anything; later calls, and calls on a scope that never
    /// became active, fail with [`ScopeError::UnknownScope`].
    ///
    /// Must not be called from inside one of this scope's own factories: the call waits
    /// for all in-flight constructions, including the caller's.
    ///
    /// # Errors
    ///
    /// [`ScopeError::Destruction`] if any hook failed. The scope is destroyed anyway.
    pub(crate) fn end(&self) -> Result<(), ScopeError> {
        if !self.transition(ScopeState::Active, ScopeState::DestructionPending) {
            return Err(ScopeError::UnknownScope(self.id.clone()));
        }

        let _lifecycle = self.lifecycle.write();
        let mut store = std::mem::take(&mut *self.store.write());
        self.gates.lock().clear();

        let outcome = DestructionCoordinator::new(self).destroy_all(&mut store);
        self.attributes.write().clear();
        self.state
            .store(ScopeState::Destroyed as u8, Ordering::Release);

        let failures = outcome.as_ref().err().map_or(0, |e| e.failures().len());
        self.events.emit(ScopeEvent::End {
            scope: self.id.clone(),
            failures,
        });

        outcome.map_err(ScopeError::from)
    }

    // -------------------------------------------------------------------------------------------------
    // Attributes
    // -------------------------------------------------------------------------------------------------

    /// Stores a named value on the scope, replacing any previous value of that name.
    pub fn set_attribute<T: Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        value: T,
    ) -> Result<(), ScopeError> {
        self.ensure_active()?;
        self.attributes.write().insert(name.into(), Arc::new(value));
        Ok(())
    }

    /// The attribute named `name`, if present and of type `T`.
    pub fn attribute<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let value = self.attributes.read().get(name).cloned()?;
        value.downcast::<T>().ok()
    }

    pub fn remove_attribute(&self, name: &str) -> bool {
        self.attributes.write().remove(name).is_some()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attributes.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
