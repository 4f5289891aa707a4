//! The owner of every live scope.
//!
//! One `ScopeRegistry` is created at process start and shut down at process end. It
//! keeps a single slot for the GLOBAL and APPLICATION kinds and an id-keyed map for
//! SESSION and REQUEST scopes. The maps are sharded, so beginning or ending one
//! request only locks that request's bucket.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::scope_event::{EventSink, ScopeEvent, TraceCallback};
use crate::{
    MultiDestructionError, Scope, ScopeContext, ScopeError, ScopeGuard, ScopeId, ScopeKind,
    ScopeSettings, Singleton,
};

pub struct ScopeRegistry {
    global: Mutex<Option<Arc<Scope>>>,
    application: Mutex<Option<Arc<Scope>>>,
    sessions: DashMap<String, Arc<Scope>>,
    requests: DashMap<String, Arc<Scope>>,
    events: Arc<EventSink>,
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::with_settings(ScopeSettings::default())
    }

    pub fn with_settings(settings: ScopeSettings) -> Self {
        Self {
            global: Mutex::new(None),
            application: Mutex::new(None),
            sessions: DashMap::new(),
            requests: DashMap::new(),
            events: Arc::new(EventSink::new(settings)),
        }
    }

    pub fn settings(&self) -> &ScopeSettings {
        self.events.settings()
    }

    // -------------------------------------------------------------------------------------------------
    // Tracing
    // -------------------------------------------------------------------------------------------------

    /// Set a callback invoked for every lifecycle event of this registry's scopes.
    ///
    /// The callback runs outside the registry's locks and may use the registry, but it
    /// runs on the thread that caused the event, so it should be quick.
    pub fn set_trace_callback(&self, callback: impl Fn(&ScopeEvent) + Send + Sync + 'static) {
        let callback: Arc<TraceCallback> = Arc::new(callback);
        self.events.set_callback(callback);
    }

    pub fn clear_trace_callback(&self) {
        self.events.clear_callback();
    }

    // -------------------------------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------------------------------

    fn slot(&self, kind: ScopeKind) -> Option<&Mutex<Option<Arc<Scope>>>> {
        match kind {
            ScopeKind::Global => Some(&self.global),
            ScopeKind::Application => Some(&self.application),
            ScopeKind::Session | ScopeKind::Request => None,
        }
    }

    fn map(&self, kind: ScopeKind) -> &DashMap<String, Arc<Scope>> {
        match kind {
            ScopeKind::Request => &self.requests,
            _ => &self.sessions,
        }
    }

    /// Creates, activates and registers a scope.
    ///
    /// GLOBAL and APPLICATION have a single slot each: while one scope of that kind is
    /// alive, beginning another fails whatever its id.
    ///
    /// # Errors
    ///
    /// [`ScopeError::DuplicateScope`] if a scope with this identity is still alive,
    /// including one whose destruction is in progress.
    pub fn begin(&self, kind: ScopeKind, id: &str) -> Result<Arc<Scope>, ScopeError> {
        let scope = Arc::new(Scope::new(ScopeId::new(kind, id), self.events.clone()));

        if let Some(slot) = self.slot(kind) {
            let mut slot = slot.lock();
            if slot.as_ref().is_some_and(|s| !s.is_destroyed()) {
                return Err(ScopeError::DuplicateScope(scope.id().clone()));
            }
            scope.activate();
            *slot = Some(scope.clone());
        } else {
            match self.map(kind).entry(id.to_string()) {
                Entry::Occupied(mut entry) => {
                    if !entry.get().is_destroyed() {
                        return Err(ScopeError::DuplicateScope(scope.id().clone()));
                    }
                    scope.activate();
                    entry.insert(scope.clone());
                }
                Entry::Vacant(entry) => {
                    scope.activate();
                    entry.insert(scope.clone());
                }
            }
        }

        self.events.emit(ScopeEvent::Begin {
            scope: scope.id().clone(),
        });
        Ok(scope)
    }

    /// Begins a scope and binds it as current in `ctx`.
    pub fn begin_in(
        &self,
        ctx: &mut ScopeContext,
        kind: ScopeKind,
        id: &str,
    ) -> Result<Arc<Scope>, ScopeError> {
        let scope = self.begin(kind, id)?;
        ctx.set_current(scope.clone());
        Ok(scope)
    }

    /// Begins a scope that ends when the returned guard is dropped.
    pub fn begin_guarded(&self, kind: ScopeKind, id: &str) -> Result<ScopeGuard<'_>, ScopeError> {
        let scope = self.begin(kind, id)?;
        Ok(ScopeGuard::new(self, scope))
    }

    /// Ends the scope, destroys its singletons and forgets it.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::UnknownScope`] if no such scope is active, including when another
    ///   caller is already ending it
    /// - [`ScopeError::Destruction`] if singleton hooks failed; the scope is destroyed
    ///   and forgotten regardless
    pub fn end(&self, kind: ScopeKind, id: &str) -> Result<(), ScopeError> {
        let scope = self
            .registered(kind, id)
            .ok_or_else(|| ScopeError::UnknownScope(ScopeId::new(kind, id)))?;

        let outcome = scope.end();
        if matches!(outcome, Err(ScopeError::UnknownScope(_))) {
            return outcome;
        }
        self.forget(&scope);
        outcome
    }

    fn registered(&self, kind: ScopeKind, id: &str) -> Option<Arc<Scope>> {
        match self.slot(kind) {
            Some(slot) => slot
                .lock()
                .as_ref()
                .filter(|s| s.instance_id() == id)
                .cloned(),
            None => self.map(kind).get(id).map(|s| s.value().clone()),
        }
    }

    fn forget(&self, scope: &Arc<Scope>) {
        match self.slot(scope.kind()) {
            Some(slot) => {
                let mut slot = slot.lock();
                if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, scope)) {
                    *slot = None;
                }
            }
            None => {
                self.map(scope.kind())
                    .remove_if(scope.instance_id(), |_, s| Arc::ptr_eq(s, scope));
            }
        }
    }

    // -------------------------------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------------------------------

    /// The active scope with this identity, from any task.
    pub fn lookup(&self, kind: ScopeKind, id: &str) -> Option<Arc<Scope>> {
        self.registered(kind, id).filter(|s| s.is_active())
    }

    /// Like [`lookup`](ScopeRegistry::lookup), failing with [`ScopeError::UnknownScope`].
    pub fn require(&self, kind: ScopeKind, id: &str) -> Result<Arc<Scope>, ScopeError> {
        self.lookup(kind, id)
            .ok_or_else(|| ScopeError::UnknownScope(ScopeId::new(kind, id)))
    }

    /// The current scope of `kind` for the task owning `ctx`.
    ///
    /// A scope bound in `ctx` wins; for GLOBAL and APPLICATION the registry's slot is used
    /// when nothing is bound. Scopes that have ended resolve to `None`.
    pub fn current(&self, ctx: &ScopeContext, kind: ScopeKind) -> Option<Arc<Scope>> {
        if let Some(bound) = ctx.bound(kind) {
            return bound.is_active().then(|| bound.clone());
        }
        self.slot(kind)
            .and_then(|slot| slot.lock().clone())
            .filter(|s| s.is_active())
    }

    /// Like [`current`](ScopeRegistry::current), failing with [`ScopeError::UnknownScope`].
    pub fn require_current(
        &self,
        ctx: &ScopeContext,
        kind: ScopeKind,
    ) -> Result<Arc<Scope>, ScopeError> {
        self.current(ctx, kind).ok_or_else(|| {
            let id = ctx
                .bound(kind)
                .map_or_else(|| "<unbound>".to_string(), |s| s.instance_id().to_string());
            ScopeError::UnknownScope(ScopeId::new(kind, id))
        })
    }

    /// The `T` singleton of the current `kind` scope, created with `factory` on first use.
    pub fn singleton<T, F>(
        &self,
        ctx: &ScopeContext,
        kind: ScopeKind,
        factory: F,
    ) -> Result<Arc<T>, ScopeError>
    where
        T: Singleton,
        F: FnOnce() -> T,
    {
        self.require_current(ctx, kind)?.get_instance(factory)
    }

    pub fn singleton_if_instantiated<T: Singleton>(
        &self,
        ctx: &ScopeContext,
        kind: ScopeKind,
    ) -> Option<Arc<T>> {
        self.current(ctx, kind)?.get_if_instantiated::<T>()
    }

    /// Number of live scopes of `kind`, including ones being destroyed.
    pub fn active_scope_count(&self, kind: ScopeKind) -> usize {
        match self.slot(kind) {
            Some(slot) => usize::from(slot.lock().as_ref().is_some_and(|s| !s.is_destroyed())),
            None => self
                .map(kind)
                .iter()
                .filter(|s| !s.value().is_destroyed())
                .count(),
        }
    }

    /// Instance ids of the live scopes of `kind`, sorted.
    pub fn scope_ids(&self, kind: ScopeKind) -> Vec<String> {
        let mut ids: Vec<String> = match self.slot(kind) {
            Some(slot) => slot
                .lock()
                .iter()
                .filter(|s| !s.is_destroyed())
                .map(|s| s.instance_id().to_string())
                .collect(),
            None => self
                .map(kind)
                .iter()
                .filter(|s| !s.value().is_destroyed())
                .map(|s| s.key().clone())
                .collect(),
        };
        ids.sort();
        ids
    }

    // -------------------------------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------------------------------

    /// Ends every remaining scope, innermost kind first: requests, sessions, the
    /// application, then the global scope.
    ///
    /// # Errors
    ///
    /// Every hook failure of every scope, merged into one error.
    pub fn shutdown(&self) -> Result<(), MultiDestructionError> {
        let mut remaining = Vec::new();
        for kind in ScopeKind::ALL.into_iter().rev() {
            for id in self.scope_ids(kind) {
                remaining.push(ScopeId::new(kind, id));
            }
        }

        if self.settings().warn_on_leftover_scopes {
            for scope in &remaining {
                tracing::warn!(scope = %scope, "scope still alive at shutdown");
            }
        }
        self.events.emit(ScopeEvent::Shutdown {
            remaining: remaining.len(),
        });

        let mut errors = MultiDestructionError::default();
        for scope in remaining {
            match self.end(scope.kind, &scope.id) {
                Ok(()) => {}
                Err(ScopeError::Destruction(failures)) => errors.extend(failures),
                // ended by another thread in the meantime
                Err(ScopeError::UnknownScope(_)) => {}
                Err(other) => tracing::error!(scope = %scope, error = %other, "failed to end scope"),
            }
        }
        errors.into_result()
    }
}

impl Drop for ScopeRegistry {
    fn drop(&mut self) {
        let alive: usize = ScopeKind::ALL
            .into_iter()
            .map(|kind| self.active_scope_count(kind))
            .sum();
        if alive == 0 {
            return;
        }
        if let Err(err) = self.shutdown() {
            tracing::error!(error = %err, "singleton destruction failed while dropping the scope registry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tracked(Arc<AtomicUsize>);
    impl Singleton for Tracked {
        fn destroy(&self) -> Result<(), crate::BoxError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_begin_and_lookup() {
        let registry = ScopeRegistry::new();
        let scope = registry.begin(ScopeKind::Request, "r1").unwrap();

        assert!(scope.is_active());
        let found = registry.lookup(ScopeKind::Request, "r1").unwrap();
        assert!(Arc::ptr_eq(&scope, &found));
        assert!(registry.lookup(ScopeKind::Session, "r1").is_none());
    }

    #[test]
    fn test_duplicate_begin_fails() {
        let registry = ScopeRegistry::new();
        registry.begin(ScopeKind::Request, "r1").unwrap();

        let err = registry.begin(ScopeKind::Request, "r1").unwrap_err();
        assert!(matches!(err, ScopeError::DuplicateScope(ref id) if id.id == "r1"));
    }

    #[test]
    fn test_single_slot_kinds_allow_one_scope() {
        let registry = ScopeRegistry::new();
        registry.begin(ScopeKind::Application, "shop").unwrap();

        assert!(matches!(
            registry.begin(ScopeKind::Application, "admin"),
            Err(ScopeError::DuplicateScope(_))
        ));
        // the slot is bound to its id
        assert!(matches!(
            registry.end(ScopeKind::Application, "admin"),
            Err(ScopeError::UnknownScope(_))
        ));
        registry.end(ScopeKind::Application, "shop").unwrap();
        registry.begin(ScopeKind::Application, "admin").unwrap();
    }

    #[test]
    fn test_end_twice_reports_unknown() {
        let registry = ScopeRegistry::new();
        registry.begin(ScopeKind::Session, "s1").unwrap();

        registry.end(ScopeKind::Session, "s1").unwrap();
        assert!(matches!(
            registry.end(ScopeKind::Session, "s1"),
            Err(ScopeError::UnknownScope(_))
        ));
    }

    #[test]
    fn test_end_destroys_and_forgets() {
        let registry = ScopeRegistry::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        let scope = registry.begin(ScopeKind::Request, "req-42").unwrap();
        scope.get_instance(|| Tracked(destroyed.clone())).unwrap();

        registry.end(ScopeKind::Request, "req-42").unwrap();

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(scope.is_destroyed());
        assert!(registry.lookup(ScopeKind::Request, "req-42").is_none());
        assert_eq!(registry.active_scope_count(ScopeKind::Request), 0);
    }

    #[test]
    fn test_current_resolution() {
        let registry = ScopeRegistry::new();
        let mut ctx = ScopeContext::new();
        let global = registry.begin(ScopeKind::Global, "global").unwrap();
        let request = registry.begin_in(&mut ctx, ScopeKind::Request, "r1").unwrap();

        // global falls back to the registry slot, request comes from the context
        assert!(Arc::ptr_eq(&registry.current(&ctx, ScopeKind::Global).unwrap(), &global));
        assert!(Arc::ptr_eq(&registry.current(&ctx, ScopeKind::Request).unwrap(), &request));
        assert!(registry.current(&ctx, ScopeKind::Session).is_none());

        registry.end(ScopeKind::Request, "r1").unwrap();
        assert!(registry.current(&ctx, ScopeKind::Request).is_none());
        let err = registry.require_current(&ctx, ScopeKind::Request).unwrap_err();
        assert_eq!(err.to_string(), "scope request:r1 is not active or not registered");
    }

    #[test]
    fn test_require_unbound_current() {
        let registry = ScopeRegistry::new();
        let err = registry
            .require_current(&ScopeContext::new(), ScopeKind::Session)
            .unwrap_err();
        assert!(matches!(err, ScopeError::UnknownScope(ref id) if id.id == "<unbound>"));
    }

    #[test]
    fn test_scope_ids_and_counts() {
        let registry = ScopeRegistry::new();
        registry.begin(ScopeKind::Session, "b").unwrap();
        registry.begin(ScopeKind::Session, "a").unwrap();
        registry.begin(ScopeKind::Global, "global").unwrap();

        assert_eq!(registry.scope_ids(ScopeKind::Session), ["a", "b"]);
        assert_eq!(registry.scope_ids(ScopeKind::Global), ["global"]);
        assert_eq!(registry.active_scope_count(ScopeKind::Session), 2);
        assert_eq!(registry.active_scope_count(ScopeKind::Application), 0);
    }

    #[test]
    fn test_shutdown_ends_inner_kinds_first() {
        let registry = ScopeRegistry::new();
        let order = Arc::new(PlMutex::new(Vec::new()));
        let order_clone = order.clone();
        registry.set_trace_callback(move |event| {
            if let ScopeEvent::End { scope, .. } = event {
                order_clone.lock().push(scope.kind);
            }
        });

        registry.begin(ScopeKind::Global, "global").unwrap();
        registry.begin(ScopeKind::Application, "app").unwrap();
        registry.begin(ScopeKind::Session, "s1").unwrap();
        registry.begin(ScopeKind::Request, "r1").unwrap();

        registry.shutdown().unwrap();

        assert_eq!(
            *order.lock(),
            [
                ScopeKind::Request,
                ScopeKind::Session,
                ScopeKind::Application,
                ScopeKind::Global
            ]
        );
        for kind in ScopeKind::ALL {
            assert_eq!(registry.active_scope_count(kind), 0);
        }
    }

    #[test]
    fn test_drop_destroys_leftover_singletons() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        {
            let registry = ScopeRegistry::new();
            let session = registry.begin(ScopeKind::Session, "s1").unwrap();
            session.get_instance(|| Tracked(destroyed.clone())).unwrap();
        }
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }
}
