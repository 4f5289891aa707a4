//! The "current scope" of one task.
//!
//! Each worker carries its own `ScopeContext` and passes it to the registry, so two
//! requests handled concurrently never see each other's current REQUEST scope. The
//! context is a plain value: it works the same on OS threads and on cooperative
//! executors.

use std::sync::Arc;

use crate::{Scope, ScopeKind};

#[derive(Debug, Default, Clone)]
pub struct ScopeContext {
    bound: [Option<Arc<Scope>>; 4],
}

fn slot(kind: ScopeKind) -> usize {
    match kind {
        ScopeKind::Global => 0,
        ScopeKind::Application => 1,
        ScopeKind::Session => 2,
        ScopeKind::Request => 3,
    }
}

impl ScopeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `scope` as current for its kind, returning the previous binding.
    pub fn set_current(&mut self, scope: Arc<Scope>) -> Option<Arc<Scope>> {
        self.bound[slot(scope.kind())].replace(scope)
    }

    /// The scope bound for `kind`, whatever its state.
    ///
    /// Prefer [`ScopeRegistry::current`](crate::ScopeRegistry::current), which skips
    /// scopes that have ended and falls back to the registry for GLOBAL and APPLICATION.
    pub fn bound(&self, kind: ScopeKind) -> Option<&Arc<Scope>> {
        self.bound[slot(kind)].as_ref()
    }

    pub fn clear(&mut self, kind: ScopeKind) -> Option<Arc<Scope>> {
        self.bound[slot(kind)].take()
    }

    pub fn clear_all(&mut self) {
        self.bound = Default::default();
    }
}
