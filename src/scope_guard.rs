use std::ops::Deref;
use std::sync::Arc;

use crate::{Scope, ScopeError, ScopeRegistry};

/// Ends its scope when dropped.
///
/// Created by [`ScopeRegistry::begin_guarded`]. Dropping the guard ends the scope and
/// logs any failure; call [`end`](ScopeGuard::end) to observe the result instead.
///
/// ```rust
/// use scoped_registry::{ScopeKind, ScopeRegistry};
///
/// let registry = ScopeRegistry::new();
/// {
///     let request = registry.begin_guarded(ScopeKind::Request, "r1").unwrap();
///     assert!(request.is_active());
/// }
/// assert!(registry.lookup(ScopeKind::Request, "r1").is_none());
/// ```
#[must_use = "dropping the guard ends the scope immediately"]
pub struct ScopeGuard<'r> {
    registry: &'r ScopeRegistry,
    scope: Arc<Scope>,
    ended: bool,
}

impl<'r> ScopeGuard<'r> {
    pub(crate) fn new(registry: &'r ScopeRegistry, scope: Arc<Scope>) -> Self {
        Self {
            registry,
            scope,
            ended: false,
        }
    }

    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// Ends the scope now and returns the outcome.
    pub fn end(mut self) -> Result<(), ScopeError> {
        self.ended = true;
        self.registry
            .end(self.scope.kind(), self.scope.instance_id())
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = Arc<Scope>;

    fn deref(&self) -> &Self::Target {
        &self.scope
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        match self.registry.end(self.scope.kind(), self.scope.instance_id()) {
            Ok(()) => {}
            // someone ended it explicitly through the registry
            Err(ScopeError::UnknownScope(_)) => {}
            Err(err) => {
                tracing::warn!(scope = %self.scope.id(), error = %err, "failed to end guarded scope");
            }
        }
    }
}
