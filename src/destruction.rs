//! Ordered, failure-isolated teardown of a scope's singletons.
//!
//! Teardown runs two passes over the store, newest singleton first:
//!
//! 1. every `on_before_destroy` hook, while all peers are still alive;
//! 2. every `destroy` hook.
//!
//! A hook that returns an error or panics is recorded and skipped; the remaining hooks
//! always run. The store is empty afterwards whatever happened, and nothing is retried.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::scope_event::ScopeEvent;
use crate::{
    BoxError, DestructionFailure, DestructionPhase, MultiDestructionError, Scope, ScopeStore,
};

pub struct DestructionCoordinator<'a> {
    scope: &'a Scope,
}

impl<'a> DestructionCoordinator<'a> {
    pub fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    /// Destroys every singleton in `store` and leaves it empty.
    ///
    /// # Errors
    ///
    /// Returns every hook failure, in the order they occurred.
    pub fn destroy_all(&self, store: &mut ScopeStore) -> Result<(), MultiDestructionError> {
        let entries = store.drain_newest_first();
        let mut errors = MultiDestructionError::default();
        let mut failed = vec![false; entries.len()];

        for (index, (key, entry)) in entries.iter().enumerate() {
            let outcome = guarded(|| {
                entry.hooks().on_before_destroy(self.scope);
                Ok(())
            });
            if let Err(source) = outcome {
                failed[index] = true;
                errors.push(self.failure(key, DestructionPhase::BeforeDestroy, source));
            }
        }

        for (index, (key, entry)) in entries.iter().enumerate() {
            if let Err(source) = guarded(|| entry.hooks().destroy()) {
                failed[index] = true;
                errors.push(self.failure(key, DestructionPhase::Destroy, source));
            }

            let scope = self.scope.id().clone();
            let key = key.clone();
            self.scope.events().emit(if failed[index] {
                ScopeEvent::DestroyFailed { scope, key }
            } else {
                ScopeEvent::SingletonDestroyed { scope, key }
            });
        }

        errors.into_result()
    }

    fn failure(&self, key: &str, phase: DestructionPhase, source: BoxError) -> DestructionFailure {
        tracing::warn!(
            scope = %self.scope.id(),
            key,
            %phase,
            error = %source,
            "singleton hook failed"
        );
        DestructionFailure {
            scope: self.scope.id().clone(),
            key: key.to_string(),
            phase,
            source,
        }
    }
}

/// Runs a hook, turning a panic into an error.
fn guarded(hook: impl FnOnce() -> Result<(), BoxError>) -> Result<(), BoxError> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(panic_message(payload).into()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("hook panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("hook panicked: {message}")
    } else {
        "hook panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScopeKind, Singleton};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_destroy: bool,
        panic_before: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log: log.clone(),
                fail_destroy: false,
                panic_before: false,
            }
        }
    }

    impl Singleton for Recorder {
        fn on_before_destroy(&self, _scope: &Scope) {
            self.log.lock().push(format!("before:{}", self.name));
            if self.panic_before {
                panic!("{} refused", self.name);
            }
        }

        fn destroy(&self) -> Result<(), BoxError> {
            self.log.lock().push(format!("destroy:{}", self.name));
            if self.fail_destroy {
                return Err(format!("{} is stuck", self.name).into());
            }
            Ok(())
        }
    }

    fn store_of(recorders: Vec<Recorder>) -> ScopeStore {
        let mut store = ScopeStore::new();
        for recorder in recorders {
            store.insert(recorder.name, Arc::new(recorder));
        }
        store
    }

    #[test]
    fn test_reverse_order_in_two_passes() {
        let scope = Scope::detached(ScopeKind::Request, "r1");
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut store = store_of(vec![
            Recorder::new("k1", &log),
            Recorder::new("k2", &log),
            Recorder::new("k3", &log),
        ]);

        DestructionCoordinator::new(&scope)
            .destroy_all(&mut store)
            .unwrap();

        assert_eq!(
            *log.lock(),
            [
                "before:k3",
                "before:k2",
                "before:k1",
                "destroy:k3",
                "destroy:k2",
                "destroy:k1"
            ]
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_failure_is_isolated_and_reported() {
        let scope = Scope::detached(ScopeKind::Request, "r1");
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut broken = Recorder::new("k2", &log);
        broken.fail_destroy = true;
        let mut store = store_of(vec![Recorder::new("k1", &log), broken, Recorder::new("k3", &log)]);

        let err = DestructionCoordinator::new(&scope)
            .destroy_all(&mut store)
            .unwrap_err();

        assert!(log.lock().contains(&"destroy:k1".to_string()));
        assert!(log.lock().contains(&"destroy:k3".to_string()));
        assert_eq!(err.failed_keys(), ["k2"]);
        assert_eq!(err.failures()[0].phase, DestructionPhase::Destroy);
        assert_eq!(err.failures()[0].source.to_string(), "k2 is stuck");
        assert!(store.is_empty());
    }

    #[test]
    fn test_panicking_hook_is_caught() {
        let scope = Scope::detached(ScopeKind::Session, "s1");
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut panicky = Recorder::new("k1", &log);
        panicky.panic_before = true;
        let mut store = store_of(vec![panicky, Recorder::new("k2", &log)]);

        let err = DestructionCoordinator::new(&scope)
            .destroy_all(&mut store)
            .unwrap_err();

        // destroy still runs for the singleton whose before-destroy hook panicked
        assert!(log.lock().contains(&"destroy:k1".to_string()));
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].phase, DestructionPhase::BeforeDestroy);
        assert_eq!(err.failures()[0].source.to_string(), "hook panicked: k1 refused");
    }

    #[test]
    fn test_empty_store_is_ok() {
        let scope = Scope::detached(ScopeKind::Global, "global");
        let mut store = ScopeStore::new();
        assert!(DestructionCoordinator::new(&scope)
            .destroy_all(&mut store)
            .is_ok());
    }
}
