use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{ScopeId, ScopeSettings};

/// Events emitted by the registry and its scopes.
///
/// These events are passed to the callback set via
/// [`ScopeRegistry::set_trace_callback`](crate::ScopeRegistry::set_trace_callback).
///
/// # Examples
///
/// ```rust
/// use scoped_registry::{ScopeEvent, ScopeId, ScopeKind};
///
/// let event = ScopeEvent::Begin { scope: ScopeId::new(ScopeKind::Request, "r1") };
/// assert_eq!(event.to_string(), "begin { scope: request:r1 }");
/// ```
#[derive(Debug, Clone)]
pub enum ScopeEvent {
    /// A scope became active.
    Begin { scope: ScopeId },

    /// A scope reached the destroyed state.
    End {
        scope: ScopeId,
        /// Number of hook failures collected while destroying it
        failures: usize,
    },

    /// A singleton was constructed and stored.
    SingletonCreated { scope: ScopeId, key: String },

    /// A singleton's hooks all completed.
    SingletonDestroyed { scope: ScopeId, key: String },

    /// A singleton's before-destroy or destroy hook failed.
    DestroyFailed { scope: ScopeId, key: String },

    /// The registry ended all remaining scopes.
    Shutdown {
        /// How many scopes were still alive
        remaining: usize,
    },
}

impl fmt::Display for ScopeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeEvent::Begin { scope } => write!(f, "begin {{ scope: {scope} }}"),
            ScopeEvent::End { scope, failures } => {
                write!(f, "end {{ scope: {scope}, failures: {failures} }}")
            }
            ScopeEvent::SingletonCreated { scope, key } => {
                write!(f, "created {{ scope: {scope}, key: {key} }}")
            }
            ScopeEvent::SingletonDestroyed { scope, key } => {
                write!(f, "destroyed {{ scope: {scope}, key: {key} }}")
            }
            ScopeEvent::DestroyFailed { scope, key } => {
                write!(f, "destroy failed {{ scope: {scope}, key: {key} }}")
            }
            ScopeEvent::Shutdown { remaining } => {
                write!(f, "shutdown {{ remaining: {remaining} }}")
            }
        }
    }
}

/// User-supplied tracing callback.
///
/// It must be thread-safe because scopes are shared across worker threads.
pub type TraceCallback = dyn Fn(&ScopeEvent) + Send + Sync + 'static;

/// Shared between a registry and every scope it creates: the optional trace callback
/// plus the settings that decide how lifecycle transitions are logged.
pub(crate) struct EventSink {
    callback: RwLock<Option<Arc<TraceCallback>>>,
    settings: ScopeSettings,
}

impl EventSink {
    pub(crate) fn new(settings: ScopeSettings) -> Self {
        Self {
            callback: RwLock::new(None),
            settings,
        }
    }

    pub(crate) fn settings(&self) -> &ScopeSettings {
        &self.settings
    }

    pub(crate) fn set_callback(&self, callback: Arc<TraceCallback>) {
        *self.callback.write() = Some(callback);
    }

    pub(crate) fn clear_callback(&self) {
        *self.callback.write() = None;
    }

    /// Logs the event and forwards it to the callback, if any.
    ///
    /// The callback is cloned out of the lock before it runs, so it may call back
    /// into the registry, including setting or clearing the callback itself.
    pub(crate) fn emit(&self, event: ScopeEvent) {
        self.log(&event);
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(&event);
        }
    }

    fn log(&self, event: &ScopeEvent) {
        match event {
            ScopeEvent::DestroyFailed { scope, key } => {
                tracing::warn!(scope = %scope, key = %key, "singleton destruction failed");
            }
            ScopeEvent::End { scope, failures } if *failures > 0 => {
                tracing::warn!(scope = %scope, failures, "scope destroyed with failures");
            }
            _ if self.settings.lifecycle_debugging => {
                tracing::info!(event = %event, "scope lifecycle");
            }
            _ => {
                tracing::debug!(event = %event, "scope lifecycle");
            }
        }
    }
}
