//! # Scoped Registry
//!
//! A thread-safe registry of scopes that bind singleton instances to a lifetime:
//! the whole process (global), an application, a user session, or a single request.
//!
//! Each scope stores at most one instance per key (by default the type name), creates it
//! on first use with a factory supplied at the call site, and destroys every instance
//! exactly once, newest first, when the scope ends.
//!
//! ## Quick Start
//!
//! ```rust
//! use scoped_registry::{ScopeContext, ScopeKind, ScopeRegistry, Singleton};
//! use std::sync::Arc;
//!
//! struct Cart { items: Vec<String> }
//! impl Singleton for Cart {}
//!
//! let registry = ScopeRegistry::new();
//! let mut ctx = ScopeContext::new();
//!
//! // a request arrives
//! let request = registry.begin_in(&mut ctx, ScopeKind::Request, "req-1").unwrap();
//! let cart: Arc<Cart> = request.get_instance(|| Cart { items: vec![] }).unwrap();
//! assert!(cart.items.is_empty());
//!
//! // the request is done: its singletons are destroyed
//! registry.end(ScopeKind::Request, "req-1").unwrap();
//! assert!(registry.current(&ctx, ScopeKind::Request).is_none());
//! ```
//!
//! ## Features
//!
//! - **At most one instance per key per scope**, even with many concurrent callers
//! - **Ordered teardown**: reverse creation order, with every hook failure collected
//!   instead of aborting the rest
//! - **Explicit context**: the current request or session scope is carried by a
//!   [`ScopeContext`] value, never by thread-local state
//! - **Tracing**: lifecycle logging through `tracing`, plus an optional event callback
//!
//! ## Main Types
//!
//! - [`ScopeRegistry`] - begins, ends, and looks up scopes
//! - [`Scope`] - a lifetime container and its singleton accessors
//! - [`Singleton`] - lifecycle hooks of stored instances
//! - [`ScopeContext`] - the current scopes of one task
//! - [`ScopeGuard`] - ends a scope when dropped
//! - [`ScopeError`] / [`MultiDestructionError`] - what can go wrong

mod macros;

mod destruction;
mod scope;
mod scope_context;
mod scope_error;
mod scope_event;
mod scope_guard;
mod scope_kind;
mod scope_registry;
mod scope_settings;
mod scope_store;
mod singleton;
mod singleton_factory;

pub use destruction::DestructionCoordinator;
pub use scope::Scope;
pub use scope_context::ScopeContext;
pub use scope_error::{
    BoxError, DestructionFailure, DestructionPhase, MultiDestructionError, ScopeError,
};
pub use scope_event::{ScopeEvent, TraceCallback};
pub use scope_guard::ScopeGuard;
pub use scope_kind::{ScopeId, ScopeKind, ScopeState, GLOBAL_SCOPE_ID};
pub use scope_registry::ScopeRegistry;
pub use scope_settings::ScopeSettings;
pub use scope_store::{ScopeStore, StoreEntry};
pub use singleton::{key_of, Singleton};
