//! The contract every scoped singleton implements.
//!
//! All hooks have no-op defaults, so plain data types only need an empty
//! `impl Singleton for MyType {}`.

use crate::{BoxError, Scope};

/// A value stored at most once per key in a [`Scope`].
///
/// Instances are handed out as `Arc<Self>`, so every hook takes `&self`; types that
/// release resources in [`destroy`](Singleton::destroy) need interior mutability.
pub trait Singleton: Send + Sync + 'static {
    /// Called once, right after the instance was stored in `scope`.
    ///
    /// The instance is already visible to other callers when this runs. If the scope
    /// started ending while the factory ran, `scope` is already destruction-pending: the
    /// hook may still resolve peers, and the instance is destroyed with them.
    fn on_after_instantiation(&self, _scope: &Scope) {}

    /// Called for every singleton of a scope, newest first, before any of them is
    /// destroyed. Peers are still alive at this point.
    fn on_before_destroy(&self, _scope: &Scope) {}

    /// Releases whatever the singleton holds. Called exactly once when its scope ends.
    ///
    /// Errors and panics are caught, reported with the scope's other failures, and never
    /// stop the remaining singletons from being destroyed.
    fn destroy(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Default store key for `T`: its fully qualified type name.
pub fn key_of<T: ?Sized + 'static>() -> &'static str {
    std::any::type_name::<T>()
}
