//! Macros for declaring scoped singleton types.

/// Generates current-scope accessors for a singleton type.
///
/// The type must implement [`Default`] (used as its factory) and
/// [`Singleton`](crate::Singleton). The macro adds three associated functions:
///
/// - `instance(registry, ctx)`: the singleton of the current scope of the given kind,
///   created with `Default::default` on first use
/// - `instance_if_instantiated(registry, ctx)`: the singleton if it already exists
/// - `is_instantiated(registry, ctx)`
///
/// # Examples
///
/// ```rust
/// use scoped_registry::{scoped_singleton, ScopeContext, ScopeKind, ScopeRegistry, Singleton};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct PageViews(AtomicUsize);
/// impl Singleton for PageViews {}
///
/// scoped_singleton!(PageViews, Session);
///
/// let registry = ScopeRegistry::new();
/// let mut ctx = ScopeContext::new();
/// registry.begin_in(&mut ctx, ScopeKind::Session, "s1").unwrap();
///
/// assert!(!PageViews::is_instantiated(&registry, &ctx));
/// PageViews::instance(&registry, &ctx).unwrap().0.fetch_add(1, Ordering::SeqCst);
/// PageViews::instance(&registry, &ctx).unwrap().0.fetch_add(1, Ordering::SeqCst);
///
/// let views = PageViews::instance_if_instantiated(&registry, &ctx).unwrap();
/// assert_eq!(views.0.load(Ordering::SeqCst), 2);
/// ```
#[macro_export]
macro_rules! scoped_singleton {
    ($ty:ty, $kind:ident) => {
        impl $ty {
            /// The singleton of the current scope, created on first use.
            pub fn instance(
                registry: &$crate::ScopeRegistry,
                ctx: &$crate::ScopeContext,
            ) -> ::std::result::Result<::std::sync::Arc<Self>, $crate::ScopeError> {
                registry.singleton::<Self, _>(
                    ctx,
                    $crate::ScopeKind::$kind,
                    <Self as ::std::default::Default>::default,
                )
            }

            /// The singleton of the current scope, if it was already created.
            pub fn instance_if_instantiated(
                registry: &$crate::ScopeRegistry,
                ctx: &$crate::ScopeContext,
            ) -> ::std::option::Option<::std::sync::Arc<Self>> {
                registry.singleton_if_instantiated::<Self>(ctx, $crate::ScopeKind::$kind)
            }

            pub fn is_instantiated(registry: &$crate::ScopeRegistry, ctx: &$crate::ScopeContext) -> bool {
                Self::instance_if_instantiated(registry, ctx).is_some()
            }
        }
    };
}
