//! Integration tests for isolation between registries and between scopes.
//!
//! Registries are plain values: two of them never share scopes, and two scopes of the
//! same kind never share singletons.

use scoped_registry::{ScopeKind, ScopeRegistry, Singleton};
use std::sync::Arc;

struct Connection(String);
impl Singleton for Connection {}

#[test]
fn test_multiple_isolated_registries() {
    let frontend = ScopeRegistry::new();
    let backoffice = ScopeRegistry::new();

    let a = frontend.begin(ScopeKind::Application, "app").unwrap();
    let b = backoffice.begin(ScopeKind::Application, "app").unwrap();

    a.get_instance(|| Connection("postgresql://frontend".into())).unwrap();
    b.get_instance(|| Connection("postgresql://backoffice".into())).unwrap();

    let a_conn = a.get_if_instantiated::<Connection>().unwrap();
    let b_conn = b.get_if_instantiated::<Connection>().unwrap();
    assert_eq!(a_conn.0, "postgresql://frontend");
    assert_eq!(b_conn.0, "postgresql://backoffice");
}

#[test]
fn test_registry_does_not_leak_between_instances() {
    let one = ScopeRegistry::new();
    let two = ScopeRegistry::new();

    one.begin(ScopeKind::Session, "s1").unwrap();

    assert!(one.lookup(ScopeKind::Session, "s1").is_some());
    assert!(two.lookup(ScopeKind::Session, "s1").is_none());
    // the same identity is free in the other registry
    assert!(two.begin(ScopeKind::Session, "s1").is_ok());
}

#[test]
fn test_sessions_never_share_singletons() {
    let registry = ScopeRegistry::new();
    let alice = registry.begin(ScopeKind::Session, "alice").unwrap();
    let bob = registry.begin(ScopeKind::Session, "bob").unwrap();

    let a = alice.get_instance(|| Connection("alice".into())).unwrap();
    let b = bob.get_instance(|| Connection("bob".into())).unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    registry.end(ScopeKind::Session, "alice").unwrap();

    // ending one session leaves the other untouched
    assert!(bob.is_active());
    assert_eq!(bob.get_if_instantiated::<Connection>().unwrap().0, "bob");
}

#[test]
fn test_same_id_in_different_kinds() {
    let registry = ScopeRegistry::new();
    let session = registry.begin(ScopeKind::Session, "42").unwrap();
    let request = registry.begin(ScopeKind::Request, "42").unwrap();

    assert_ne!(session.id(), request.id());
    registry.end(ScopeKind::Request, "42").unwrap();
    assert!(registry.lookup(ScopeKind::Session, "42").is_some());
}
