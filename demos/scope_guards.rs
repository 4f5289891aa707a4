//! Scope guards, declared singletons, and failure reporting.
//!
//! Demonstrates:
//! - `begin_guarded()` ending a request scope when the guard goes out of scope
//! - `scoped_singleton!` accessors bound to the current scope of a kind
//! - Collected hook failures when a scope ends explicitly
//!
//! Run with: `cargo run --example scope_guards`

use scoped_registry::{scoped_singleton, BoxError, ScopeContext, ScopeError, ScopeKind, ScopeRegistry, Singleton};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
struct RequestTimer {
    ticks: AtomicU32,
}

impl Singleton for RequestTimer {
    fn destroy(&self) -> Result<(), BoxError> {
        println!("   request took {} ticks", self.ticks.load(Ordering::SeqCst));
        Ok(())
    }
}

scoped_singleton!(RequestTimer, Request);

struct TempFile(&'static str);

impl Singleton for TempFile {
    fn destroy(&self) -> Result<(), BoxError> {
        Err(format!("could not remove {}", self.0).into())
    }
}

fn main() {
    println!("=== scoped-registry: Scope Guards ===\n");

    let registry = ScopeRegistry::new();

    // -------------------------------------------------------------------------
    // 1. A guarded request
    // -------------------------------------------------------------------------
    println!("1. Guarded request scope...");
    {
        let guard = registry
            .begin_guarded(ScopeKind::Request, "req-1")
            .expect("fresh request id");
        let mut ctx = ScopeContext::new();
        ctx.set_current(guard.scope().clone());

        for _ in 0..3 {
            RequestTimer::instance(&registry, &ctx)
                .expect("request is active")
                .ticks
                .fetch_add(1, Ordering::SeqCst);
        }
        println!(
            "   timer created: {}",
            RequestTimer::is_instantiated(&registry, &ctx)
        );
        println!("   leaving the block...");
    }
    println!(
        "   req-1 still registered: {}",
        registry.lookup(ScopeKind::Request, "req-1").is_some()
    );

    // -------------------------------------------------------------------------
    // 2. Observing failures
    // -------------------------------------------------------------------------
    println!("\n2. Ending a scope whose singletons fail to clean up...");

    let guard = registry
        .begin_guarded(ScopeKind::Request, "req-2")
        .expect("fresh request id");
    guard
        .get_keyed_instance("upload", || TempFile("/tmp/upload-1"))
        .expect("request is active");
    guard
        .get_keyed_instance("thumbnail", || TempFile("/tmp/thumb-1"))
        .expect("request is active");

    match guard.end() {
        Ok(()) => println!("   clean teardown"),
        Err(ScopeError::Destruction(failures)) => {
            println!("   {} failure(s):", failures.failures().len());
            for failure in failures.failures() {
                println!("   - {failure}");
            }
        }
        Err(other) => println!("   unexpected: {other}"),
    }
}
