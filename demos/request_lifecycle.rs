//! A web server's view of scoped singletons.
//!
//! Demonstrates:
//! - One global scope holding configuration for the whole process
//! - A session shared by two consecutive requests
//! - Request scopes torn down after each request, newest singleton first
//! - Lifecycle events through `tracing` and the trace callback
//!
//! Run with: `RUST_LOG=scoped_registry=debug cargo run --example request_lifecycle`

use parking_lot::Mutex;
use scoped_registry::{
    BoxError, Scope, ScopeContext, ScopeKind, ScopeRegistry, ScopeSettings, Singleton,
    GLOBAL_SCOPE_ID,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Config {
    greeting: String,
}
impl Singleton for Config {}

#[derive(Default)]
struct Cart {
    items: Mutex<Vec<String>>,
}
impl Singleton for Cart {}

struct DbConnection {
    request: String,
}

impl Singleton for DbConnection {
    fn on_after_instantiation(&self, scope: &Scope) {
        println!("   opened connection for {}", scope.id());
    }

    fn destroy(&self) -> Result<(), BoxError> {
        println!("   closed connection of {}", self.request);
        Ok(())
    }
}

struct AuditLog {
    db: Arc<DbConnection>,
}

impl Singleton for AuditLog {
    fn on_before_destroy(&self, _scope: &Scope) {
        // the connection is still open here
        println!("   flushing audit log through {}", self.db.request);
    }
}

fn handle_request(registry: &ScopeRegistry, session_id: &str, request_id: &str, item: &str) {
    let mut ctx = ScopeContext::new();
    ctx.set_current(registry.require(ScopeKind::Session, session_id).expect("session is open"));
    registry
        .begin_in(&mut ctx, ScopeKind::Request, request_id)
        .expect("fresh request id");

    let config = registry
        .singleton_if_instantiated::<Config>(&ctx, ScopeKind::Global)
        .expect("loaded at startup");
    println!("   {} ({request_id})", config.greeting);

    let request = registry.require_current(&ctx, ScopeKind::Request).expect("bound above");
    request
        .get_instance_with_scope(|scope| AuditLog {
            db: scope
                .get_instance(|| DbConnection {
                    request: request_id.to_string(),
                })
                .expect("request scope is active"),
        })
        .expect("request scope is active");

    let cart = registry
        .singleton(&ctx, ScopeKind::Session, Cart::default)
        .expect("session is open");
    cart.items.lock().push(item.to_string());

    registry
        .end(ScopeKind::Request, request_id)
        .expect("hooks succeed");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== scoped-registry: Request Lifecycle ===\n");

    let registry = ScopeRegistry::with_settings(ScopeSettings::new().lifecycle_debugging(true));
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    registry.set_trace_callback(move |event| events_clone.lock().push(event.to_string()));

    // -------------------------------------------------------------------------
    // 1. Process start
    // -------------------------------------------------------------------------
    println!("1. Starting the global scope...");

    let global = registry
        .begin(ScopeKind::Global, GLOBAL_SCOPE_ID)
        .expect("first global scope");
    global
        .get_instance(|| Config {
            greeting: "Hello from the shop".to_string(),
        })
        .expect("global scope is active");

    // -------------------------------------------------------------------------
    // 2. Two requests in the same session
    // -------------------------------------------------------------------------
    println!("\n2. Serving requests...");

    registry
        .begin(ScopeKind::Session, "alice")
        .expect("fresh session id");
    handle_request(&registry, "alice", "req-1", "book");
    handle_request(&registry, "alice", "req-2", "pen");

    let session = registry
        .lookup(ScopeKind::Session, "alice")
        .expect("session is open");
    let cart = session.get_if_instantiated::<Cart>().expect("filled by requests");
    println!("   cart of alice: {:?}", cart.items.lock());

    // -------------------------------------------------------------------------
    // 3. Process end
    // -------------------------------------------------------------------------
    println!("\n3. Shutting down...");

    if let Err(err) = registry.shutdown() {
        println!("   shutdown reported: {err}");
    }

    println!("\n4. Events seen by the trace callback:");
    for event in events.lock().iter() {
        println!("   {event}");
    }
}
