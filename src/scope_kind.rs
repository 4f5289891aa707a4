//! Scope kinds, lifecycle states and scope identities.

use std::fmt;

use serde::Deserialize;

/// Instance id used for the single GLOBAL scope.
pub const GLOBAL_SCOPE_ID: &str = "global";

/// The lifetime a scope is bound to.
///
/// Kinds are ordered from the longest-lived to the shortest-lived:
/// `Global` outlives `Application`, which outlives `Session`, which outlives `Request`.
///
/// A singleton living in an outer kind must not keep an exclusive reference to a
/// singleton of an inner kind, because the inner one is destroyed first. This is not
/// enforced by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Global,
    Application,
    Session,
    Request,
}

impl ScopeKind {
    /// All kinds, outermost first.
    pub const ALL: [ScopeKind; 4] = [
        ScopeKind::Global,
        ScopeKind::Application,
        ScopeKind::Session,
        ScopeKind::Request,
    ];

    /// Whether the registry keeps a single slot for this kind instead of an id map.
    pub fn is_single_slot(self) -> bool {
        matches!(self, ScopeKind::Global | ScopeKind::Application)
    }

    /// Whether `self` lives at least as long as `other`.
    pub fn outlives(self, other: ScopeKind) -> bool {
        self <= other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::Application => "application",
            ScopeKind::Session => "session",
            ScopeKind::Request => "request",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a scope. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ScopeState {
    Created = 0,
    Active = 1,
    DestructionPending = 2,
    Destroyed = 3,
}

impl ScopeState {
    pub(crate) fn from_u8(value: u8) -> ScopeState {
        match value {
            0 => ScopeState::Created,
            1 => ScopeState::Active,
            2 => ScopeState::DestructionPending,
            _ => ScopeState::Destroyed,
        }
    }
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeState::Created => "created",
            ScopeState::Active => "active",
            ScopeState::DestructionPending => "destruction pending",
            ScopeState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Identity of a scope: its kind plus the instance id supplied by the caller
/// (session id, request id, application id, or [`GLOBAL_SCOPE_ID`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeId {
    pub kind: ScopeKind,
    pub id: String,
}

impl ScopeId {
    pub fn new(kind: ScopeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
