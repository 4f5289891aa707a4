use std::fmt;

use thiserror::Error;

use crate::ScopeId;

/// Boxed error returned by fallible factories and destroy hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("scope {0} is already active")]
    DuplicateScope(ScopeId),

    #[error("scope {0} is not active or not registered")]
    UnknownScope(ScopeId),

    #[error("scope {0} is no longer active")]
    ScopeInactive(ScopeId),

    #[error("singleton '{key}' in scope {scope} is not of type {expected}")]
    TypeMismatch {
        scope: ScopeId,
        key: String,
        expected: &'static str,
    },

    #[error("construction of singleton '{key}' in scope {scope} waits on itself")]
    CyclicConstruction { scope: ScopeId, key: String },

    #[error("failed to construct singleton '{key}' in scope {scope}: {source}")]
    Construction {
        scope: ScopeId,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Destruction(#[from] MultiDestructionError),
}

impl ScopeError {
    /// The scope the error refers to. Aggregated destruction errors may span several
    /// scopes and report the first one.
    pub fn scope(&self) -> Option<&ScopeId> {
        match self {
            ScopeError::DuplicateScope(id)
            | ScopeError::UnknownScope(id)
            | ScopeError::ScopeInactive(id) => Some(id),
            ScopeError::TypeMismatch { scope, .. }
            | ScopeError::CyclicConstruction { scope, .. }
            | ScopeError::Construction { scope, .. } => Some(scope),
            ScopeError::Destruction(err) => err.failures().first().map(|f| &f.scope),
        }
    }
}

/// Which hook of a singleton failed during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestructionPhase {
    BeforeDestroy,
    Destroy,
}

impl fmt::Display for DestructionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestructionPhase::BeforeDestroy => f.write_str("before-destroy"),
            DestructionPhase::Destroy => f.write_str("destroy"),
        }
    }
}

/// One failed hook invocation.
#[derive(Debug, Error)]
#[error("{phase} hook of '{key}' in scope {scope} failed: {source}")]
pub struct DestructionFailure {
    pub scope: ScopeId,
    pub key: String,
    pub phase: DestructionPhase,
    #[source]
    pub source: BoxError,
}

/// Every hook failure collected while tearing down one or more scopes.
#[derive(Debug, Default, Error)]
pub struct MultiDestructionError {
    failures: Vec<DestructionFailure>,
}

impl MultiDestructionError {
    pub fn new(failures: Vec<DestructionFailure>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[DestructionFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<DestructionFailure> {
        self.failures
    }

    /// Keys whose hooks failed, in the order the failures happened. A key whose
    /// before-destroy and destroy hooks both failed appears twice.
    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.key.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn push(&mut self, failure: DestructionFailure) {
        self.failures.push(failure);
    }

    pub(crate) fn extend(&mut self, other: MultiDestructionError) {
        self.failures.extend(other.failures);
    }

    /// `Ok(())` when nothing failed.
    pub(crate) fn into_result(self) -> Result<(), MultiDestructionError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiDestructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} singleton hook(s) failed during destruction", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}
