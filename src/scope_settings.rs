//! Registry settings.
//!
//! `ScopeSettings` derives `Deserialize` with defaults for every field, so it can be
//! embedded as a table in an application's own configuration file.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    /// Log every lifecycle transition at `info` instead of `debug`.
    pub lifecycle_debugging: bool,

    /// Warn about every scope still alive when the registry shuts down.
    pub warn_on_leftover_scopes: bool,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            lifecycle_debugging: false,
            warn_on_leftover_scopes: true,
        }
    }
}

impl ScopeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifecycle_debugging(mut self, enabled: bool) -> Self {
        self.lifecycle_debugging = enabled;
        self
    }

    pub fn warn_on_leftover_scopes(mut self, enabled: bool) -> Self {
        self.warn_on_leftover_scopes = enabled;
        self
    }
}
