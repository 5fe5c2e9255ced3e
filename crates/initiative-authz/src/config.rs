//! Engine configuration.

use serde::Deserialize;

use crate::error::Result;

/// Configuration for the [`Engine`](crate::Engine).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use initiative_authz::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "allow_global_reads": true }"#).unwrap();
/// assert!(config.allow_global_reads);
/// assert!(config.seed_builtin_roles);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Honour requests for global read mode. When off, such requests fall
    /// back to the active tenant.
    pub allow_global_reads: bool,

    /// Seed `project_manager` and `member` into every new initiative.
    pub seed_builtin_roles: bool,

    /// Make the creator of an initiative its first `project_manager`.
    /// Ignored unless built-in roles are seeded.
    pub creator_joins_as_manager: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_global_reads: false,
            seed_builtin_roles: true,
            creator_joins_as_manager: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
