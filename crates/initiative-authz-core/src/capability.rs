//! Feature toggles and the feature toggle resolver.
//!
//! Toggles gate *capabilities* (may this principal create documents in this
//! initiative?) rather than access to an existing resource. They are the only
//! place a platform administrator gets a blanket yes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::{InitiativeRole, Principal, ResourceKind};

/// Capability keys a role can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKey {
    DocsEnabled,
    ProjectsEnabled,
    CreateDocs,
    CreateProjects,
}

impl CapabilityKey {
    pub const ALL: [CapabilityKey; 4] = [
        Self::DocsEnabled,
        Self::ProjectsEnabled,
        Self::CreateDocs,
        Self::CreateProjects,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocsEnabled => "docs_enabled",
            Self::ProjectsEnabled => "projects_enabled",
            Self::CreateDocs => "create_docs",
            Self::CreateProjects => "create_projects",
        }
    }

    /// Value used when a role has no toggle row for this key.
    ///
    /// Viewing defaults on, creating defaults off. Adding a key must not
    /// retroactively revoke anything from existing custom roles.
    pub fn default_enabled(&self) -> bool {
        match self {
            Self::DocsEnabled | Self::ProjectsEnabled => true,
            Self::CreateDocs | Self::CreateProjects => false,
        }
    }

    /// The capability that gates creating a resource of `kind`.
    pub fn for_create(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Document => Self::CreateDocs,
            ResourceKind::Project | ResourceKind::Queue => Self::CreateProjects,
        }
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| CoreError::UnknownValue {
                kind: "capability key",
                value: s.to_string(),
            })
    }
}

impl InitiativeRole {
    /// Whether holders of this role have `key`.
    ///
    /// Managers have every capability. Otherwise the stored toggle wins and a
    /// missing row falls back to the key's default.
    pub fn allows(&self, key: CapabilityKey) -> bool {
        if self.is_manager {
            return true;
        }
        self.toggle(key).unwrap_or_else(|| key.default_enabled())
    }
}

/// Feature toggle resolver.
///
/// `membership_role` is the role the principal currently holds in the
/// initiative being asked about, or `None` when they are not a member.
pub fn can(
    principal: &Principal,
    membership_role: Option<&InitiativeRole>,
    key: CapabilityKey,
) -> bool {
    // Scoped to toggles only; the resolver never sees this shortcut.
    if principal.is_superadmin() {
        return true;
    }

    match membership_role {
        Some(role) => role.allows(key),
        None => false,
    }
}
