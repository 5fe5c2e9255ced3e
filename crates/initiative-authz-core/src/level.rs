//! Ordered permission scale and the coarse system-wide roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Discretionary access level on a single resource.
///
/// Totally ordered: `Read < Write < Owner`. Every level implies the ones
/// below it, so comparisons are plain `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Read,
    Write,
    Owner,
}

impl PermissionLevel {
    /// All levels, lowest first.
    pub const ALL: [PermissionLevel; 3] = [Self::Read, Self::Write, Self::Owner];

    /// Stable string form used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Owner => "owner",
        }
    }

    /// Whether this level satisfies `minimum`.
    pub fn satisfies(&self, minimum: PermissionLevel) -> bool {
        *self >= minimum
    }

    /// Whether acting at this level mutates the resource.
    pub fn is_mutation(&self) -> bool {
        *self > Self::Read
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "owner" => Ok(Self::Owner),
            other => Err(CoreError::UnknownValue {
                kind: "permission level",
                value: other.to_string(),
            }),
        }
    }
}

/// System-wide role of a principal.
///
/// `Admin` is the superadmin: it bypasses feature toggles and tenant
/// reachability, never DAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformRole {
    Admin,
    #[default]
    Member,
}

impl PlatformRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl FromStr for PlatformRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(CoreError::UnknownValue {
                kind: "platform role",
                value: other.to_string(),
            }),
        }
    }
}

/// Role of a principal inside one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    Admin,
    #[default]
    Member,
}

impl TenantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl FromStr for TenantRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(CoreError::UnknownValue {
                kind: "tenant role",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_totally_ordered() {
        assert!(PermissionLevel::Read < PermissionLevel::Write);
        assert!(PermissionLevel::Write < PermissionLevel::Owner);
        assert_eq!(
            PermissionLevel::Read.max(PermissionLevel::Owner),
            PermissionLevel::Owner
        );
    }

    #[test]
    fn test_satisfies() {
        assert!(PermissionLevel::Owner.satisfies(PermissionLevel::Write));
        assert!(PermissionLevel::Write.satisfies(PermissionLevel::Write));
        assert!(!PermissionLevel::Read.satisfies(PermissionLevel::Write));
    }

    #[test]
    fn test_level_string_roundtrip() {
        for level in PermissionLevel::ALL {
            assert_eq!(level.as_str().parse::<PermissionLevel>().unwrap(), level);
        }
        assert!("admin".parse::<PermissionLevel>().is_err());
    }

    #[test]
    fn test_level_serde_is_snake_case() {
        let json = serde_json::to_string(&PermissionLevel::Owner).unwrap();
        assert_eq!(json, "\"owner\"");
    }
}
