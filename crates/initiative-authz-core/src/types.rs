//! Strong type definitions for identifiers.
//!
//! All identifiers are 16-byte newtypes so a `TenantId` can never be passed
//! where a `ResourceId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length in bytes of every identifier.
pub const ID_LEN: usize = 16;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; ID_LEN]);

        impl $name {
            /// Create an identifier from raw bytes.
            pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(rand::random())
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                if bytes.len() != ID_LEN {
                    return Err(hex::FromHexError::InvalidStringLength);
                }
                let mut arr = [0u8; ID_LEN];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..12])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; ID_LEN]> for $name {
            fn from(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; ID_LEN] = slice.try_into()?;
                Ok(Self(arr))
            }
        }
    };
}

define_id!(
    /// Identifies a tenant, the root isolation boundary.
    TenantId
);

define_id!(
    /// Identifies an authenticated actor.
    PrincipalId
);

define_id!(
    /// Identifies an initiative within a tenant.
    InitiativeId
);

define_id!(
    /// Identifies an initiative-scoped role.
    RoleId
);

define_id!(
    /// Identifies a DAC resource (project, document, queue).
    ResourceId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_hex_roundtrip() {
        let id = ResourceId::from_bytes([0x42; ID_LEN]);
        let recovered = ResourceId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_id_rejects_wrong_length() {
        assert!(TenantId::from_hex("abcd").is_err());
        assert!(TenantId::from_hex(&"ab".repeat(32)).is_err());
    }

    #[test]
    fn test_id_debug_names_type() {
        let id = PrincipalId::from_bytes([0xcd; ID_LEN]);
        let debug = format!("{:?}", id);
        assert_eq!(debug, "PrincipalId(cdcdcdcdcdcd)");
    }

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(RoleId::generate(), RoleId::generate());
    }
}
