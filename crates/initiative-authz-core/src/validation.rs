//! Write-time checks shared by the registry.

use crate::error::{CoreError, Result};
use crate::model::{Initiative, InitiativeRole, Resource};

/// Maximum length of a role name.
pub const MAX_ROLE_NAME_LEN: usize = 100;

/// Maximum length of tenant, initiative and resource names.
pub const MAX_NAME_LEN: usize = 200;

/// Validate a role name: non-blank, bounded, no surrounding whitespace.
pub fn validate_role_name(name: &str) -> Result<()> {
    validate_name("role", name, MAX_ROLE_NAME_LEN)
}

/// Validate a display name for tenants, initiatives and resources.
pub fn validate_display_name(what: &'static str, name: &str) -> Result<()> {
    validate_name(what, name, MAX_NAME_LEN)
}

fn validate_name(what: &'static str, name: &str, max: usize) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(format!("{} name must not be blank", what)));
    }
    if name.trim() != name {
        return Err(CoreError::Validation(format!(
            "{} name must not have surrounding whitespace",
            what
        )));
    }
    if name.chars().count() > max {
        return Err(CoreError::Validation(format!(
            "{} name exceeds {} characters",
            what, max
        )));
    }
    Ok(())
}

/// A role may only be granted on resources of its own initiative.
pub fn check_role_on_resource(role: &InitiativeRole, resource: &Resource) -> Result<()> {
    if role.initiative_id != resource.initiative_id {
        return Err(CoreError::InvalidReference(format!(
            "role {} belongs to initiative {}, resource {} to initiative {}",
            role.id, role.initiative_id, resource.id, resource.initiative_id
        )));
    }
    Ok(())
}

/// A membership may only reference a role of the same initiative.
pub fn check_role_in_initiative(role: &InitiativeRole, initiative: &Initiative) -> Result<()> {
    if role.initiative_id != initiative.id {
        return Err(CoreError::InvalidReference(format!(
            "role {} does not belong to initiative {}",
            role.id, initiative.id
        )));
    }
    Ok(())
}

/// A resource must carry its initiative's tenant.
pub fn check_resource_in_initiative(resource: &Resource, initiative: &Initiative) -> Result<()> {
    if resource.initiative_id != initiative.id || resource.tenant_id != initiative.tenant_id {
        return Err(CoreError::InvalidReference(format!(
            "resource {} is not part of initiative {}",
            resource.id, initiative.id
        )));
    }
    Ok(())
}
