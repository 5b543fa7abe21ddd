//! Input validation for API requests.
//!
//! Field checks return a message per problem; `validate_create_order`
//! collects them into one `ApiError` through the `ValidationErrorBuilder`.

use crate::db::CreateOrderRequest;

use super::error::{ApiError, ValidationErrorBuilder};

const MAX_NAME_LEN: usize = 255;

/// Validate the operator (user id) performing an action
pub fn validate_operator(operator: &str) -> Result<(), String> {
    if operator.trim().is_empty() {
        return Err("operator is required".to_string());
    }
    if operator.len() > MAX_NAME_LEN {
        return Err(format!("operator is too long (max {} characters)", MAX_NAME_LEN));
    }
    Ok(())
}

/// Validate a workspace name such as `DEV` or `prod`
pub fn validate_workspace(workspace: &str) -> Result<(), String> {
    if workspace.trim().is_empty() {
        return Err("workspace must not be blank".to_string());
    }
    if !workspace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("workspace may only contain letters, digits, '-' and '_'".to_string());
    }
    Ok(())
}

/// Validate selected mode names
pub fn validate_modes(modes: &[String]) -> Result<(), String> {
    for mode in modes {
        if mode.trim().is_empty() {
            return Err("mode names must not be blank".to_string());
        }
        // modes are stored comma-joined
        if mode.contains(',') {
            return Err(format!("mode name {} must not contain ','", mode));
        }
    }
    Ok(())
}

pub fn validate_create_order(req: &CreateOrderRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_operator(&req.operator) {
        errors.add("operator", e);
    }

    let has_id = req.release_id.as_deref().is_some_and(|id| !id.is_empty());
    let has_name = req.release_name.as_deref().is_some_and(|n| !n.is_empty());
    if !has_id && !has_name {
        errors.add("release_id", "release id or release name is required");
    }
    if !has_id && has_name && req.kind.is_none() {
        errors.add("kind", "kind is required when the release is given by name");
    }

    if let Some(workspace) = &req.workspace {
        if let Err(e) = validate_workspace(workspace) {
            errors.add("workspace", e);
        }
    }
    if let Err(e) = validate_modes(&req.modes) {
        errors.add("modes", e);
    }

    errors.finish()
}
