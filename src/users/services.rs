use tracing::{info, warn};
use uuid::Uuid;

use super::{dto::UpdateProfileRequest, repo::UserStore, repo_types::User};
use crate::{
    auth::{
        password::hash_password,
        services::{is_valid_email, normalize_email},
    },
    error::AuthError,
};

fn present(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

/// Applies the fields present in `changes` to the stored account.
pub async fn update_profile(
    users: &dyn UserStore,
    user_id: Uuid,
    changes: UpdateProfileRequest,
) -> Result<User, AuthError> {
    let mut user = users.find_by_id(user_id).await?.ok_or(AuthError::NotFound)?;

    if let Some(name) = present(changes.name) {
        user.name = name.trim().to_string();
    }
    if let Some(email) = present(changes.email) {
        let email = normalize_email(&email);
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AuthError::InvalidInput("Invalid User Data: invalid email".into()));
        }
        user.email = email;
    }
    if let Some(password) = changes.password.filter(|p| !p.is_empty()) {
        user.password_hash = hash_password(&password)?;
    }

    let updated = users.update(&user).await?.ok_or(AuthError::NotFound)?;
    info!(user_id = %updated.id, "profile updated");
    Ok(updated)
}

pub async fn delete_account(users: &dyn UserStore, user_id: Uuid) -> Result<(), AuthError> {
    match users.delete(user_id).await? {
        0 => Err(AuthError::NotFound),
        _ => {
            info!(user_id = %user_id, "user deleted");
            Ok(())
        }
    }
}
