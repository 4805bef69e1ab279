use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::session::{read_session_cookie, SessionKeys};
use crate::{error::AuthError, state::AppState, users::repo_types::User};

/// Resolves the session cookie into the account it belongs to.
///
/// Rejects with 401 when the cookie is missing, the token does not verify,
/// or the account has since been deleted.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = read_session_cookie(&parts.headers)
            .ok_or(AuthError::Unauthorized("Not authorized, no token"))?;

        let claims = SessionKeys::from_ref(state).verify(&token).map_err(|e| {
            warn!(error = %e, "invalid or expired session");
            AuthError::Unauthorized("Not authorized, token failed")
        })?;

        match state.users.find_by_id(claims.sub).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                warn!(user_id = %claims.sub, "session for missing account");
                Err(AuthError::Unauthorized("Not authorized, token failed"))
            }
        }
    }
}
