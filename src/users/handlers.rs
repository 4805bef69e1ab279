use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, PublicUser, RegisterRequest, UpdateProfileRequest},
    services::{delete_account, update_profile},
};
use crate::{
    auth::{
        extractors::CurrentUser,
        services::{register, verify_credentials},
        session::{cleared_session_cookie, session_cookie, SessionKeys},
    },
    error::{AuthError, MessageBody},
    state::AppState,
};

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register_user))
        .route("/users/auth", post(login))
        .route("/users/logout", post(logout))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route(
        "/users/profile",
        axum::routing::get(get_profile)
            .put(update_user_profile)
            .delete(delete_user),
    )
}

fn issue_session(state: &AppState, user_id: Uuid) -> Result<HeaderValue, AuthError> {
    let keys = SessionKeys::new(&state.config.jwt);
    let session = keys.issue(user_id)?;
    Ok(session_cookie(&session, keys.ttl(), &state.config.cookie)?)
}

fn revoke_session(state: &AppState) -> Result<HeaderValue, AuthError> {
    Ok(cleared_session_cookie(&state.config.cookie)?)
}

// Login answers 201 like registration does.
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let Json(payload) = payload?;
    let user = verify_credentials(state.users.as_ref(), &payload.email, &payload.password).await?;
    let cookie = issue_session(&state, user.id)?;

    info!(user_id = %user.id, "user logged in");
    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(PublicUser::from(user)),
    ))
}

#[instrument(skip(state, payload))]
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let Json(payload) = payload?;
    let user = register(
        state.users.as_ref(),
        &payload.name,
        &payload.email,
        &payload.password,
    )
    .await?;
    let cookie = issue_session(&state, user.id)?;

    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(PublicUser::from(user)),
    ))
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse, AuthError> {
    let cookie = revoke_session(&state)?;
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(MessageBody::new("User logged out")),
    ))
}

#[instrument(skip_all)]
pub async fn get_profile(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(user))
}

#[instrument(skip_all)]
pub async fn update_user_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<PublicUser>, AuthError> {
    let Json(changes) = payload?;
    let updated = update_profile(state.users.as_ref(), user.id, changes).await?;
    Ok(Json(PublicUser::from(updated)))
}

#[instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AuthError> {
    delete_account(state.users.as_ref(), user.id).await?;
    let cookie = revoke_session(&state)?;
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(MessageBody::new("User deleted successfully")),
    ))
}
