//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Create an account (first user becomes admin)
//! - POST /api/v1/auth/login - Exchange credentials for a bearer token
//! - POST /api/v1/auth/logout - Revoke the current token
//! - GET/PUT /api/v1/auth/me - Current profile
//! - PUT /api/v1/auth/password - Change password, revoking other sessions

use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};

use crate::api::extract::{AuthenticatedUser, Json};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{ChangePasswordInput, LoginInput, RegisterInput, UpdateProfileInput, UserWithRoles};
use crate::services::AuthSession;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me).put(update_me))
        .route("/auth/password", put(change_password))
}

async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> ApiResult<UserWithRoles> {
    let user = state.services.users.register(input).await?;
    Ok(ApiResponse::created(user).with_message("Registration successful"))
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> ApiResult<AuthSession> {
    let session = state.services.users.login(input).await?;
    Ok(ApiResponse::ok(session).with_message("Login successful"))
}

async fn logout(State(state): State<AppState>, auth: AuthenticatedUser) -> ApiResult<()> {
    state.services.users.logout(&auth.token).await?;
    Ok(ApiResponse::message("Logged out"))
}

async fn me(State(state): State<AppState>, auth: AuthenticatedUser) -> ApiResult<UserWithRoles> {
    let profile = state.services.users.profile(auth.id()).await?;
    Ok(ApiResponse::ok(profile))
}

async fn update_me(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<UpdateProfileInput>,
) -> ApiResult<UserWithRoles> {
    let profile = state.services.users.update_profile(auth.id(), input).await?;
    Ok(ApiResponse::ok(profile).with_message("Profile updated"))
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<ChangePasswordInput>,
) -> ApiResult<()> {
    state
        .services
        .users
        .change_password(auth.id(), &auth.token, input)
        .await?;
    Ok(ApiResponse::message("Password changed"))
}
