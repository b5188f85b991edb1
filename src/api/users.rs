//! User administration endpoints (`users.manage`)
//!
//! - GET /api/v1/users, GET /api/v1/users/{id}
//! - POST /api/v1/users/{id}/ban, POST /api/v1/users/{id}/unban
//! - PUT /api/v1/users/{id}/roles
//! - DELETE /api/v1/users/{id}
//!
//! Acting on one's own account is refused with 403.

use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;

use crate::api::extract::{AuthenticatedUser, Json, Path, Query};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult, Paginated};
use crate::models::{ListParams, User, UserFilter, UserWithRoles};

#[derive(Debug, Deserialize)]
pub struct SyncRolesRequest {
    pub roles: Vec<String>,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{user}", get(get_user).delete(delete_user))
        .route("/users/{user}/ban", post(ban_user))
        .route("/users/{user}/unban", post(unban_user))
        .route("/users/{user}/roles", put(sync_roles))
}

async fn list_users(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(filter): Query<UserFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Paginated<UserWithRoles>> {
    let page = state
        .services
        .users
        .list(auth.id(), &filter, &params)
        .await?;
    Ok(ApiResponse::ok(page.into()))
}

async fn get_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<UserWithRoles> {
    let user = state.services.users.get(auth.id(), id).await?;
    Ok(ApiResponse::ok(user))
}

async fn ban_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<User> {
    let user = state.services.users.ban(auth.id(), id).await?;
    Ok(ApiResponse::ok(user).with_message("User banned"))
}

async fn unban_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<User> {
    let user = state.services.users.unban(auth.id(), id).await?;
    Ok(ApiResponse::ok(user).with_message("User unbanned"))
}

async fn sync_roles(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<SyncRolesRequest>,
) -> ApiResult<UserWithRoles> {
    let user = state
        .services
        .users
        .sync_roles(auth.id(), id, &input.roles)
        .await?;
    Ok(ApiResponse::ok(user).with_message("Roles updated"))
}

async fn delete_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.services.users.delete(auth.id(), id).await?;
    Ok(ApiResponse::message("User deleted"))
}
