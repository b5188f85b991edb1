//! Role and permission management (`roles.manage`)
//!
//! - GET/POST /api/v1/roles
//! - GET/PUT/DELETE /api/v1/roles/{id}
//! - PUT /api/v1/roles/{id}/permissions - Replace the permission set
//! - GET/POST /api/v1/permissions

use axum::{
    extract::State,
    routing::{get, put},
    Router,
};
use serde::Deserialize;

use crate::api::extract::{AuthenticatedUser, Json, Path};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{
    CreatePermissionInput, CreateRoleInput, Permission, RoleWithPermissions, UpdateRoleInput,
};

#[derive(Debug, Deserialize)]
pub struct SyncPermissionsRequest {
    pub permissions: Vec<String>,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route(
            "/roles/{role}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/roles/{role}/permissions", put(sync_permissions))
        .route("/permissions", get(list_permissions).post(create_permission))
}

async fn list_roles(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> ApiResult<Vec<RoleWithPermissions>> {
    let roles = state.services.roles.list_roles(auth.id()).await?;
    Ok(ApiResponse::ok(roles))
}

async fn get_role(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<RoleWithPermissions> {
    let role = state.services.roles.get_role(auth.id(), id).await?;
    Ok(ApiResponse::ok(role))
}

async fn create_role(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateRoleInput>,
) -> ApiResult<RoleWithPermissions> {
    let role = state.services.roles.create_role(auth.id(), input).await?;
    Ok(ApiResponse::created(role).with_message("Role created"))
}

async fn update_role(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateRoleInput>,
) -> ApiResult<RoleWithPermissions> {
    let role = state
        .services
        .roles
        .update_role(auth.id(), id, input)
        .await?;
    Ok(ApiResponse::ok(role).with_message("Role updated"))
}

async fn delete_role(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.services.roles.delete_role(auth.id(), id).await?;
    Ok(ApiResponse::message("Role deleted"))
}

async fn sync_permissions(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<SyncPermissionsRequest>,
) -> ApiResult<RoleWithPermissions> {
    let role = state
        .services
        .roles
        .sync_permissions(auth.id(), id, &input.permissions)
        .await?;
    Ok(ApiResponse::ok(role).with_message("Permissions updated"))
}

async fn list_permissions(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> ApiResult<Vec<Permission>> {
    let permissions = state.services.roles.list_permissions(auth.id()).await?;
    Ok(ApiResponse::ok(permissions))
}

async fn create_permission(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<CreatePermissionInput>,
) -> ApiResult<Permission> {
    let permission = state
        .services
        .roles
        .create_permission(auth.id(), input)
        .await?;
    Ok(ApiResponse::created(permission).with_message("Permission created"))
}
