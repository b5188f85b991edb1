//! Tag API endpoints
//!
//! - GET /api/v1/tags - All tags with published article counts
//! - GET /api/v1/tags/{slug}
//! - POST /api/v1/tags, DELETE /api/v1/tags/{id} - `categories.manage`

use axum::{
    extract::State,
    routing::{delete, get, post},
    Router,
};

use crate::api::extract::{AuthenticatedUser, Json, Path};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{CreateTagInput, Tag, TagWithCount};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags/{tag}", get(get_tag))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/tags", post(create_tag))
        .route("/tags/{tag}", delete(delete_tag))
}

async fn list_tags(State(state): State<AppState>) -> ApiResult<Vec<TagWithCount>> {
    let tags = state.services.tags.list().await?;
    Ok(ApiResponse::ok(tags))
}

async fn get_tag(State(state): State<AppState>, Path(slug): Path<String>) -> ApiResult<Tag> {
    let tag = state.services.tags.get_by_slug(&slug).await?;
    Ok(ApiResponse::ok(tag))
}

async fn create_tag(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateTagInput>,
) -> ApiResult<Tag> {
    let tag = state.services.tags.create(auth.id(), input).await?;
    Ok(ApiResponse::created(tag).with_message("Tag created"))
}

async fn delete_tag(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.services.tags.delete(auth.id(), id).await?;
    Ok(ApiResponse::message("Tag deleted"))
}
