//! Category API endpoints
//!
//! - GET /api/v1/categories - All categories with published article counts
//! - GET /api/v1/categories/{slug}
//! - POST /api/v1/categories, PUT/DELETE /api/v1/categories/{id} - `categories.manage`

use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};

use crate::api::extract::{AuthenticatedUser, Json, Path};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult};
use crate::models::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/categories/{category}", get(get_category))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/categories", post(create_category))
        .route(
            "/categories/{category}",
            put(update_category).delete(delete_category),
        )
}

async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<CategoryWithCount>> {
    let categories = state.services.categories.list().await?;
    Ok(ApiResponse::ok(categories))
}

async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Category> {
    let category = state.services.categories.get_by_slug(&slug).await?;
    Ok(ApiResponse::ok(category))
}

async fn create_category(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateCategoryInput>,
) -> ApiResult<Category> {
    let category = state.services.categories.create(auth.id(), input).await?;
    Ok(ApiResponse::created(category).with_message("Category created"))
}

async fn update_category(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCategoryInput>,
) -> ApiResult<Category> {
    let category = state
        .services
        .categories
        .update(auth.id(), id, input)
        .await?;
    Ok(ApiResponse::ok(category).with_message("Category updated"))
}

async fn delete_category(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.services.categories.delete(auth.id(), id).await?;
    Ok(ApiResponse::message("Category deleted"))
}
