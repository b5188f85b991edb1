//! Article API endpoints
//!
//! - GET /api/v1/articles - Published articles, filtered and paginated
//! - GET /api/v1/articles/{slug} - One article (drafts only for their author or staff)
//! - GET /api/v1/articles/manage - Management listing across statuses
//! - POST /api/v1/articles - Create
//! - PUT /api/v1/articles/{id} - Update
//! - DELETE /api/v1/articles/{id}[?force=true] - Move to trash, or delete for good
//! - POST /api/v1/articles/{id}/{approve,reject,report,restore,feature} - Workflow

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::api::extract::{AuthenticatedUser, Json, Path, Query, Viewer};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult, Paginated};
use crate::models::{
    Article, ArticleFilter, ArticleWithRelations, CreateArticleInput, ListParams,
    UpdateArticleInput,
};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct FeatureRequest {
    #[serde(default = "default_featured")]
    pub featured: bool,
}

fn default_featured() -> bool {
    true
}

/// Served behind `optional_auth`
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/articles", get(list_articles))
        .route("/articles/{article}", get(get_article))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/articles", post(create_article))
        .route("/articles/manage", get(manage_articles))
        .route(
            "/articles/{article}",
            axum::routing::put(update_article).delete(delete_article),
        )
        .route("/articles/{article}/approve", post(approve_article))
        .route("/articles/{article}/reject", post(reject_article))
        .route("/articles/{article}/report", post(report_article))
        .route("/articles/{article}/restore", post(restore_article))
        .route("/articles/{article}/feature", post(feature_article))
}

async fn list_articles(
    State(state): State<AppState>,
    Query(filter): Query<ArticleFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Paginated<ArticleWithRelations>> {
    let page = state.services.articles.list_published(&filter, &params).await?;
    Ok(ApiResponse::ok(page.into()))
}

async fn get_article(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(slug): Path<String>,
) -> ApiResult<ArticleWithRelations> {
    let article = state
        .services
        .articles
        .get_by_slug(&slug, viewer.id())
        .await?;
    Ok(ApiResponse::ok(article))
}

async fn manage_articles(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(filter): Query<ArticleFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Paginated<ArticleWithRelations>> {
    let page = state
        .services
        .articles
        .list_for_management(auth.id(), &filter, &params)
        .await?;
    Ok(ApiResponse::ok(page.into()))
}

async fn create_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateArticleInput>,
) -> ApiResult<ArticleWithRelations> {
    let article = state.services.articles.create(auth.id(), input).await?;
    Ok(ApiResponse::created(article).with_message("Article created"))
}

async fn update_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateArticleInput>,
) -> ApiResult<ArticleWithRelations> {
    let article = state.services.articles.update(auth.id(), id, input).await?;
    Ok(ApiResponse::ok(article).with_message("Article updated"))
}

async fn delete_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<()> {
    let articles = &state.services.articles;
    if query.force {
        articles.force_delete(auth.id(), id).await?;
        Ok(ApiResponse::message("Article permanently deleted"))
    } else {
        articles.delete(auth.id(), id).await?;
        Ok(ApiResponse::message("Article moved to trash"))
    }
}

async fn approve_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<ArticleWithRelations> {
    let article = state.services.articles.approve(auth.id(), id).await?;
    Ok(ApiResponse::ok(article).with_message("Article approved"))
}

async fn reject_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<RejectRequest>,
) -> ApiResult<ArticleWithRelations> {
    let article = state
        .services
        .articles
        .reject(auth.id(), id, &input.reason)
        .await?;
    Ok(ApiResponse::ok(article).with_message("Article rejected"))
}

async fn report_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<Article> {
    let article = state.services.articles.report(auth.id(), id).await?;
    Ok(ApiResponse::ok(article).with_message("Article reported"))
}

async fn restore_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<ArticleWithRelations> {
    let article = state.services.articles.restore(auth.id(), id).await?;
    Ok(ApiResponse::ok(article).with_message("Article restored"))
}

async fn feature_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<FeatureRequest>,
) -> ApiResult<Article> {
    let article = state
        .services
        .articles
        .set_featured(auth.id(), id, input.featured)
        .await?;
    Ok(ApiResponse::ok(article))
}
