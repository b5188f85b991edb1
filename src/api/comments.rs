//! Comment API endpoints
//!
//! - GET /api/v1/articles/{id}/comments - Approved comments, threaded
//! - POST /api/v1/articles/{id}/comments - Comment on a published article
//! - PUT/DELETE /api/v1/comments/{id}
//! - POST /api/v1/comments/{id}/{approve,reject,report}
//! - GET /api/v1/comments/moderation - Moderation queue

use axum::{
    extract::State,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;

use crate::api::extract::{AuthenticatedUser, Json, Path, Query};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult, Paginated};
use crate::models::{
    Comment, CommentFilter, CommentStatus, CommentThread, CommentWithAuthor, CreateCommentInput,
    ListParams,
};

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/articles/{article}/comments", get(list_comments))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/articles/{article}/comments", post(create_comment))
        .route("/comments/moderation", get(moderation_queue))
        .route("/comments/{comment}", put(update_comment).delete(delete_comment))
        .route("/comments/{comment}/approve", post(approve_comment))
        .route("/comments/{comment}/reject", post(reject_comment))
        .route("/comments/{comment}/report", post(report_comment))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
) -> ApiResult<Vec<CommentThread>> {
    let threads = state.services.comments.list_for_article(article_id).await?;
    Ok(ApiResponse::ok(threads))
}

async fn create_comment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(article_id): Path<i64>,
    Json(input): Json<CreateCommentInput>,
) -> ApiResult<CommentWithAuthor> {
    let comment = state
        .services
        .comments
        .create(auth.id(), article_id, input)
        .await?;
    let message = if comment.comment.status == CommentStatus::Approved {
        "Comment posted"
    } else {
        "Comment submitted for moderation"
    };
    Ok(ApiResponse::created(comment).with_message(message))
}

async fn update_comment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCommentRequest>,
) -> ApiResult<CommentWithAuthor> {
    let comment = state
        .services
        .comments
        .update(auth.id(), id, &input.content)
        .await?;
    Ok(ApiResponse::ok(comment).with_message("Comment updated"))
}

async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.services.comments.delete(auth.id(), id).await?;
    Ok(ApiResponse::message("Comment deleted"))
}

async fn approve_comment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<CommentWithAuthor> {
    let comment = state.services.comments.approve(auth.id(), id).await?;
    Ok(ApiResponse::ok(comment).with_message("Comment approved"))
}

async fn reject_comment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<CommentWithAuthor> {
    let comment = state.services.comments.reject(auth.id(), id).await?;
    Ok(ApiResponse::ok(comment).with_message("Comment rejected"))
}

async fn report_comment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<Comment> {
    let comment = state.services.comments.report(auth.id(), id).await?;
    Ok(ApiResponse::ok(comment).with_message("Comment reported"))
}

async fn moderation_queue(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(filter): Query<CommentFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Paginated<CommentWithAuthor>> {
    let page = state
        .services
        .comments
        .moderation_queue(auth.id(), &filter, &params)
        .await?;
    Ok(ApiResponse::ok(page.into()))
}
