//! Notification endpoints, always scoped to the caller
//!
//! - GET /api/v1/notifications[?unread=true]
//! - GET /api/v1/notifications/unread-count
//! - POST /api/v1/notifications/{id}/read, POST /api/v1/notifications/read-all
//! - DELETE /api/v1/notifications/{id}
//! - POST /api/v1/notifications/send - `notifications.send`

use axum::{
    extract::State,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::api::extract::{AuthenticatedUser, Json, Path, Query};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult, Paginated};
use crate::models::{ListParams, NewNotification, Notification};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub user_id: i64,
    #[serde(flatten)]
    pub notification: NewNotification,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/send", post(send_notification))
        .route("/notifications/{notification}", delete(delete_notification))
        .route("/notifications/{notification}/read", post(mark_read))
}

async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
    Query(params): Query<ListParams>,
) -> ApiResult<Paginated<Notification>> {
    let page = state
        .services
        .notifications
        .list(auth.id(), query.unread, &params)
        .await?;
    Ok(ApiResponse::ok(page.into()))
}

async fn unread_count(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> ApiResult<UnreadCount> {
    let count = state.services.notifications.unread_count(auth.id()).await?;
    Ok(ApiResponse::ok(UnreadCount { count }))
}

async fn mark_read(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<Notification> {
    let notification = state.services.notifications.mark_read(auth.id(), id).await?;
    Ok(ApiResponse::ok(notification))
}

async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> ApiResult<MarkedRead> {
    let updated = state.services.notifications.mark_all_read(auth.id()).await?;
    Ok(ApiResponse::ok(MarkedRead { updated }))
}

async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.services.notifications.delete(auth.id(), id).await?;
    Ok(ApiResponse::message("Notification deleted"))
}

async fn send_notification(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<SendNotificationRequest>,
) -> ApiResult<Notification> {
    let notification = state
        .services
        .notifications
        .send(auth.id(), input.user_id, input.notification)
        .await?;
    Ok(ApiResponse::created(notification).with_message("Notification sent"))
}
