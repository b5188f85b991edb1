//! Newsletter endpoints
//!
//! Public: subscribe, confirm and unsubscribe (the last two by token).
//! Administration (`newsletter.manage`): subscriber list, stats, deletion
//! and campaign delivery.

use axum::{
    extract::State,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;

use crate::api::extract::{AuthenticatedUser, Json, Path, Query};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult, Paginated};
use crate::models::{
    CampaignInput, CampaignReport, ListParams, NewsletterStats, NewsletterSubscriber,
    SubscribeInput, SubscriberStatus,
};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriberQuery {
    #[serde(default)]
    pub status: Option<SubscriberStatus>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/newsletter/subscribe", post(subscribe))
        .route("/newsletter/confirm", post(confirm))
        .route("/newsletter/unsubscribe", post(unsubscribe))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/newsletter/subscribers", get(list_subscribers))
        .route("/newsletter/subscribers/{subscriber}", delete(delete_subscriber))
        .route("/newsletter/stats", get(stats))
        .route("/newsletter/send", post(send_campaign))
}

async fn subscribe(
    State(state): State<AppState>,
    Json(input): Json<SubscribeInput>,
) -> ApiResult<NewsletterSubscriber> {
    let subscriber = state.services.newsletter.subscribe(input).await?;
    Ok(ApiResponse::created(subscriber)
        .with_message("Please check your inbox to confirm the subscription"))
}

async fn confirm(
    State(state): State<AppState>,
    Json(input): Json<TokenRequest>,
) -> ApiResult<NewsletterSubscriber> {
    let subscriber = state.services.newsletter.confirm(&input.token).await?;
    Ok(ApiResponse::ok(subscriber).with_message("Subscription confirmed"))
}

async fn unsubscribe(
    State(state): State<AppState>,
    Json(input): Json<TokenRequest>,
) -> ApiResult<NewsletterSubscriber> {
    let subscriber = state.services.newsletter.unsubscribe(&input.token).await?;
    Ok(ApiResponse::ok(subscriber).with_message("Unsubscribed"))
}

async fn list_subscribers(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<SubscriberQuery>,
    Query(params): Query<ListParams>,
) -> ApiResult<Paginated<NewsletterSubscriber>> {
    let page = state
        .services
        .newsletter
        .list(auth.id(), query.status, &params)
        .await?;
    Ok(ApiResponse::ok(page.into()))
}

async fn stats(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> ApiResult<NewsletterStats> {
    let stats = state.services.newsletter.stats(auth.id()).await?;
    Ok(ApiResponse::ok(stats))
}

async fn delete_subscriber(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.services.newsletter.delete(auth.id(), id).await?;
    Ok(ApiResponse::message("Subscriber deleted"))
}

async fn send_campaign(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(input): Json<CampaignInput>,
) -> ApiResult<CampaignReport> {
    let report = state
        .services
        .newsletter
        .send_campaign(auth.id(), input)
        .await?;
    Ok(ApiResponse::ok(report).with_message("Campaign sent"))
}
