//! Media library endpoints
//!
//! - GET /api/v1/media - Own uploads (all with `media.manage.any`)
//! - POST /api/v1/media - multipart/form-data: `file`, optional `alt_text`
//! - GET/PUT/DELETE /api/v1/media/{id}

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::api::errors::ApiError;
use crate::api::extract::{AuthenticatedUser, Json, Path, Query};
use crate::api::middleware::AppState;
use crate::api::responses::{ApiResponse, ApiResult, Paginated};
use crate::models::{ListParams, Media, MediaFilter, UploadInput};

/// Media record plus the URL it is served from
#[derive(Debug, Serialize)]
pub struct MediaResponse {
    #[serde(flatten)]
    pub media: Media,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMediaRequest {
    #[serde(default)]
    pub alt_text: Option<String>,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/media", get(list_media).post(upload_media))
        .route(
            "/media/{media}",
            get(get_media).put(update_media).delete(delete_media),
        )
}

fn respond(state: &AppState, media: Media) -> MediaResponse {
    let url = state.services.media.public_url(&media);
    MediaResponse { media, url }
}

async fn list_media(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(filter): Query<MediaFilter>,
    Query(params): Query<ListParams>,
) -> ApiResult<Paginated<MediaResponse>> {
    let page = state
        .services
        .media
        .list(auth.id(), &filter, &params)
        .await?;
    Ok(ApiResponse::ok(page.map(|m| respond(&state, m)).into()))
}

async fn upload_media(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<MediaResponse> {
    let mut multipart = multipart?;
    let mut file = None;
    let mut alt_text = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name().unwrap_or_default() {
            "file" => {
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                file = Some((original_name, mime_type, bytes.to_vec()));
            }
            "alt_text" => alt_text = Some(field.text().await?),
            _ => {}
        }
    }

    let (original_name, mime_type, bytes) =
        file.ok_or_else(|| ApiError::validation("No file provided"))?;
    let media = state
        .services
        .media
        .upload(
            auth.id(),
            UploadInput {
                original_name,
                mime_type,
                bytes,
                alt_text,
            },
        )
        .await?;
    Ok(ApiResponse::created(respond(&state, media)).with_message("File uploaded"))
}

async fn get_media(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<MediaResponse> {
    let media = state.services.media.get(auth.id(), id).await?;
    Ok(ApiResponse::ok(respond(&state, media)))
}

async fn update_media(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateMediaRequest>,
) -> ApiResult<MediaResponse> {
    let media = state
        .services
        .media
        .update_alt_text(auth.id(), id, input.alt_text)
        .await?;
    Ok(ApiResponse::ok(respond(&state, media)).with_message("Media updated"))
}

async fn delete_media(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.services.media.delete(auth.id(), id).await?;
    Ok(ApiResponse::message("Media deleted"))
}
