//! API layer - HTTP handlers and routing
//!
//! Everything lives under `/api/v1`. Routes are split into a public router
//! (behind `optional_auth`, so handlers can still see a signed-in viewer)
//! and a protected router (behind `require_auth`). Permission checks happen
//! in the services.

pub mod articles;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod errors;
pub mod extract;
pub mod media;
pub mod middleware;
pub mod newsletter;
pub mod notifications;
pub mod responses;
pub mod roles;
pub mod tags;
pub mod users;

#[cfg(test)]
mod tests;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware, Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use errors::{ApiError, ExceptionHandler};
pub use middleware::AppState;

/// Room for multipart framing on top of the largest accepted file
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Routes under `/api/v1`
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .merge(auth::protected_router())
        .merge(articles::protected_router())
        .merge(comments::protected_router())
        .merge(categories::protected_router())
        .merge(tags::protected_router())
        .merge(users::protected_router())
        .merge(roles::protected_router())
        .merge(media::protected_router())
        .merge(notifications::protected_router())
        .merge(newsletter::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(auth::public_router())
        .merge(articles::public_router())
        .merge(comments::public_router())
        .merge(categories::public_router())
        .merge(tags::public_router())
        .merge(newsletter::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
        .merge(protected)
}

/// Complete application router
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let body_limit = usize::try_from(config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new().nest("/api/v1", build_api_router(state.clone()));

    let prefix = config.upload.public_prefix.trim_end_matches('/');
    if prefix.starts_with('/') && prefix.len() > 1 {
        router = router.nest_service(prefix, ServeDir::new(&config.upload.path));
    }

    router
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::report_exceptions,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server.cors_origin))
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

/// `*` allows any origin; otherwise a comma-separated list of origins
fn cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
