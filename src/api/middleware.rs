//! API middleware
//!
//! - `require_auth` / `optional_auth`: bearer session tokens
//! - `report_exceptions`: logs failed requests through the [`ExceptionHandler`]

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::errors::{ApiError, ErrorReport, ExceptionHandler, RequestContext};
use crate::api::extract::AuthenticatedUser;
use crate::config::Config;
use crate::services::Services;

/// JSON bodies above this size are not buffered for logging
const MAX_LOGGED_BODY: usize = 2 * 1024 * 1024;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Arc<Config>,
    pub exceptions: Arc<ExceptionHandler>,
}

impl AppState {
    pub fn new(services: Services, config: Config) -> Self {
        let exceptions = ExceptionHandler::new(&config.logging.sensitive_fields);
        Self {
            services,
            config: Arc::new(config),
            exceptions: Arc::new(exceptions),
        }
    }
}

/// Id of the authenticated caller, copied onto the response for logging
#[derive(Debug, Clone, Copy)]
struct ActorId(i64);

/// Token from `Authorization: Bearer <token>`
fn extract_bearer_token(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Reject the request unless it carries a valid session token
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .services
        .users
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    let actor = ActorId(user.id);
    request
        .extensions_mut()
        .insert(AuthenticatedUser { user, token });
    let mut response = next.run(request).await;
    response.extensions_mut().insert(actor);
    Ok(response)
}

/// Attach the caller when a valid token is present; never rejects
pub async fn optional_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(token) = extract_bearer_token(&request) {
        if let Ok(Some(user)) = state.services.users.validate_session(&token).await {
            request
                .extensions_mut()
                .insert(AuthenticatedUser { user, token });
        }
    }
    next.run(request).await
}

/// Log every failed response with its (redacted) request context
pub async fn report_exceptions(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(q)| serde_json::to_value(q).unwrap_or_default())
        .unwrap_or_default();

    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    let (request, body) = if is_json {
        let (parts, body) = request.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_LOGGED_BODY).await {
            Ok(bytes) => bytes,
            Err(_) => return ApiError::validation("Request body is too large").into_response(),
        };
        let logged = serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null);
        (Request::from_parts(parts, Body::from(bytes)), logged)
    } else {
        (request, Value::Null)
    };

    let response = next.run(request).await;

    if let Some(report) = response.extensions().get::<ErrorReport>() {
        let context = RequestContext {
            method,
            path,
            query,
            body,
            user_id: response.extensions().get::<ActorId>().map(|a| a.0),
        };
        state.exceptions.report(report, &context);
    }
    response
}
