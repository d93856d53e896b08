//! HTTP routes mapping requests onto the event pipeline and auth service.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::auth::service::{Session, StaticTokenRequest, TOKEN_ADMIN_SCOPE, TouchStatus};
use crate::auth::{AuthError, AuthService, Endpoint, Principal};
use crate::eventsub::types::{
    HEADER_MESSAGE_ID, HEADER_MESSAGE_RETRY, HEADER_MESSAGE_SIGNATURE, HEADER_MESSAGE_TIMESTAMP,
    HEADER_MESSAGE_TYPE,
};
use crate::pipeline::{EventPipeline, WebhookRequest};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: EventPipeline,
    pub auth: Arc<AuthService>,
}

/// Errors surfaced by the JSON endpoints.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    NotFound,
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Auth(AuthError::Unauthenticated) => {
                (StatusCode::UNAUTHORIZED, "unauthenticated".to_string())
            }
            Self::Auth(AuthError::Forbidden) => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            Self::Auth(AuthError::BadRequest(reason)) => (StatusCode::BAD_REQUEST, reason),
            Self::Auth(AuthError::Internal(reason)) => {
                error!(error = %reason, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    header_str(headers, name).unwrap_or_default().to_string()
}

async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    endpoint: Endpoint,
    scope: Option<&str>,
) -> Result<Principal, ApiError> {
    Ok(state
        .auth
        .gate()
        .authorize(header_str(headers, header::AUTHORIZATION.as_str()), endpoint, scope)
        .await?)
}

/// JSON body plus the refresh cookie.
fn session_response(session: Session, status: StatusCode) -> Response {
    (
        status,
        [(header::SET_COOKIE, session.refresh_cookie)],
        Json(json!({
            "user_id": session.subject_id,
            "access": session.access.token,
            "expires_at": session.access.expires_at,
        })),
    )
        .into_response()
}

/// `POST /webhook`
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = WebhookRequest {
        message_id: header_string(&headers, HEADER_MESSAGE_ID),
        timestamp: header_string(&headers, HEADER_MESSAGE_TIMESTAMP),
        signature: header_string(&headers, HEADER_MESSAGE_SIGNATURE),
        message_type: header_string(&headers, HEADER_MESSAGE_TYPE),
        retry: header_string(&headers, HEADER_MESSAGE_RETRY),
        body: body.to_vec(),
    };

    let response = state.pipeline.handle(request).await;
    match response.content_type {
        Some(content_type) => (
            response.status,
            [(header::CONTENT_TYPE, content_type)],
            response.body,
        )
            .into_response(),
        None => response.status.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub code: String,
}

/// `POST /auth/validate`
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ValidateRequest>,
) -> Result<Response, ApiError> {
    let referer = header_str(&headers, header::REFERER.as_str());
    let session = state.auth.validate(&request.code, referer).await?;
    Ok(session_response(session, StatusCode::OK))
}

/// `POST /auth/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let cookies = header_str(&headers, header::COOKIE.as_str());
    let session = state.auth.refresh(cookies).await?;
    Ok(session_response(session, StatusCode::OK))
}

/// `POST /auth/logout`
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let cookies = header_str(&headers, header::COOKIE.as_str());
    let cleared = state.auth.logout(cookies).await?;
    Ok((
        [(header::SET_COOKIE, cleared)],
        Json(json!({ "status": "logged out" })),
    )
        .into_response())
}

/// `GET /auth/touch`
///
/// Any authentication failure reads as an expired session.
pub async fn touch(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let principal = match authorize(&state, &headers, Endpoint::Standard, None).await {
        Ok(principal) => principal,
        Err(ApiError::Auth(AuthError::Unauthenticated | AuthError::Forbidden)) => {
            return Ok((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": "expired" })),
            )
                .into_response());
        }
        Err(e) => return Err(e),
    };

    let status = state.auth.touch(&principal).await?;
    let code = match status {
        TouchStatus::Ok => StatusCode::OK,
        TouchStatus::LoggedOut => StatusCode::UNAUTHORIZED,
    };
    Ok((
        code,
        Json(json!({ "user_id": principal.subject_id, "status": status })),
    )
        .into_response())
}

/// `GET /auth/self`
pub async fn whoami(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let principal = authorize(&state, &headers, Endpoint::Standard, None).await?;
    Ok(Json(state.auth.whoami(&principal)).into_response())
}

/// `POST /admin/token`
pub async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StaticTokenRequest>,
) -> Result<Response, ApiError> {
    let principal = authorize(
        &state,
        &headers,
        Endpoint::TokenManagement,
        Some(TOKEN_ADMIN_SCOPE),
    )
    .await?;
    let issued = state.auth.issue_static_token(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(issued)).into_response())
}

/// `DELETE /admin/token/{id}`
pub async fn revoke_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let principal = authorize(
        &state,
        &headers,
        Endpoint::TokenManagement,
        Some(TOKEN_ADMIN_SCOPE),
    )
    .await?;
    if state.auth.revoke_static_token(&principal, &token_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// CORS for browser clients that send the refresh cookie.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}

/// Build the application router.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/webhook", post(webhook))
        .route("/auth/validate", post(validate))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/touch", get(touch))
        .route("/auth/self", get(whoami))
        .route("/admin/token", post(issue_token))
        .route("/admin/token/{id}", delete(revoke_token))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match cors_layer(cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}
