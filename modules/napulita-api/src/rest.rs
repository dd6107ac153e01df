use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use napulita_common::{Actor, ErrorKind, NapulitaError, ReportId};

use crate::gateway::{
    CleanupRequest, CommentRequest, CreateReportRequest, LeaderboardQuery, QueryGateway,
    RawReportQuery,
};

pub const USER_HEADER: &str = "x-user-id";
pub const MODERATOR_HEADER: &str = "x-moderator";

pub struct AppState {
    pub gateway: QueryGateway,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/api/reports", get(api_reports).post(api_create_report))
        .route("/api/reports/{id}", get(api_report_detail))
        .route("/api/reports/{id}/claim", post(api_claim))
        .route("/api/reports/{id}/release", post(api_release))
        .route("/api/reports/{id}/cleanup", post(api_cleanup))
        .route("/api/reports/{id}/invalidate", post(api_invalidate))
        .route(
            "/api/reports/{id}/comments",
            get(api_comments).post(api_post_comment),
        )
        .route("/api/leaderboard", get(api_leaderboard))
        .with_state(state)
}

// --- Errors ---

/// Structured error body: `{ "error": { "kind", "message" } }`.
pub struct ApiError(pub NapulitaError);

impl From<NapulitaError> for ApiError {
    fn from(e: NapulitaError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(NapulitaError::invalid(rejection.body_text()))
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ResourceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        match kind {
            ErrorKind::Internal => error!(error = %self.0, "Request failed"),
            ErrorKind::ResourceUnavailable => warn!(error = %self.0, "Dependency unavailable"),
            _ => {}
        }
        let message = match kind {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.0.to_string(),
        };
        (
            status_for(kind),
            Json(json!({ "error": { "kind": kind, "message": message } })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// --- Identity ---

/// Caller identity from headers set by the upstream auth proxy.
pub struct Caller(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| NapulitaError::PermissionDenied(format!("missing {USER_HEADER}")))?;
        let user_id = Uuid::parse_str(user_id.trim())
            .map_err(|_| NapulitaError::PermissionDenied(format!("malformed {USER_HEADER}")))?;
        let is_moderator = parts
            .headers
            .get(MODERATOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| matches!(v.trim(), "true" | "1"));

        Ok(Self(Actor {
            user_id,
            is_moderator,
        }))
    }
}

fn report_id(raw: &str) -> ApiResult<ReportId> {
    Ok(raw.parse::<ReportId>()?)
}

// --- Reads ---

async fn api_reports(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RawReportQuery>,
) -> ApiResult<impl IntoResponse> {
    let reports = state.gateway.query_reports(&params).await?;
    Ok(Json(reports))
}

async fn api_report_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = state.gateway.get_report(report_id(&id)?).await?;
    Ok(Json(report))
}

async fn api_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let comments = state.gateway.list_comments(report_id(&id)?).await?;
    Ok(Json(comments))
}

async fn api_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardQuery>,
) -> ApiResult<impl IntoResponse> {
    let entries = state.gateway.leaderboard(&params).await?;
    Ok(Json(entries))
}

// --- Mutations ---

async fn api_create_report(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    body: Result<Json<CreateReportRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let id = state.gateway.create_report(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn api_claim(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let claimed = state.gateway.claim_report(&actor, report_id(&id)?).await?;
    Ok(Json(json!({ "claimed": claimed })))
}

async fn api_release(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.gateway.release_claim(&actor, report_id(&id)?).await?;
    Ok(Json(json!({ "released": true })))
}

async fn api_cleanup(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<CleanupRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let cleaned = state
        .gateway
        .submit_cleanup(&actor, report_id(&id)?, request)
        .await?;
    Ok(Json(json!({ "cleaned": cleaned })))
}

async fn api_invalidate(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let invalidated = state.gateway.mark_invalid(&actor, report_id(&id)?).await?;
    Ok(Json(json!({ "invalidated": invalidated })))
}

async fn api_post_comment(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<CommentRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let comment_id = state
        .gateway
        .post_comment(&actor, report_id(&id)?, request)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": comment_id }))))
}
