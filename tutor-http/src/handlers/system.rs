use crate::error::AppError;
use crate::models::{HistoryQuery, HistoryResponse, StatusResponse};
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    response::Json,
};

const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Get service status
#[utoipa::path(
    get,
    path = "/api/v1/status",
    responses(
        (status = 200, description = "Service status", body = StatusResponse)
    )
)]
#[axum::debug_handler]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let session = state.pipeline.session();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        corpus_segments: state.pipeline.index().len(),
        session_key: session.key().to_string(),
        cached_exchanges: session.exchange_count().await,
    })
}

/// Get recent conversation log entries
#[utoipa::path(
    get,
    path = "/api/v1/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Most recent exchanges, newest last", body = HistoryResponse),
        (status = 500, description = "Log could not be read")
    )
)]
#[axum::debug_handler]
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let entries = state.pipeline.logger().recent(limit).await?;
    Ok(Json(HistoryResponse { entries }))
}
