use crate::handlers;
use crate::models::{AskRequest, AskResponse, HistoryResponse, StatusResponse};
use crate::server::AppState;
use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tutor_core::Topic;
use tutor_core::logger::LogEntry;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::ask::ask,
        handlers::system::get_status,
        handlers::system::get_history
    ),
    components(schemas(
        AskRequest,
        AskResponse,
        StatusResponse,
        HistoryResponse,
        LogEntry,
        Topic
    ))
)]
pub struct ApiDoc;

/// Create the main API router with state
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_check))
        .route("/ask", post(handlers::ask))
        .nest("/api/v1", api_v1_router())
}

fn api_v1_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/history", get(handlers::get_history))
}

/// Health check endpoint for container health monitoring
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
