use crate::error::AppError;
use crate::models::{AskRequest, AskResponse};
use crate::server::AppState;
use axum::{extract::State, response::Json};

/// Ask the tutor a question
///
/// Classifies the question, retrieves context for on-topic questions and
/// returns the generated answer. A blank question gets a fixed refusal.
#[utoipa::path(
    post,
    path = "/ask",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Answer generated", body = AskResponse),
        (status = 500, description = "Classifier, embedder or generator failure"),
        (status = 504, description = "Generation timed out")
    )
)]
#[axum::debug_handler]
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let answer = state.pipeline.ask(&request.question).await?;
    Ok(Json(AskResponse { answer }))
}
