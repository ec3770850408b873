use serde::{Deserialize, Serialize};
use tutor_core::logger::LogEntry;
use utoipa::{IntoParams, ToSchema};

/// Service status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StatusResponse {
    /// API version
    pub version: String,

    /// Number of indexed corpus segments
    pub corpus_segments: usize,

    /// Key of the generation session
    pub session_key: String,

    /// Exchanges held by the generation cache
    pub cached_exchanges: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Maximum number of entries, newest last
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryResponse {
    pub entries: Vec<LogEntry>,
}
