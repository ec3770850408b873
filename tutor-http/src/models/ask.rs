use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Question sent to the tutor
#[derive(Debug, Clone, Serialize, Deserialize, Default, ToSchema)]
pub struct AskRequest {
    /// The student's question; missing is treated as empty
    #[serde(default)]
    pub question: String,
}

/// The tutor's answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct AskResponse {
    pub answer: String,
}
