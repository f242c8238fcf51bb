use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::catalog::CatalogError;

/// Request-level failures. Out-of-domain refusals and blocked queries are
/// NOT errors: refusals are successful responses, blocked queries are
/// recovered inside the planner.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("query field is required")]
    EmptyQuery,
    #[error("resolution failed: {0}")]
    Resolution(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
}

impl AgentError {
    fn status(&self) -> StatusCode {
        match self {
            AgentError::EmptyQuery => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the caller sees. Internal detail stays in the logs.
    fn public_message(&self) -> &'static str {
        match self {
            AgentError::EmptyQuery => "query field is required",
            AgentError::Resolution(_) => {
                "Sorry, something went wrong while processing your request."
            }
            AgentError::Catalog(_) => {
                "The property catalog is temporarily unavailable. Please try again shortly."
            }
            AgentError::Timeout(_) => "The request took too long to process. Please try again.",
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}
