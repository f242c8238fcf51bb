use std::time::{Duration, Instant};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AgentError;
use crate::model::ConversationTurn;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: Option<String>,
    /// Prior turns, oldest first. The front-end owns persistence; the
    /// service only reads the slice it is handed.
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// Opaque client-supplied id, used for log correlation only.
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub response: String,
    /// The exact catalog query used, exposed verbatim for transparency.
    pub sql: Option<String>,
    pub elapsed_seconds: f64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_connected: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
}

async fn query_handler(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AgentError> {
    let start = Instant::now();

    let query = req.query.as_deref().unwrap_or("").trim().to_string();
    if query.is_empty() {
        return Err(AgentError::EmptyQuery);
    }

    let request_id = Uuid::new_v4();
    let session = req.session_id.as_deref().unwrap_or("-");
    tracing::info!("[{}] query received (session {}): {}", request_id, session, query);

    let budget = Duration::from_secs(state.config.request_timeout_secs);
    let resolution = match tokio::time::timeout(
        budget,
        state.executor.resolve(&query, &req.history),
    )
    .await
    {
        Ok(Ok(resolution)) => resolution,
        Ok(Err(e)) => {
            tracing::error!(
                "[{}] failed after {:.2}s: {} (text: {})",
                request_id,
                start.elapsed().as_secs_f64(),
                e,
                query
            );
            return Err(e);
        }
        Err(_) => {
            tracing::error!(
                "[{}] timed out after {}s (text: {})",
                request_id,
                state.config.request_timeout_secs,
                query
            );
            return Err(AgentError::Timeout(state.config.request_timeout_secs));
        }
    };

    let elapsed = start.elapsed().as_secs_f64();
    tracing::info!(
        "[{}] processed in {:.2}s | {} planner steps | sql: {:?}",
        request_id,
        elapsed,
        resolution.steps.len(),
        resolution.sql
    );

    Ok(Json(QueryResponse {
        response: resolution.response,
        sql: resolution.sql,
        elapsed_seconds: (elapsed * 100.0).round() / 100.0,
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_connected = state.catalog.ping().await;
    Json(HealthResponse {
        status: "healthy",
        db_connected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_history_defaults_to_empty() {
        let req: QueryRequest = serde_json::from_str(r#"{"query": "villas in JVC"}"#).unwrap();
        assert_eq!(req.query.as_deref(), Some("villas in JVC"));
        assert!(req.history.is_empty());
        assert!(req.session_id.is_none());
    }

    #[test]
    fn response_serializes_null_sql_for_refusals() {
        let resp = QueryResponse {
            response: "Sorry, I can only help with Dubai real estate property searches."
                .to_string(),
            sql: None,
            elapsed_seconds: 0.02,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value["sql"].is_null());
        assert_eq!(value["elapsed_seconds"], 0.02);
    }
}
