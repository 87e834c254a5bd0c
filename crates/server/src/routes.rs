use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use switchboard_agent::Orchestrator;
use switchboard_core::{config::RouterProvider, ErrorKind, QueryResponse};

use crate::bootstrap::Application;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub router_provider: RouterProvider,
    pub user_count: usize,
}

impl AppState {
    pub fn from_application(app: &Application) -> Self {
        Self {
            orchestrator: Arc::clone(&app.orchestrator),
            router_provider: app.config.router.provider,
            user_count: app.registry.len(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/query", post(query)).with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Omitted on the first message; the response echoes the id to continue
    /// the conversation with.
    #[serde(rename = "conversationId", default)]
    pub conversation_id: Option<String>,
    pub query: String,
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> (StatusCode, Json<Value>) {
    let conversation_id =
        request.conversation_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(event_name = "http.query.received", conversation_id = %conversation_id);

    let response = state.orchestrator.handle_turn(&conversation_id, &request.query).await;
    let status = status_code(&response);

    // `QueryResponse` serialization is infallible in practice; if it ever
    // breaks, that is an internal fault, not a backend (`agent_execution`)
    // or caller (`validation`) one, and it maps to a plain 500.
    let mut body = match serde_json::to_value(&response) {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(event_name = "http.response.serialize_failed", error = %error);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "kind": "internal",
                    "message": "response serialization failed",
                    "conversationId": conversation_id,
                })),
            );
        }
    };
    if let Value::Object(map) = &mut body {
        map.insert("conversationId".to_string(), Value::String(conversation_id));
    }

    (status, Json(body))
}

/// Validation problems are the caller's fault; backend execution problems are
/// an upstream failure. Everything else, clarifications included, is a normal
/// conversational answer.
fn status_code(response: &QueryResponse) -> StatusCode {
    match response {
        QueryResponse::Error { kind: ErrorKind::Validation, .. } => StatusCode::BAD_REQUEST,
        QueryResponse::Error { kind: ErrorKind::AgentExecution, .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    }
}
