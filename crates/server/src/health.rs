use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use switchboard_core::config::RouterProvider;

use crate::routes::AppState;

#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub router_provider: &'static str,
    pub llm_enabled: bool,
    pub user_count: usize,
    pub tracked_conversations: usize,
    pub checked_at: String,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        service: "switchboard-server",
        router_provider: provider_name(state.router_provider),
        llm_enabled: !matches!(state.router_provider, RouterProvider::Keyword),
        user_count: state.user_count,
        tracked_conversations: state.orchestrator.conversation_count(),
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}

fn provider_name(provider: RouterProvider) -> &'static str {
    match provider {
        RouterProvider::OpenAi => "openai",
        RouterProvider::Azure => "azure",
        RouterProvider::Keyword => "keyword",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{extract::State, http::StatusCode, Json};
    use switchboard_agent::{
        AgentDispatch, GitHubCapability, KeywordClassifier, LinearCapability, Orchestrator,
    };
    use switchboard_core::{
        config::RouterProvider,
        identity::{DomainCredentials, UserId, UserIdentity},
        IdentityRegistry,
    };

    use crate::health::health;
    use crate::routes::AppState;

    #[tokio::test]
    async fn health_reports_ready_with_registry_and_provider_facts() {
        let registry = Arc::new(
            IdentityRegistry::new(vec![UserIdentity {
                id: UserId("u1".to_string()),
                display_name: "Alice".to_string(),
                aliases: Vec::new(),
                credentials: DomainCredentials::default(),
            }])
            .unwrap(),
        );
        let classifier = Arc::new(KeywordClassifier::new(&registry));
        let client = reqwest::Client::new();
        let dispatch = AgentDispatch::new(
            Arc::new(GitHubCapability::new(client.clone(), "http://127.0.0.1:9")),
            Arc::new(LinearCapability::new(client, "http://127.0.0.1:9")),
            Duration::from_secs(1),
        );
        let state = AppState {
            orchestrator: Arc::new(Orchestrator::new(registry, classifier, dispatch)),
            router_provider: RouterProvider::Keyword,
            user_count: 1,
        };

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.router_provider, "keyword");
        assert!(!payload.llm_enabled);
        assert_eq!(payload.user_count, 1);
        assert_eq!(payload.tracked_conversations, 0);
    }
}
