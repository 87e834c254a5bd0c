//! LLM-backed classifier adapter.
//!
//! Talks to an OpenAI-compatible (or Azure OpenAI) chat-completions
//! endpoint with temperature 0 and a JSON-object response format, and
//! parses the reply into a `RouteDecision`. One bounded timeout, no
//! retries; every failure mode maps to `ClassificationError` and is
//! absorbed by the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use switchboard_core::{
    config::{RouterConfig, RouterProvider},
    Domain, RouteDecision, RouteTarget,
};

use crate::classifier::{ClassificationError, IntentClassifier};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const AZURE_DEFAULT_API_VERSION: &str = "2024-02-15-preview";

const SYSTEM_PROMPT: &str = r#"You are the routing component of a multi-agent system.

Analyze the user's query and decide which backend should handle it:

1. "github": repositories, pull requests, PRs, commits, branches, stars,
   forks, code reviews, GitHub issues.
2. "linear": Linear issues, tasks, projects, teams, sprints, cycles.
3. "out_of_scope": anything unrelated to GitHub or Linear (weather, general
   chat, and so on).

If the query names a person the request is about, put that name in "user";
otherwise leave it null. "issues" can mean GitHub or Linear issues - use the
surrounding context, and prefer "out_of_scope" only when neither platform
fits at all.

Respond with a single JSON object and nothing else:
{"domain": "github" | "linear" | "out_of_scope",
 "confidence": <number between 0 and 1>,
 "user": <string or null>,
 "reasoning": <short string>}"#;

#[derive(Debug, Error)]
pub enum LlmSetupError {
    #[error("router.api_key is required for provider {0:?}")]
    MissingApiKey(RouterProvider),
    #[error("router.base_url is required for provider {0:?}")]
    MissingBaseUrl(RouterProvider),
    #[error("the keyword provider has no LLM classifier")]
    KeywordProvider,
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub struct LlmClassifier {
    client: reqwest::Client,
    endpoint: String,
    provider: RouterProvider,
    api_key: SecretString,
    model: String,
    timeout_secs: u64,
}

impl LlmClassifier {
    pub fn from_config(config: &RouterConfig) -> Result<Self, LlmSetupError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(LlmSetupError::MissingApiKey(config.provider))?;

        let endpoint = match config.provider {
            RouterProvider::OpenAi => {
                let base = config
                    .base_url
                    .as_deref()
                    .unwrap_or(OPENAI_DEFAULT_BASE_URL)
                    .trim_end_matches('/');
                format!("{base}/chat/completions")
            }
            RouterProvider::Azure => {
                let base = config
                    .base_url
                    .as_deref()
                    .ok_or(LlmSetupError::MissingBaseUrl(config.provider))?
                    .trim_end_matches('/');
                let api_version =
                    config.api_version.as_deref().unwrap_or(AZURE_DEFAULT_API_VERSION);
                format!(
                    "{base}/openai/deployments/{model}/chat/completions?api-version={api_version}",
                    model = config.model
                )
            }
            RouterProvider::Keyword => return Err(LlmSetupError::KeywordProvider),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            provider: config.provider,
            api_key,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(&self, query: &str) -> Result<RouteDecision, ClassificationError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": query},
            ],
        });

        let request = self.client.post(&self.endpoint).json(&body);
        let request = match self.provider {
            RouterProvider::Azure => request.header("api-key", self.api_key.expose_secret()),
            _ => request.bearer_auth(self.api_key.expose_secret()),
        };

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                ClassificationError::Timeout(self.timeout_secs)
            } else {
                ClassificationError::Upstream(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassificationError::Upstream(format!(
                "classifier endpoint returned status {status}"
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|error| ClassificationError::Malformed(error.to_string()))?;
        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| ClassificationError::Malformed("completion had no choices".to_string()))?;

        parse_route_decision(content)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RoutePayload {
    domain: String,
    confidence: f64,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parse the model's JSON reply into a validated `RouteDecision`. Rejects
/// unknown domains and out-of-range confidence instead of guessing.
fn parse_route_decision(raw: &str) -> Result<RouteDecision, ClassificationError> {
    let stripped = strip_code_fences(raw.trim());
    let payload: RoutePayload = serde_json::from_str(stripped)
        .map_err(|error| ClassificationError::Malformed(error.to_string()))?;

    if !(0.0..=1.0).contains(&payload.confidence) {
        return Err(ClassificationError::Malformed(format!(
            "confidence {} is outside [0, 1]",
            payload.confidence
        )));
    }

    let target = match payload.domain.trim().to_lowercase().as_str() {
        "github" => RouteTarget::Backend(Domain::GitHub),
        "linear" => RouteTarget::Backend(Domain::Linear),
        "out_of_scope" => RouteTarget::OutOfScope,
        other => {
            return Err(ClassificationError::Malformed(format!("unknown domain `{other}`")));
        }
    };

    Ok(RouteDecision {
        target,
        confidence: payload.confidence,
        user_hint: payload.user.filter(|user| !user.trim().is_empty()),
        rationale: payload.reasoning.unwrap_or_else(|| "no reasoning supplied".to_string()),
    })
}

/// Models occasionally wrap JSON in a markdown fence despite instructions.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
