use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use switchboard_agent::{
    AgentDispatch, GitHubCapability, IntentClassifier, KeywordClassifier, LinearCapability,
    LlmClassifier, LlmSetupError, Orchestrator,
};
use switchboard_core::{
    config::{AppConfig, ConfigError, LoadOptions, RouterProvider},
    IdentityRegistry,
};

pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<IdentityRegistry>,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("classifier setup failed: {0}")]
    Classifier(#[from] LlmSetupError),
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Wire the registry, classifier, capabilities, and orchestrator from an
/// already-loaded config.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let registry = Arc::new(config.identity_registry().map_err(ConfigError::from)?);
    info!(
        event_name = "system.bootstrap.registry_built",
        user_count = registry.len(),
        "identity registry built"
    );

    let classifier: Arc<dyn IntentClassifier> = match config.router.provider {
        RouterProvider::Keyword => Arc::new(KeywordClassifier::new(&registry)),
        RouterProvider::OpenAi | RouterProvider::Azure => {
            Arc::new(LlmClassifier::from_config(&config.router)?)
        }
    };
    info!(
        event_name = "system.bootstrap.classifier_ready",
        provider = ?config.router.provider,
        "intent classifier ready"
    );

    let call_timeout = Duration::from_secs(config.agents.call_timeout_secs);
    let http_client = reqwest::Client::builder()
        .timeout(call_timeout)
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let dispatch = AgentDispatch::new(
        Arc::new(GitHubCapability::new(http_client.clone(), config.agents.github_api_base.clone())),
        Arc::new(LinearCapability::new(http_client, config.agents.linear_api_base.clone())),
        call_timeout,
    );

    let orchestrator =
        Arc::new(Orchestrator::new(Arc::clone(&registry), classifier, dispatch));

    Ok(Application { config, registry, orchestrator })
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use switchboard_core::config::{ConfigOverrides, LoadOptions, RouterProvider, UserConfig};

    use crate::bootstrap::bootstrap;

    fn user(id: &str, display_name: &str) -> UserConfig {
        UserConfig {
            id: id.to_string(),
            display_name: display_name.to_string(),
            aliases: Vec::new(),
            github_token: Some(SecretString::from("ghp-test")),
            linear_api_key: None,
        }
    }

    #[tokio::test]
    async fn bootstrap_succeeds_with_keyword_provider_and_users() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                users: vec![user("u1", "Alice"), user("u2", "Bob")],
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("keyword provider needs no credentials");

        assert_eq!(app.registry.len(), 2);
        assert_eq!(app.config.router.provider, RouterProvider::Keyword);
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_openai_has_no_api_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                router_provider: Some(RouterProvider::OpenAi),
                users: vec![user("u1", "Alice")],
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("api_key"), "unexpected message: {message}");
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_configured_users() {
        let result = bootstrap(LoadOptions::default()).await;
        assert!(result.is_err());
    }
}
