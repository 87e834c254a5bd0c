use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use crate::identity::{DomainCredentials, IdentityRegistry, RegistryError, UserId, UserIdentity};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub router: RouterConfig,
    pub agents: AgentsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub users: Vec<UserConfig>,
}

/// Intent-classifier settings. `Keyword` selects the deterministic
/// rule-based classifier and needs no credentials.
#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub provider: RouterProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub api_version: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentsConfig {
    pub github_api_base: String,
    pub linear_api_base: String,
    pub call_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct UserConfig {
    pub id: String,
    pub display_name: String,
    pub aliases: Vec<String>,
    pub github_token: Option<SecretString>,
    pub linear_api_key: Option<SecretString>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterProvider {
    OpenAi,
    Azure,
    Keyword,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub router_provider: Option<RouterProvider>,
    pub router_api_key: Option<String>,
    pub router_model: Option<String>,
    pub log_level: Option<String>,
    pub users: Vec<UserConfig>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig {
                provider: RouterProvider::Keyword,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                api_version: None,
                timeout_secs: 20,
            },
            agents: AgentsConfig {
                github_api_base: "https://api.github.com".to_string(),
                linear_api_base: "https://api.linear.app/graphql".to_string(),
                call_timeout_secs: 30,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            users: Vec::new(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for RouterProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open_ai" | "openai" => Ok(Self::OpenAi),
            "azure" => Ok(Self::Azure),
            "keyword" => Ok(Self::Keyword),
            other => Err(ConfigError::Validation(format!(
                "unsupported router provider `{other}` (expected open_ai|azure|keyword)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("switchboard.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Build the immutable identity registry from the configured user list.
    /// Called once at bootstrap; the registry is injected from there on.
    pub fn identity_registry(&self) -> Result<IdentityRegistry, RegistryError> {
        let identities = self
            .users
            .iter()
            .map(|user| UserIdentity {
                id: UserId(user.id.clone()),
                display_name: user.display_name.clone(),
                aliases: user.aliases.clone(),
                credentials: DomainCredentials {
                    github_token: user.github_token.clone(),
                    linear_api_key: user.linear_api_key.clone(),
                },
            })
            .collect();
        IdentityRegistry::new(identities)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(router) = patch.router {
            if let Some(provider) = router.provider {
                self.router.provider = provider;
            }
            if let Some(router_api_key_value) = router.api_key {
                self.router.api_key = Some(secret_value(router_api_key_value));
            }
            if let Some(base_url) = router.base_url {
                self.router.base_url = Some(base_url);
            }
            if let Some(model) = router.model {
                self.router.model = model;
            }
            if let Some(api_version) = router.api_version {
                self.router.api_version = Some(api_version);
            }
            if let Some(timeout_secs) = router.timeout_secs {
                self.router.timeout_secs = timeout_secs;
            }
        }

        if let Some(agents) = patch.agents {
            if let Some(github_api_base) = agents.github_api_base {
                self.agents.github_api_base = github_api_base;
            }
            if let Some(linear_api_base) = agents.linear_api_base {
                self.agents.linear_api_base = linear_api_base;
            }
            if let Some(call_timeout_secs) = agents.call_timeout_secs {
                self.agents.call_timeout_secs = call_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(users) = patch.users {
            self.users = users
                .into_iter()
                .map(|user| UserConfig {
                    id: user.id,
                    display_name: user.display_name,
                    aliases: user.aliases.unwrap_or_default(),
                    github_token: user.github_token.map(secret_value),
                    linear_api_key: user.linear_api_key.map(secret_value),
                })
                .collect();
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SWITCHBOARD_ROUTER_PROVIDER") {
            self.router.provider = value.parse()?;
        }
        if let Some(value) = read_env("SWITCHBOARD_ROUTER_API_KEY") {
            self.router.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SWITCHBOARD_ROUTER_BASE_URL") {
            self.router.base_url = Some(value);
        }
        if let Some(value) = read_env("SWITCHBOARD_ROUTER_MODEL") {
            self.router.model = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_ROUTER_API_VERSION") {
            self.router.api_version = Some(value);
        }
        if let Some(value) = read_env("SWITCHBOARD_ROUTER_TIMEOUT_SECS") {
            self.router.timeout_secs = parse_u64("SWITCHBOARD_ROUTER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_AGENTS_GITHUB_API_BASE") {
            self.agents.github_api_base = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_AGENTS_LINEAR_API_BASE") {
            self.agents.linear_api_base = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_AGENTS_CALL_TIMEOUT_SECS") {
            self.agents.call_timeout_secs =
                parse_u64("SWITCHBOARD_AGENTS_CALL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_SERVER_PORT") {
            self.server.port = parse_u16("SWITCHBOARD_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_LOGGING_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_LOGGING_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(router_provider) = overrides.router_provider {
            self.router.provider = router_provider;
        }
        if let Some(router_api_key) = overrides.router_api_key {
            self.router.api_key = Some(secret_value(router_api_key));
        }
        if let Some(router_model) = overrides.router_model {
            self.router.model = router_model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if !overrides.users.is_empty() {
            self.users = overrides.users;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_router(&self.router)?;
        validate_agents(&self.agents)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        self.identity_registry()?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("switchboard.toml"), PathBuf::from("config/switchboard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_router(router: &RouterConfig) -> Result<(), ConfigError> {
    if router.timeout_secs == 0 {
        return Err(ConfigError::Validation("router.timeout_secs must be positive".to_string()));
    }

    match router.provider {
        RouterProvider::Keyword => {}
        RouterProvider::OpenAi => {
            if router.api_key.is_none() {
                return Err(ConfigError::Validation(
                    "router.api_key is required for the open_ai provider".to_string(),
                ));
            }
            if router.model.trim().is_empty() {
                return Err(ConfigError::Validation("router.model must not be empty".to_string()));
            }
        }
        RouterProvider::Azure => {
            if router.api_key.is_none() {
                return Err(ConfigError::Validation(
                    "router.api_key is required for the azure provider".to_string(),
                ));
            }
            if router.base_url.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                return Err(ConfigError::Validation(
                    "router.base_url is required for the azure provider".to_string(),
                ));
            }
            if router.model.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "router.model (the azure deployment name) must not be empty".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_agents(agents: &AgentsConfig) -> Result<(), ConfigError> {
    for (key, base) in [
        ("agents.github_api_base", &agents.github_api_base),
        ("agents.linear_api_base", &agents.linear_api_base),
    ] {
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(ConfigError::Validation(format!("{key} must be an http(s) URL")));
        }
    }

    if agents.call_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "agents.call_timeout_secs must be positive".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be non-zero".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    if !LEVELS.contains(&logging.level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::Validation(format!(
            "logging.level must be one of trace|debug|info|warn|error, got `{}`",
            logging.level
        )));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    router: Option<RouterPatch>,
    agents: Option<AgentsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    users: Option<Vec<UserPatch>>,
}

#[derive(Debug, Deserialize)]
struct RouterPatch {
    provider: Option<RouterProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AgentsPatch {
    github_api_base: Option<String>,
    linear_api_base: Option<String>,
    call_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Deserialize)]
struct UserPatch {
    id: String,
    display_name: String,
    aliases: Option<Vec<String>>,
    github_token: Option<String>,
    linear_api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, RouterProvider, UserConfig};

    fn test_user(id: &str, display_name: &str) -> UserConfig {
        UserConfig {
            id: id.to_string(),
            display_name: display_name.to_string(),
            aliases: Vec::new(),
            github_token: Some("ghp-test".to_string().into()),
            linear_api_key: Some("lin-test".to_string().into()),
        }
    }

    fn options_with_users() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                users: vec![test_user("u1", "Alice"), test_user("u2", "Bob")],
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[test]
    fn defaults_use_keyword_router_and_public_api_bases() {
        let config = AppConfig::load(options_with_users()).expect("load should succeed");
        assert_eq!(config.router.provider, RouterProvider::Keyword);
        assert_eq!(config.agents.github_api_base, "https://api.github.com");
        assert_eq!(config.agents.linear_api_base, "https://api.linear.app/graphql");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/switchboard.toml")),
            require_file: true,
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn file_patch_overrides_defaults_and_loads_users() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[router]
provider = "open_ai"
api_key = "sk-test"
model = "gpt-4o"
timeout_secs = 5

[server]
port = 9090

[[users]]
id = "u1"
display_name = "Alice"
aliases = ["asmith"]
github_token = "ghp-alice"

[[users]]
id = "u2"
display_name = "Bob"
linear_api_key = "lin-bob"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect("load should succeed");

        assert_eq!(config.router.provider, RouterProvider::OpenAi);
        assert_eq!(config.router.model, "gpt-4o");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[0].aliases, vec!["asmith"]);
        assert!(config.users[0].github_token.is_some());
        assert!(config.users[0].linear_api_key.is_none());
    }

    #[test]
    fn env_interpolation_expands_into_tokens() {
        std::env::set_var("SWITCHBOARD_TEST_GITHUB_TOKEN", "ghp-from-env");
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[[users]]
id = "u1"
display_name = "Alice"
github_token = "${{SWITCHBOARD_TEST_GITHUB_TOKEN}}"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect("load should succeed");
        std::env::remove_var("SWITCHBOARD_TEST_GITHUB_TOKEN");

        assert!(config.users[0].github_token.is_some());
    }

    #[test]
    fn interpolation_of_unset_variable_fails() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[[users]]
id = "u1"
display_name = "Alice"
github_token = "${{SWITCHBOARD_TEST_UNSET_VARIABLE}}"
"#
        )
        .expect("write config");

        let result = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::MissingEnvInterpolation { .. })));
    }

    #[test]
    fn open_ai_provider_requires_api_key() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                router_provider: Some(RouterProvider::OpenAi),
                users: vec![test_user("u1", "Alice")],
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("validation error").to_string();
        assert!(message.contains("router.api_key"));
    }

    #[test]
    fn configuration_without_users_fails_validation() {
        let result = AppConfig::load(LoadOptions::default());
        assert!(matches!(result, Err(ConfigError::Registry(_))));
    }

    #[test]
    fn duplicate_display_names_fail_validation() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                users: vec![test_user("u1", "Alice"), test_user("u2", "alice")],
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::Registry(_))));
    }

    #[test]
    fn provider_parses_from_env_style_strings() {
        assert_eq!("openai".parse::<RouterProvider>().unwrap(), RouterProvider::OpenAi);
        assert_eq!("azure".parse::<RouterProvider>().unwrap(), RouterProvider::Azure);
        assert_eq!("keyword".parse::<RouterProvider>().unwrap(), RouterProvider::Keyword);
        assert!("langchain".parse::<RouterProvider>().is_err());
    }
}
