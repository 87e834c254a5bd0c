//! Backend capabilities: the concrete GitHub and Linear clients behind a
//! uniform `handle(credential, query)` operation.
//!
//! Query-to-action mapping is deterministic keyword matching; the
//! interesting nondeterminism (which user, which domain) has already been
//! settled by the time a capability runs.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

use switchboard_core::Domain;

/// What a capability hands back: a short factual summary plus the
/// structured payload an external formatter can render.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentPayload {
    pub summary: String,
    pub data: Value,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{} credential is not configured for {user}", .domain.label())]
    MissingCredential { domain: Domain, user: String },
    #[error("{} request failed: {source}", .domain.label())]
    Transport {
        domain: Domain,
        #[source]
        source: reqwest::Error,
    },
    #[error("{} API returned status {status}", .domain.label())]
    Api { domain: Domain, status: u16 },
    #[error("{} API returned an unexpected payload: {detail}", .domain.label())]
    Malformed { domain: Domain, detail: String },
    #[error("{} call timed out after {secs} seconds", .domain.label())]
    Timeout { domain: Domain, secs: u64 },
}

/// Uniform operation every backend exposes. Implementations hold no state
/// across calls; the credential arrives per call from the resolved
/// identity.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    fn domain(&self) -> Domain;

    async fn handle(&self, credential: &SecretString, query: &str)
        -> Result<AgentPayload, AgentError>;
}

// ---------------------------------------------------------------------------
// GitHub (REST v3)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GitHubAction {
    PullRequests,
    Repositories,
    Issues,
    Starred,
}

fn github_action(normalized_query: &str) -> GitHubAction {
    if normalized_query.contains("pull request") || normalized_query.contains(" pr") {
        GitHubAction::PullRequests
    } else if normalized_query.contains("repositor") || normalized_query.contains("repo") {
        GitHubAction::Repositories
    } else if normalized_query.contains("issue") {
        GitHubAction::Issues
    } else if normalized_query.contains("star") {
        GitHubAction::Starred
    } else {
        GitHubAction::Repositories
    }
}

/// open/closed/all extraction shared by the PR and issue paths.
fn issue_state(normalized_query: &str) -> &'static str {
    if normalized_query.contains("closed") {
        "closed"
    } else if normalized_query.contains("all") {
        "all"
    } else {
        "open"
    }
}

pub struct GitHubCapability {
    client: reqwest::Client,
    api_base: String,
}

impl GitHubCapability {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self { client, api_base: api_base.into() }
    }

    async fn get_json(
        &self,
        credential: &SecretString,
        url: String,
        query: &[(&str, &str)],
    ) -> Result<Value, AgentError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(credential.expose_secret())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, "switchboard")
            .send()
            .await
            .map_err(|source| AgentError::Transport { domain: Domain::GitHub, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Api { domain: Domain::GitHub, status: status.as_u16() });
        }

        response
            .json()
            .await
            .map_err(|source| AgentError::Transport { domain: Domain::GitHub, source })
    }
}

#[async_trait]
impl AgentCapability for GitHubCapability {
    fn domain(&self) -> Domain {
        Domain::GitHub
    }

    async fn handle(
        &self,
        credential: &SecretString,
        query: &str,
    ) -> Result<AgentPayload, AgentError> {
        let normalized = query.to_lowercase();

        match github_action(&normalized) {
            GitHubAction::PullRequests => {
                let state = issue_state(&normalized);
                let q = format!("type:pr author:@me state:{state}");
                let body = self
                    .get_json(
                        credential,
                        format!("{}/search/issues", self.api_base),
                        &[("q", q.as_str()), ("sort", "created"), ("order", "desc"), ("per_page", "10")],
                    )
                    .await?;
                shape_search_results(&body, "pull_requests", state)
            }
            GitHubAction::Issues => {
                let state = issue_state(&normalized);
                let q = format!("type:issue involves:@me state:{state}");
                let body = self
                    .get_json(
                        credential,
                        format!("{}/search/issues", self.api_base),
                        &[("q", q.as_str()), ("sort", "created"), ("order", "desc"), ("per_page", "10")],
                    )
                    .await?;
                shape_search_results(&body, "issues", state)
            }
            GitHubAction::Repositories => {
                let body = self
                    .get_json(
                        credential,
                        format!("{}/user/repos", self.api_base),
                        &[("sort", "updated"), ("per_page", "20")],
                    )
                    .await?;
                shape_repositories(&body)
            }
            GitHubAction::Starred => {
                let body = self
                    .get_json(
                        credential,
                        format!("{}/user/starred", self.api_base),
                        &[("per_page", "20")],
                    )
                    .await?;
                shape_starred(&body)
            }
        }
    }
}

fn shape_search_results(body: &Value, kind: &str, state: &str) -> Result<AgentPayload, AgentError> {
    let items = body["items"].as_array().ok_or_else(|| AgentError::Malformed {
        domain: Domain::GitHub,
        detail: "search response has no items array".to_string(),
    })?;

    let shaped: Vec<Value> = items
        .iter()
        .map(|item| {
            let repository = item["repository_url"]
                .as_str()
                .and_then(|url| url.rsplit('/').next())
                .unwrap_or("unknown");
            json!({
                "number": item["number"],
                "title": item["title"],
                "repository": repository,
            })
        })
        .collect();

    let noun = if kind == "pull_requests" { "pull request(s)" } else { "issue(s)" };
    Ok(AgentPayload {
        summary: format!("{} {state} {noun}", shaped.len()),
        data: json!({ "kind": kind, "state": state, "count": shaped.len(), "items": shaped }),
    })
}

fn shape_repositories(body: &Value) -> Result<AgentPayload, AgentError> {
    let repos = body.as_array().ok_or_else(|| AgentError::Malformed {
        domain: Domain::GitHub,
        detail: "repository response is not an array".to_string(),
    })?;

    let shaped: Vec<Value> = repos
        .iter()
        .map(|repo| {
            json!({
                "name": repo["name"],
                "description": repo["description"],
                "stars": repo["stargazers_count"],
            })
        })
        .collect();

    Ok(AgentPayload {
        summary: format!("{} repositor{}", shaped.len(), if shaped.len() == 1 { "y" } else { "ies" }),
        data: json!({ "kind": "repositories", "count": shaped.len(), "items": shaped }),
    })
}

fn shape_starred(body: &Value) -> Result<AgentPayload, AgentError> {
    let repos = body.as_array().ok_or_else(|| AgentError::Malformed {
        domain: Domain::GitHub,
        detail: "starred response is not an array".to_string(),
    })?;

    let shaped: Vec<Value> = repos
        .iter()
        .map(|repo| json!({ "full_name": repo["full_name"], "stars": repo["stargazers_count"] }))
        .collect();

    Ok(AgentPayload {
        summary: format!("{} starred repositor{}", shaped.len(), if shaped.len() == 1 { "y" } else { "ies" }),
        data: json!({ "kind": "starred", "count": shaped.len(), "items": shaped }),
    })
}

// ---------------------------------------------------------------------------
// Linear (GraphQL)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinearAction {
    Issues,
    Projects,
    Teams,
}

fn linear_action(normalized_query: &str) -> LinearAction {
    if normalized_query.contains("project") {
        LinearAction::Projects
    } else if normalized_query.contains("team") {
        LinearAction::Teams
    } else {
        // Issue queries and everything else default to assigned issues.
        LinearAction::Issues
    }
}

/// Workflow-state filter extracted from the query text, if any.
fn linear_state_filter(normalized_query: &str) -> Option<&'static str> {
    if normalized_query.contains("progress") {
        Some("started")
    } else if normalized_query.contains("todo") || normalized_query.contains("to do") {
        Some("unstarted")
    } else if normalized_query.contains("done") || normalized_query.contains("completed") {
        Some("completed")
    } else {
        None
    }
}

fn wants_high_priority(normalized_query: &str) -> bool {
    normalized_query.contains("urgent") || normalized_query.contains("high priority")
}

const ISSUES_QUERY: &str = r#"
query AssignedIssues {
  viewer {
    displayName
    assignedIssues(first: 50) {
      nodes {
        identifier
        title
        priority
        state { name type }
        team { name }
      }
    }
  }
}"#;

const PROJECTS_QUERY: &str = r#"
query Projects {
  projects(first: 20) {
    nodes { name description state progress }
  }
}"#;

const TEAMS_QUERY: &str = r#"
query Teams {
  teams(first: 20) {
    nodes { name key description private }
  }
}"#;

pub struct LinearCapability {
    client: reqwest::Client,
    api_base: String,
}

impl LinearCapability {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self { client, api_base: api_base.into() }
    }

    async fn execute_graphql(
        &self,
        credential: &SecretString,
        graphql: &str,
    ) -> Result<Value, AgentError> {
        let response = self
            .client
            .post(&self.api_base)
            .header(reqwest::header::AUTHORIZATION, credential.expose_secret())
            .json(&json!({ "query": graphql }))
            .send()
            .await
            .map_err(|source| AgentError::Transport { domain: Domain::Linear, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Api { domain: Domain::Linear, status: status.as_u16() });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|source| AgentError::Transport { domain: Domain::Linear, source })?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(AgentError::Malformed {
                    domain: Domain::Linear,
                    detail: format!("graphql errors: {errors:?}"),
                });
            }
        }

        Ok(body["data"].clone())
    }
}

#[async_trait]
impl AgentCapability for LinearCapability {
    fn domain(&self) -> Domain {
        Domain::Linear
    }

    async fn handle(
        &self,
        credential: &SecretString,
        query: &str,
    ) -> Result<AgentPayload, AgentError> {
        let normalized = query.to_lowercase();

        match linear_action(&normalized) {
            LinearAction::Issues => {
                let data = self.execute_graphql(credential, ISSUES_QUERY).await?;
                shape_linear_issues(
                    &data,
                    linear_state_filter(&normalized),
                    wants_high_priority(&normalized),
                )
            }
            LinearAction::Projects => {
                let data = self.execute_graphql(credential, PROJECTS_QUERY).await?;
                shape_linear_nodes(&data, "projects", &["projects", "nodes"])
            }
            LinearAction::Teams => {
                let data = self.execute_graphql(credential, TEAMS_QUERY).await?;
                shape_linear_nodes(&data, "teams", &["teams", "nodes"])
            }
        }
    }
}

fn shape_linear_issues(
    data: &Value,
    state_filter: Option<&'static str>,
    high_priority_only: bool,
) -> Result<AgentPayload, AgentError> {
    let nodes = data["viewer"]["assignedIssues"]["nodes"].as_array().ok_or_else(|| {
        AgentError::Malformed {
            domain: Domain::Linear,
            detail: "issues response has no nodes array".to_string(),
        }
    })?;

    let shaped: Vec<Value> = nodes
        .iter()
        .filter(|node| match state_filter {
            Some(state_type) => node["state"]["type"].as_str() == Some(state_type),
            None => true,
        })
        .filter(|node| {
            !high_priority_only || node["priority"].as_u64().unwrap_or(0) >= 1
        })
        .map(|node| {
            json!({
                "identifier": node["identifier"],
                "title": node["title"],
                "state": node["state"]["name"],
                "team": node["team"]["name"],
                "priority": node["priority"],
            })
        })
        .collect();

    let state_desc = match state_filter {
        Some("started") => " in progress",
        Some("unstarted") => " todo",
        Some("completed") => " completed",
        _ => " assigned",
    };
    let priority_desc = if high_priority_only { " high priority" } else { "" };

    Ok(AgentPayload {
        summary: format!("{}{priority_desc}{state_desc} issue(s)", shaped.len()),
        data: json!({
            "kind": "issues",
            "state": state_filter,
            "count": shaped.len(),
            "items": shaped,
        }),
    })
}

fn shape_linear_nodes(data: &Value, kind: &str, path: &[&str]) -> Result<AgentPayload, AgentError> {
    let mut cursor = data;
    for segment in path {
        cursor = &cursor[*segment];
    }
    let nodes = cursor.as_array().ok_or_else(|| AgentError::Malformed {
        domain: Domain::Linear,
        detail: format!("{kind} response has no nodes array"),
    })?;

    Ok(AgentPayload {
        summary: format!("{} {kind}", nodes.len()),
        data: json!({ "kind": kind, "count": nodes.len(), "items": nodes }),
    })
}
