//! The classifier boundary and its deterministic substitute.

use async_trait::async_trait;
use thiserror::Error;

use switchboard_core::{Domain, IdentityRegistry, RouteDecision, RouteTarget};

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classifier request failed: {0}")]
    Upstream(String),
    #[error("classifier timed out after {0} seconds")]
    Timeout(u64),
    #[error("classifier returned output that does not fit the routing schema: {0}")]
    Malformed(String),
}

/// Boundary to the (untrusted, possibly failing) intent classifier. The
/// orchestrator treats every error identically: log it and degrade the
/// decision to out-of-scope with zero confidence. No retries are attempted.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> Result<RouteDecision, ClassificationError>;
}

const GITHUB_VOCABULARY: &[&str] = &[
    "github",
    "repository",
    "repositories",
    "repo",
    "repos",
    "pull request",
    "pull requests",
    "pr",
    "prs",
    "commit",
    "commits",
    "branch",
    "branches",
    "star",
    "starred",
    "fork",
    "forks",
    "code review",
    "issue",
    "issues",
];

const LINEAR_VOCABULARY: &[&str] = &[
    "linear",
    "ticket",
    "tickets",
    "sprint",
    "sprints",
    "cycle",
    "cycles",
    "project",
    "projects",
    "team",
    "teams",
    "task",
    "tasks",
    "issue",
    "issues",
];

/// Rule-based classifier behind the same contract as the LLM adapter.
/// Routing is a pure function of the query text and the registry it was
/// built from, which makes the whole turn pipeline reproducible in tests
/// and usable without any model credentials.
pub struct KeywordClassifier {
    /// (lowercased name, owning identity's display name), longest first so
    /// multi-word names win over their own prefixes.
    known_names: Vec<(String, String)>,
}

impl KeywordClassifier {
    pub fn new(registry: &IdentityRegistry) -> Self {
        let mut known_names: Vec<(String, String)> = registry
            .identities()
            .iter()
            .flat_map(|identity| {
                std::iter::once(identity.display_name.as_str())
                    .chain(identity.aliases.iter().map(String::as_str))
                    .map(|name| (name.trim().to_lowercase(), identity.display_name.clone()))
            })
            .filter(|(name, _)| !name.is_empty())
            .collect();
        known_names.sort_by_key(|(name, _)| std::cmp::Reverse(name.len()));
        Self { known_names }
    }

    fn extract_user_hint(&self, normalized_query: &str, tokens: &[String]) -> Option<String> {
        let mut mentioned: Vec<&str> = Vec::new();
        for (name, display_name) in &self.known_names {
            let hit = if name.contains(' ') {
                normalized_query.contains(name.as_str())
            } else {
                tokens.iter().any(|token| token == name)
            };
            if hit && !mentioned.contains(&display_name.as_str()) {
                mentioned.push(display_name);
            }
        }

        // Exactly one identity mentioned is a usable hint; several mentions
        // mean the resolver should ask rather than guess.
        match mentioned.as_slice() {
            [only] => Some((*only).to_string()),
            _ => None,
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, query: &str) -> Result<RouteDecision, ClassificationError> {
        let normalized = query.to_lowercase();
        let tokens = tokenize(&normalized);

        let github_score = vocabulary_score(GITHUB_VOCABULARY, &normalized, &tokens);
        let linear_score = vocabulary_score(LINEAR_VOCABULARY, &normalized, &tokens);
        let user_hint = self.extract_user_hint(&normalized, &tokens);

        let decision = match github_score.cmp(&linear_score) {
            std::cmp::Ordering::Greater => RouteDecision {
                target: RouteTarget::Backend(Domain::GitHub),
                confidence: score_confidence(github_score),
                user_hint,
                rationale: format!("matched {github_score} github term(s)"),
            },
            std::cmp::Ordering::Less => RouteDecision {
                target: RouteTarget::Backend(Domain::Linear),
                confidence: score_confidence(linear_score),
                user_hint,
                rationale: format!("matched {linear_score} linear term(s)"),
            },
            std::cmp::Ordering::Equal => RouteDecision {
                target: RouteTarget::OutOfScope,
                confidence: if github_score == 0 { 0.9 } else { 0.5 },
                user_hint,
                rationale: if github_score == 0 {
                    "no domain vocabulary matched".to_string()
                } else {
                    format!("vocabulary tie at {github_score} term(s); no dominant domain")
                },
            },
        };

        Ok(decision)
    }
}

fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|ch: char| !(ch.is_alphanumeric() || ch == '\''))
        .filter(|token| !token.is_empty())
        .map(|token| token.trim_end_matches("'s").trim_matches('\'').to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn vocabulary_score(vocabulary: &[&str], normalized: &str, tokens: &[String]) -> usize {
    vocabulary
        .iter()
        .filter(|term| {
            if term.contains(' ') {
                normalized.contains(*term)
            } else {
                tokens.iter().any(|token| token == *term)
            }
        })
        .count()
}

fn score_confidence(score: usize) -> f64 {
    (0.6 + 0.1 * score as f64).min(0.95)
}
