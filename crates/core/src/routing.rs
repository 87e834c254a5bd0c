use serde::{Deserialize, Serialize};

/// A backend a query can be dispatched to. Adding a backend means adding a
/// variant here and a capability implementation in `switchboard-agent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    GitHub,
    Linear,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::GitHub, Domain::Linear];

    /// Human-facing name, used in clarification prompts and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::Linear => "Linear",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteTarget {
    Backend(Domain),
    OutOfScope,
}

/// One classification outcome. Produced fresh per turn and never stored
/// beyond it; only the rationale ever reaches the logs.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteDecision {
    pub target: RouteTarget,
    pub confidence: f64,
    pub user_hint: Option<String>,
    pub rationale: String,
}

impl RouteDecision {
    /// The decision substituted when the classifier is unreachable or
    /// returns garbage. Keeps upstream unreliability from ever propagating
    /// as a hard failure.
    pub fn classifier_fallback() -> Self {
        Self {
            target: RouteTarget::OutOfScope,
            confidence: 0.0,
            user_hint: None,
            rationale: "classifier unavailable; treating query as out of scope".to_string(),
        }
    }
}
