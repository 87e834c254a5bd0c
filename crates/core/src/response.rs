//! The transport-agnostic contract the orchestrator exposes. The server
//! serializes these shapes directly; an external formatter may turn them
//! into prose, so beyond the two fixed strings below the messages here stay
//! short and factual.

use serde::Serialize;
use serde_json::Value;

/// Fixed response for queries outside the GitHub/Linear scope. The exact
/// string is part of the contract.
pub const OUT_OF_SCOPE_MESSAGE: &str = "I cannot answer this question";

/// Graceful fallback once the clarification retry bound is exhausted. Not an
/// error: the conversation simply returns to idle.
pub const UNRESOLVED_USER_MESSAGE: &str =
    "I wasn't able to determine which user you meant. Please ask again and include a name.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AgentExecution,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResponse {
    Resolved { message: String, data: Value },
    ClarificationNeeded { message: String, candidates: Vec<String> },
    OutOfScope { message: String },
    Unresolved { message: String },
    Error { kind: ErrorKind, message: String },
}

impl QueryResponse {
    pub fn out_of_scope() -> Self {
        Self::OutOfScope { message: OUT_OF_SCOPE_MESSAGE.to_string() }
    }

    pub fn unresolved_user() -> Self {
        Self::Unresolved { message: UNRESOLVED_USER_MESSAGE.to_string() }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::Error { kind: ErrorKind::Validation, message: message.into() }
    }

    pub fn agent_error(message: impl Into<String>) -> Self {
        Self::Error { kind: ErrorKind::AgentExecution, message: message.into() }
    }
}
