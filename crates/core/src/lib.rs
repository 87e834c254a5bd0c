//! Domain core for switchboard: identity registry, user resolution,
//! routing data model, conversation state, and the transport-agnostic
//! response contract.
//!
//! Everything in this crate is deterministic. The nondeterministic pieces
//! (the LLM classifier, the backend API clients) live behind traits in
//! `switchboard-agent` and are injected into the orchestrator.

pub mod config;
pub mod conversation;
pub mod identity;
pub mod resolver;
pub mod response;
pub mod routing;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, RouterProvider};
pub use conversation::{ConversationStore, PendingClarification, CLARIFICATION_RETRY_LIMIT};
pub use identity::{IdentityRegistry, RegistryError, UserId, UserIdentity};
pub use resolver::{resolve, ResolutionResult};
pub use response::{ErrorKind, QueryResponse, OUT_OF_SCOPE_MESSAGE, UNRESOLVED_USER_MESSAGE};
pub use routing::{Domain, RouteDecision, RouteTarget};
