//! Agent runtime: classification, dispatch, and the clarification state
//! machine.
//!
//! This crate is the "brain" of switchboard:
//! - **Classification** (`classifier`, `llm`) - decide which backend domain
//!   a free-text query concerns and extract a user-name hint
//! - **Capabilities** (`capability`) - the GitHub and Linear API clients
//!   behind a uniform `handle(credential, query)` operation
//! - **Dispatch** (`dispatch`) - map a resolved (domain, user) pair to its
//!   capability under an independent timeout
//! - **Orchestration** (`orchestrator`) - the turn-by-turn protocol that
//!   turns noisy classifier output into deterministic control flow
//!
//! # Determinism principle
//!
//! The LLM is strictly a hint source. It never decides who a query is
//! dispatched for: that is the deterministic resolver in
//! `switchboard-core`, and every LLM failure degrades to an out-of-scope
//! answer instead of propagating. `KeywordClassifier` substitutes for the
//! LLM behind the same trait, which is what the state-machine tests run
//! against.

pub mod capability;
pub mod classifier;
pub mod dispatch;
pub mod llm;
pub mod orchestrator;

pub use capability::{AgentCapability, AgentError, AgentPayload, GitHubCapability, LinearCapability};
pub use classifier::{ClassificationError, IntentClassifier, KeywordClassifier};
pub use dispatch::{AgentDispatch, DispatchOutcome, DispatchResult};
pub use llm::{LlmClassifier, LlmSetupError};
pub use orchestrator::Orchestrator;
