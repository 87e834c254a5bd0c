//! Closed dispatch from a routing domain to the capability that serves it.
//!
//! One field per domain instead of an open registry: adding a backend means
//! adding a `Domain` variant, and the compiler then walks you through every
//! match that must learn about it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use switchboard_core::{identity::UserIdentity, Domain, UserId};

use crate::capability::{AgentCapability, AgentError, AgentPayload};

#[derive(Debug)]
pub enum DispatchOutcome {
    Success(AgentPayload),
    Failure(AgentError),
}

#[derive(Debug)]
pub struct DispatchResult {
    pub domain: Domain,
    pub user_id: UserId,
    pub outcome: DispatchOutcome,
}

pub struct AgentDispatch {
    github: Arc<dyn AgentCapability>,
    linear: Arc<dyn AgentCapability>,
    call_timeout: Duration,
}

impl AgentDispatch {
    pub fn new(
        github: Arc<dyn AgentCapability>,
        linear: Arc<dyn AgentCapability>,
        call_timeout: Duration,
    ) -> Self {
        Self { github, linear, call_timeout }
    }

    /// Run `query` against `domain` on behalf of `user`. Credential lookup
    /// and the call timeout are enforced here so capabilities stay free of
    /// identity concerns.
    pub async fn execute(&self, domain: Domain, user: &UserIdentity, query: &str) -> DispatchResult {
        let capability = match domain {
            Domain::GitHub => &self.github,
            Domain::Linear => &self.linear,
        };

        let Some(credential) = user.credential(domain) else {
            warn!(
                event_name = "dispatch.missing_credential",
                domain = domain.label(),
                user_id = %user.id,
            );
            return DispatchResult {
                domain,
                user_id: user.id.clone(),
                outcome: DispatchOutcome::Failure(AgentError::MissingCredential {
                    domain,
                    user: user.display_name.clone(),
                }),
            };
        };

        info!(
            event_name = "dispatch.execute",
            domain = domain.label(),
            user_id = %user.id,
        );

        let outcome =
            match tokio::time::timeout(self.call_timeout, capability.handle(credential, query)).await
            {
                Ok(Ok(payload)) => DispatchOutcome::Success(payload),
                Ok(Err(error)) => DispatchOutcome::Failure(error),
                Err(_) => DispatchOutcome::Failure(AgentError::Timeout {
                    domain,
                    secs: self.call_timeout.as_secs(),
                }),
            };

        DispatchResult { domain, user_id: user.id.clone(), outcome }
    }
}
