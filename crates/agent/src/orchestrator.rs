//! Turn orchestration: classify, resolve the identity, clarify when needed,
//! dispatch, respond.
//!
//! Each turn runs under its conversation's lock from start to finish, and
//! the pending-clarification slot is written exactly once per turn, after
//! the outcome is fully decided. A turn that is cancelled mid-flight
//! therefore leaves the conversation the way it found it.

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

use switchboard_core::{
    identity::UserIdentity,
    resolve, ConversationStore, Domain, IdentityRegistry, PendingClarification, QueryResponse,
    ResolutionResult, RouteDecision, RouteTarget,
};

use crate::classifier::IntentClassifier;
use crate::dispatch::{AgentDispatch, DispatchOutcome};

type SlotGuard = OwnedMutexGuard<Option<PendingClarification>>;

pub struct Orchestrator {
    registry: Arc<IdentityRegistry>,
    classifier: Arc<dyn IntentClassifier>,
    dispatch: AgentDispatch,
    conversations: ConversationStore,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        classifier: Arc<dyn IntentClassifier>,
        dispatch: AgentDispatch,
    ) -> Self {
        Self { registry, classifier, dispatch, conversations: ConversationStore::new() }
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.tracked_conversations()
    }

    /// Process one message in one conversation. Never returns an `Err`;
    /// every failure mode is a `QueryResponse` variant.
    pub async fn handle_turn(&self, conversation_id: &str, query: &str) -> QueryResponse {
        let query = query.trim();
        if query.is_empty() {
            return QueryResponse::validation_error("query must not be empty");
        }

        let mut slot = self.conversations.acquire(conversation_id).await;
        let response = match slot.take() {
            Some(pending) => {
                self.clarification_turn(&mut slot, conversation_id, pending, query).await
            }
            None => self.fresh_turn(&mut slot, conversation_id, query).await,
        };
        drop(slot);
        // Turns that end without a pending clarification leave no trace.
        self.conversations.release_idle(conversation_id);
        response
    }

    /// A reply while a clarification is pending. The reply is always read as
    /// an identity hint against the stored candidates; even a reply that
    /// looks like a brand-new query does not escape the pending question.
    async fn clarification_turn(
        &self,
        slot: &mut SlotGuard,
        conversation_id: &str,
        mut pending: PendingClarification,
        reply: &str,
    ) -> QueryResponse {
        match resolve(Some(reply), &pending.candidates) {
            ResolutionResult::Resolved(identity) => {
                info!(
                    event_name = "clarification.resolved",
                    conversation_id,
                    user_id = %identity.id,
                );
                // Slot stays empty: the clarification is consumed.
                self.dispatch_and_respond(pending.domain, &identity, &pending.original_query).await
            }
            ResolutionResult::Ambiguous(_) | ResolutionResult::NotFound => {
                if pending.retries_exhausted() {
                    info!(event_name = "clarification.abandoned", conversation_id);
                    QueryResponse::unresolved_user()
                } else {
                    pending.retry_count += 1;
                    let response = QueryResponse::ClarificationNeeded {
                        message: clarification_prompt(pending.domain, &pending.candidates),
                        candidates: display_names(&pending.candidates),
                    };
                    **slot = Some(pending);
                    response
                }
            }
        }
    }

    async fn fresh_turn(
        &self,
        slot: &mut SlotGuard,
        conversation_id: &str,
        query: &str,
    ) -> QueryResponse {
        let decision = match self.classifier.classify(query).await {
            Ok(decision) => decision,
            Err(classify_error) => {
                warn!(
                    event_name = "classifier.failed",
                    conversation_id,
                    error = %classify_error,
                );
                RouteDecision::classifier_fallback()
            }
        };

        info!(
            event_name = "turn.classified",
            conversation_id,
            target = ?decision.target,
            confidence = decision.confidence,
            rationale = %decision.rationale,
        );

        let domain = match decision.target {
            RouteTarget::OutOfScope => return QueryResponse::out_of_scope(),
            RouteTarget::Backend(domain) => domain,
        };

        match resolve(decision.user_hint.as_deref(), self.registry.identities()) {
            ResolutionResult::Resolved(identity) => {
                self.dispatch_and_respond(domain, &identity, query).await
            }
            ResolutionResult::Ambiguous(candidates) => {
                self.begin_clarification(slot, domain, query, candidates)
            }
            ResolutionResult::NotFound => {
                // The hinted name matches nobody; offer everyone we know.
                self.begin_clarification(slot, domain, query, self.registry.identities().to_vec())
            }
        }
    }

    fn begin_clarification(
        &self,
        slot: &mut SlotGuard,
        domain: Domain,
        query: &str,
        candidates: Vec<UserIdentity>,
    ) -> QueryResponse {
        let response = QueryResponse::ClarificationNeeded {
            message: clarification_prompt(domain, &candidates),
            candidates: display_names(&candidates),
        };
        **slot = Some(PendingClarification::new(domain, query, candidates));
        response
    }

    async fn dispatch_and_respond(
        &self,
        domain: Domain,
        identity: &UserIdentity,
        query: &str,
    ) -> QueryResponse {
        let result = self.dispatch.execute(domain, identity, query).await;
        match result.outcome {
            DispatchOutcome::Success(payload) => QueryResponse::Resolved {
                message: format!("{}: {}", identity.display_name, payload.summary),
                data: payload.data,
            },
            DispatchOutcome::Failure(agent_error) => {
                error!(
                    event_name = "dispatch.failed",
                    domain = domain.label(),
                    user_id = %identity.id,
                    error = %agent_error,
                );
                QueryResponse::agent_error(agent_error.to_string())
            }
        }
    }
}

fn display_names(candidates: &[UserIdentity]) -> Vec<String> {
    candidates.iter().map(|candidate| candidate.display_name.clone()).collect()
}

fn clarification_prompt(domain: Domain, candidates: &[UserIdentity]) -> String {
    format!("Whose {} data? {}", domain.label(), name_list(candidates))
}

fn name_list(candidates: &[UserIdentity]) -> String {
    let names: Vec<&str> =
        candidates.iter().map(|candidate| candidate.display_name.as_str()).collect();
    match names.as_slice() {
        [] => String::from("?"),
        [only] => format!("{only}?"),
        [first, second] => format!("{first} or {second}?"),
        [head @ .., last] => format!("{}, or {last}?", head.join(", ")),
    }
}
