//! End-to-end turn protocol tests: keyword classifier, real resolver and
//! conversation store, stub backend capabilities that record what they were
//! asked to do and with whose credential.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use switchboard_agent::{
    AgentCapability, AgentDispatch, AgentError, AgentPayload, ClassificationError,
    IntentClassifier, KeywordClassifier, Orchestrator,
};
use switchboard_core::{
    identity::{DomainCredentials, UserId, UserIdentity},
    Domain, IdentityRegistry, QueryResponse, RouteDecision, OUT_OF_SCOPE_MESSAGE,
};

type CallLog = Arc<Mutex<Vec<(String, String)>>>;

struct RecordingCapability {
    domain: Domain,
    calls: CallLog,
    fail: bool,
}

#[async_trait]
impl AgentCapability for RecordingCapability {
    fn domain(&self) -> Domain {
        self.domain
    }

    async fn handle(
        &self,
        credential: &SecretString,
        query: &str,
    ) -> Result<AgentPayload, AgentError> {
        self.calls
            .lock()
            .unwrap()
            .push((credential.expose_secret().to_string(), query.to_string()));
        if self.fail {
            return Err(AgentError::Api { domain: self.domain, status: 502 });
        }
        Ok(AgentPayload {
            summary: format!("{} result", self.domain.label()),
            data: json!({"domain": self.domain.label(), "query": query}),
        })
    }
}

struct FailingClassifier;

#[async_trait]
impl IntentClassifier for FailingClassifier {
    async fn classify(&self, _query: &str) -> Result<RouteDecision, ClassificationError> {
        Err(ClassificationError::Upstream("connection refused".to_string()))
    }
}

fn registry() -> IdentityRegistry {
    let user = |id: &str, name: &str, aliases: &[&str]| UserIdentity {
        id: UserId(id.to_string()),
        display_name: name.to_string(),
        aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
        credentials: DomainCredentials {
            github_token: Some(SecretString::from(format!("gh-{id}"))),
            linear_api_key: Some(SecretString::from(format!("lin-{id}"))),
        },
    };
    IdentityRegistry::new(vec![user("alice", "Alice", &["asmith"]), user("bob", "Bob", &[])])
        .unwrap()
}

fn orchestrator_with(classifier: Arc<dyn IntentClassifier>, fail_agents: bool) -> (Orchestrator, CallLog) {
    let calls: CallLog = Arc::default();
    let registry = Arc::new(registry());
    let dispatch = AgentDispatch::new(
        Arc::new(RecordingCapability {
            domain: Domain::GitHub,
            calls: Arc::clone(&calls),
            fail: fail_agents,
        }),
        Arc::new(RecordingCapability {
            domain: Domain::Linear,
            calls: Arc::clone(&calls),
            fail: fail_agents,
        }),
        Duration::from_secs(5),
    );
    (Orchestrator::new(registry, classifier, dispatch), calls)
}

fn orchestrator() -> (Orchestrator, CallLog) {
    let classifier = Arc::new(KeywordClassifier::new(&registry()));
    orchestrator_with(classifier, false)
}

#[tokio::test]
async fn ambiguous_query_clarifies_then_dispatches_the_original_query() {
    let (orchestrator, calls) = orchestrator();

    let first = orchestrator.handle_turn("c1", "Show me open pull requests").await;
    match first {
        QueryResponse::ClarificationNeeded { message, candidates } => {
            assert_eq!(message, "Whose GitHub data? Alice or Bob?");
            assert_eq!(candidates, vec!["Alice", "Bob"]);
        }
        other => panic!("expected clarification, got {other:?}"),
    }
    assert!(calls.lock().unwrap().is_empty(), "nothing dispatched before clarification");

    let second = orchestrator.handle_turn("c1", "Alice").await;
    match second {
        QueryResponse::Resolved { message, data } => {
            assert!(message.starts_with("Alice:"));
            assert_eq!(data["query"], "Show me open pull requests");
        }
        other => panic!("expected resolved, got {other:?}"),
    }

    // The original query ran with Alice's GitHub credential, not the reply.
    let recorded = calls.lock().unwrap();
    assert_eq!(recorded.as_slice(), &[("gh-alice".to_string(), "Show me open pull requests".to_string())]);
}

#[tokio::test]
async fn named_user_resolves_in_a_single_turn() {
    let (orchestrator, calls) = orchestrator();

    let response = orchestrator.handle_turn("c1", "Show me Bob's Linear tickets").await;
    assert!(matches!(response, QueryResponse::Resolved { .. }));

    let recorded = calls.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, "lin-bob");
}

#[tokio::test]
async fn alias_resolves_like_the_display_name() {
    let (orchestrator, calls) = orchestrator();

    let response = orchestrator.handle_turn("c1", "list asmith's repositories").await;
    assert!(matches!(response, QueryResponse::Resolved { .. }));
    assert_eq!(calls.lock().unwrap()[0].0, "gh-alice");
}

#[tokio::test]
async fn out_of_scope_query_returns_the_fixed_message() {
    let (orchestrator, calls) = orchestrator();

    let response = orchestrator.handle_turn("c1", "What's the weather today?").await;
    assert_eq!(
        response,
        QueryResponse::OutOfScope { message: OUT_OF_SCOPE_MESSAGE.to_string() }
    );
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn pending_clarification_captures_even_off_topic_replies() {
    let (orchestrator, _calls) = orchestrator();

    orchestrator.handle_turn("c1", "Show me open pull requests").await;

    // A reply that would classify as out-of-scope on its own is still
    // treated as an (unresolvable) identity hint.
    let response = orchestrator.handle_turn("c1", "what's the weather like?").await;
    assert!(
        matches!(response, QueryResponse::ClarificationNeeded { .. }),
        "expected a re-prompt, got {response:?}"
    );
}

#[tokio::test]
async fn retry_bound_abandons_after_one_reprompt_and_resets_the_conversation() {
    let (orchestrator, calls) = orchestrator();

    orchestrator.handle_turn("c1", "Show me open pull requests").await;

    let first_bad = orchestrator.handle_turn("c1", "charlie").await;
    assert!(matches!(first_bad, QueryResponse::ClarificationNeeded { .. }));

    let second_bad = orchestrator.handle_turn("c1", "dana").await;
    assert!(matches!(second_bad, QueryResponse::Unresolved { .. }));
    assert!(calls.lock().unwrap().is_empty());

    // The conversation is idle again: the next turn is a fresh query.
    let fresh = orchestrator.handle_turn("c1", "What's the weather today?").await;
    assert!(matches!(fresh, QueryResponse::OutOfScope { .. }));
}

#[tokio::test]
async fn conversations_do_not_share_clarification_state() {
    let (orchestrator, calls) = orchestrator();

    // Two concurrent ambiguous queries, each opening its own clarification.
    let (c1, c2) = tokio::join!(
        orchestrator.handle_turn("c1", "Show me open pull requests"),
        orchestrator.handle_turn("c2", "Show me starred repositories"),
    );
    assert!(matches!(c1, QueryResponse::ClarificationNeeded { .. }));
    assert!(matches!(c2, QueryResponse::ClarificationNeeded { .. }));

    // Each conversation resolves to a different user and dispatches its own
    // original query with that user's credential.
    let c1_done = orchestrator.handle_turn("c1", "Alice").await;
    let c2_done = orchestrator.handle_turn("c2", "Bob").await;
    assert!(matches!(c1_done, QueryResponse::Resolved { .. }));
    assert!(matches!(c2_done, QueryResponse::Resolved { .. }));

    let recorded = calls.lock().unwrap();
    assert_eq!(
        recorded.as_slice(),
        &[
            ("gh-alice".to_string(), "Show me open pull requests".to_string()),
            ("gh-bob".to_string(), "Show me starred repositories".to_string()),
        ]
    );
}

#[tokio::test]
async fn one_shot_conversations_do_not_accumulate_state() {
    let (orchestrator, _calls) = orchestrator();

    // Requests without a follow-up question leave nothing behind, so ids
    // minted per request (as the HTTP layer does) cannot pile up.
    for i in 0..50 {
        orchestrator.handle_turn(&format!("one-shot-{i}"), "What's the weather today?").await;
    }
    assert_eq!(orchestrator.conversation_count(), 0);

    // A live clarification is tracked until it resolves, then released.
    orchestrator.handle_turn("c1", "Show me open pull requests").await;
    assert_eq!(orchestrator.conversation_count(), 1);
    orchestrator.handle_turn("c1", "Alice").await;
    assert_eq!(orchestrator.conversation_count(), 0);
}

#[tokio::test]
async fn unknown_name_offers_the_full_candidate_list() {
    let (orchestrator, _calls) = orchestrator();

    let response = orchestrator.handle_turn("c1", "Show me Charlie's pull requests").await;
    match response {
        QueryResponse::ClarificationNeeded { candidates, .. } => {
            assert_eq!(candidates, vec!["Alice", "Bob"]);
        }
        other => panic!("expected clarification, got {other:?}"),
    }
}

#[tokio::test]
async fn classifier_failure_degrades_to_out_of_scope() {
    let (orchestrator, calls) = orchestrator_with(Arc::new(FailingClassifier), false);

    let response = orchestrator.handle_turn("c1", "Show me Alice's pull requests").await;
    assert_eq!(
        response,
        QueryResponse::OutOfScope { message: OUT_OF_SCOPE_MESSAGE.to_string() }
    );
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn backend_failure_surfaces_as_an_agent_execution_error() {
    let classifier = Arc::new(KeywordClassifier::new(&registry()));
    let (orchestrator, _calls) = orchestrator_with(classifier, true);

    let response = orchestrator.handle_turn("c1", "Show me Alice's pull requests").await;
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["status"], "error");
    assert_eq!(value["kind"], "agent_execution");
}

#[tokio::test]
async fn blank_query_is_a_validation_error() {
    let (orchestrator, _calls) = orchestrator();

    let response = orchestrator.handle_turn("c1", "   ").await;
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["status"], "error");
    assert_eq!(value["kind"], "validation");
}
