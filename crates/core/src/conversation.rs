//! Per-conversation clarification state.
//!
//! The only mutable state that outlives a single request. Each conversation
//! id owns one slot holding at most one `PendingClarification`; the slot is
//! guarded by its own async mutex so concurrent turns on the same
//! conversation serialize while other conversations proceed untouched.
//! Nothing here is persisted, and a slot lives only while a clarification is
//! pending: callers release idle slots after each turn so one-shot
//! conversation ids never accumulate in the map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::identity::UserIdentity;
use crate::routing::Domain;

/// A clarification that has been re-asked this many times is abandoned and
/// the conversation returns to idle.
pub const CLARIFICATION_RETRY_LIMIT: u8 = 1;

/// The question we are waiting on: which of `candidates` the original query
/// was about. Created only from an ambiguous or not-found resolution;
/// destroyed on resolution or when the retry bound is exceeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingClarification {
    pub domain: Domain,
    pub original_query: String,
    pub candidates: Vec<UserIdentity>,
    pub retry_count: u8,
}

impl PendingClarification {
    pub fn new(domain: Domain, original_query: &str, candidates: Vec<UserIdentity>) -> Self {
        Self { domain, original_query: original_query.to_string(), candidates, retry_count: 0 }
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= CLARIFICATION_RETRY_LIMIT
    }
}

type Slot = Arc<AsyncMutex<Option<PendingClarification>>>;

/// Keyed store of conversation slots. The outer map lock is held only long
/// enough to clone the slot handle; the per-conversation lock is held for
/// the duration of a turn.
#[derive(Default)]
pub struct ConversationStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access to one conversation's pending state. Callers
    /// must write the slot only after the full turn decision is computed, so
    /// a cancelled turn never leaves half-updated state behind.
    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<Option<PendingClarification>> {
        let slot = {
            let mut slots = self.slots.lock().expect("conversation map lock poisoned");
            slots.entry(conversation_id.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Drop the map entry for `conversation_id` if its slot is idle: no
    /// pending clarification stored, no guard held, and no turn waiting on
    /// it. Called after every turn; a no-op while a clarification is live,
    /// so one-shot conversations leave nothing behind.
    pub fn release_idle(&self, conversation_id: &str) {
        let mut slots = self.slots.lock().expect("conversation map lock poisoned");
        let Some(slot) = slots.get(conversation_id) else {
            return;
        };

        // Guards and waiters each hold a clone of the slot handle; a lone
        // strong count means the map is the only owner. The map lock is held
        // here, so no new clone can appear under us.
        if Arc::strong_count(slot) > 1 {
            return;
        }
        let idle = match slot.try_lock() {
            Ok(state) => state.is_none(),
            Err(_) => false,
        };
        if idle {
            slots.remove(conversation_id);
        }
    }

    /// Number of conversation ids currently tracked (clarifications pending
    /// or turns in flight).
    pub fn tracked_conversations(&self) -> usize {
        self.slots.lock().expect("conversation map lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{ConversationStore, PendingClarification, CLARIFICATION_RETRY_LIMIT};
    use crate::identity::{DomainCredentials, UserId, UserIdentity};
    use crate::routing::Domain;

    fn pending() -> PendingClarification {
        PendingClarification::new(
            Domain::GitHub,
            "show me open pull requests",
            vec![UserIdentity {
                id: UserId("u1".to_string()),
                display_name: "Alice".to_string(),
                aliases: Vec::new(),
                credentials: DomainCredentials::default(),
            }],
        )
    }

    #[tokio::test]
    async fn slots_are_isolated_per_conversation_id() {
        let store = ConversationStore::new();

        {
            let mut c1 = store.acquire("c1").await;
            *c1 = Some(pending());
        }

        let c2 = store.acquire("c2").await;
        assert!(c2.is_none(), "c2 must not observe c1's pending state");
        drop(c2);

        let c1 = store.acquire("c1").await;
        assert!(c1.is_some());
    }

    #[tokio::test]
    async fn same_conversation_turns_serialize() {
        let store = Arc::new(ConversationStore::new());

        let first = store.acquire("c1").await;
        let contended = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut slot = store.acquire("c1").await;
                *slot = Some(pending());
            })
        };

        // The spawned turn cannot proceed while the first guard is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contended.is_finished());
        assert!(first.is_none());
        drop(first);

        contended.await.expect("contended turn completes");
        let slot = store.acquire("c1").await;
        assert!(slot.is_some());
    }

    #[tokio::test]
    async fn one_shot_conversations_leave_no_tracked_slot() {
        let store = ConversationStore::new();

        for i in 0..1000 {
            let id = format!("one-shot-{i}");
            let guard = store.acquire(&id).await;
            assert!(guard.is_none());
            drop(guard);
            store.release_idle(&id);
        }

        assert_eq!(store.tracked_conversations(), 0);
    }

    #[tokio::test]
    async fn pending_clarification_keeps_its_slot_until_consumed() {
        let store = ConversationStore::new();

        {
            let mut slot = store.acquire("c1").await;
            *slot = Some(pending());
        }
        store.release_idle("c1");
        assert_eq!(store.tracked_conversations(), 1, "live clarification must survive release");

        {
            let mut slot = store.acquire("c1").await;
            assert!(slot.take().is_some());
        }
        store.release_idle("c1");
        assert_eq!(store.tracked_conversations(), 0);
    }

    #[tokio::test]
    async fn release_is_a_no_op_while_a_turn_holds_the_slot() {
        let store = ConversationStore::new();

        let guard = store.acquire("c1").await;
        store.release_idle("c1");
        assert_eq!(store.tracked_conversations(), 1);
        drop(guard);

        store.release_idle("c1");
        assert_eq!(store.tracked_conversations(), 0);
    }

    #[test]
    fn retry_bound_is_one_reprompt() {
        let mut clarification = pending();
        assert!(!clarification.retries_exhausted());
        clarification.retry_count += 1;
        assert!(clarification.retries_exhausted());
        assert_eq!(CLARIFICATION_RETRY_LIMIT, 1);
    }
}
