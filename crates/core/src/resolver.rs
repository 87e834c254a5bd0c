//! Deterministic mapping from a free-text hint to configured identities.
//!
//! The policy is evaluated in a fixed order so the same hint against the
//! same candidate list always produces the same result, which is what keeps
//! the orchestrator testable despite the nondeterministic classifier
//! upstream:
//!
//! 1. no usable hint → `Ambiguous` over all candidates (or `Resolved` when
//!    only one candidate exists);
//! 2. exact case-insensitive match on display name or alias;
//! 3. substring containment, only if no exact match existed;
//! 4. two or more matches at either step → `Ambiguous` over that set, in
//!    candidate order;
//! 5. nothing matched → `NotFound` (the caller decides whether to offer the
//!    full candidate list).

use crate::identity::UserIdentity;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionResult {
    Resolved(UserIdentity),
    Ambiguous(Vec<UserIdentity>),
    NotFound,
}

/// Resolve `hint` against `candidates`. Pure and idempotent; candidate order
/// is preserved in ambiguous results.
pub fn resolve(hint: Option<&str>, candidates: &[UserIdentity]) -> ResolutionResult {
    let normalized = hint.map(normalize_hint).filter(|hint| !hint.is_empty());

    let Some(hint) = normalized else {
        return match candidates {
            [] => ResolutionResult::NotFound,
            [only] => ResolutionResult::Resolved(only.clone()),
            _ => ResolutionResult::Ambiguous(candidates.to_vec()),
        };
    };

    let exact: Vec<UserIdentity> =
        candidates.iter().filter(|candidate| candidate.matches_exact(&hint)).cloned().collect();
    match exact.len() {
        1 => return ResolutionResult::Resolved(exact.into_iter().next().expect("one element")),
        0 => {}
        _ => return ResolutionResult::Ambiguous(exact),
    }

    let partial: Vec<UserIdentity> =
        candidates.iter().filter(|candidate| candidate.matches_partial(&hint)).cloned().collect();
    match partial.len() {
        1 => ResolutionResult::Resolved(partial.into_iter().next().expect("one element")),
        0 => ResolutionResult::NotFound,
        _ => ResolutionResult::Ambiguous(partial),
    }
}

/// Lowercase, trim surrounding punctuation, and strip a trailing possessive
/// so replies like `"Alice's."` resolve the same way `"alice"` does.
fn normalize_hint(hint: &str) -> String {
    let lowered = hint.trim().to_lowercase();
    let trimmed = lowered.trim_matches(|ch: char| !ch.is_alphanumeric());
    let without_possessive = trimmed.strip_suffix("'s").unwrap_or(trimmed);
    without_possessive.trim().to_string()
}
