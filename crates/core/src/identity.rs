use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::Domain;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-domain credential material for one identity. Secrets are wrapped so
/// they never end up in debug output or logs.
#[derive(Clone, Debug, Default)]
pub struct DomainCredentials {
    pub github_token: Option<SecretString>,
    pub linear_api_key: Option<SecretString>,
}

/// A configured user the system can act on behalf of. Immutable after
/// startup.
#[derive(Clone, Debug)]
pub struct UserIdentity {
    pub id: UserId,
    pub display_name: String,
    pub aliases: Vec<String>,
    pub credentials: DomainCredentials,
}

impl PartialEq for UserIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UserIdentity {}

impl UserIdentity {
    pub fn credential(&self, domain: Domain) -> Option<&SecretString> {
        match domain {
            Domain::GitHub => self.credentials.github_token.as_ref(),
            Domain::Linear => self.credentials.linear_api_key.as_ref(),
        }
    }

    /// Case-insensitive equality against the display name or any alias.
    pub fn matches_exact(&self, normalized_hint: &str) -> bool {
        self.name_candidates().any(|name| name == normalized_hint)
    }

    /// Case-insensitive containment of the hint inside the display name or
    /// an alias.
    pub fn matches_partial(&self, normalized_hint: &str) -> bool {
        self.name_candidates().any(|name| name.contains(normalized_hint))
    }

    fn name_candidates(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.display_name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .map(|name| name.trim().to_lowercase())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("at least one user must be configured")]
    Empty,
    #[error("duplicate user id `{0}`")]
    DuplicateId(String),
    #[error("duplicate display name `{0}` (display names are case-insensitively unique)")]
    DuplicateDisplayName(String),
    #[error("user `{0}` has an empty display name")]
    EmptyDisplayName(String),
}

/// Ordered, process-lifetime set of configured identities. Built once at
/// startup and shared read-only; insertion order is the tie-break order the
/// resolver exposes to callers.
#[derive(Clone, Debug)]
pub struct IdentityRegistry {
    identities: Vec<UserIdentity>,
}

impl IdentityRegistry {
    pub fn new(identities: Vec<UserIdentity>) -> Result<Self, RegistryError> {
        if identities.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen_ids = std::collections::HashSet::new();
        let mut seen_names = std::collections::HashSet::new();
        for identity in &identities {
            if identity.display_name.trim().is_empty() {
                return Err(RegistryError::EmptyDisplayName(identity.id.0.clone()));
            }
            if !seen_ids.insert(identity.id.0.clone()) {
                return Err(RegistryError::DuplicateId(identity.id.0.clone()));
            }
            if !seen_names.insert(identity.display_name.trim().to_lowercase()) {
                return Err(RegistryError::DuplicateDisplayName(identity.display_name.clone()));
            }
        }

        Ok(Self { identities })
    }

    pub fn identities(&self) -> &[UserIdentity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn display_names(&self) -> Vec<String> {
        self.identities.iter().map(|identity| identity.display_name.clone()).collect()
    }
}
