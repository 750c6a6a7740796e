//! Bearer credential and the store every API call reads from

use std::sync::Arc;
use tokio::sync::watch;

use crate::introspect;

/// A bearer token plus the expiry decoded from its claims segment.
///
/// Credentials are never mutated; renewal replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    expires_at_ms: Option<i64>,
}

impl Credential {
    /// Wrap a token, decoding its expiry on a best-effort basis
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let expires_at_ms = introspect::decode_expiry(&value);
        Self {
            value,
            expires_at_ms,
        }
    }

    /// The raw bearer token
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Decoded expiry in epoch milliseconds, if the token carried one
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.expires_at_ms
    }

    /// Milliseconds until expiry (negative once expired)
    pub fn time_until_expiry_ms(&self, now_ms: i64) -> Option<i64> {
        self.expires_at_ms.map(|exp| exp - now_ms)
    }

    /// True only when the expiry is known and has passed
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        matches!(self.time_until_expiry_ms(now_ms), Some(remaining) if remaining <= 0)
    }
}

/// Explicitly constructed holder of the current credential.
///
/// Clones share the same slot. Request-building code must call [`get`](Self::get)
/// or [`token`](Self::token) when the request is built, not cache the value
/// across an await.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    slot: Arc<watch::Sender<Option<Credential>>>,
}

impl CredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// The current credential
    pub fn get(&self) -> Option<Credential> {
        self.slot.borrow().clone()
    }

    /// The current bearer token
    pub fn token(&self) -> Option<String> {
        self.slot.borrow().as_ref().map(|c| c.value.clone())
    }

    /// Install a credential. Returns `false` if the same token was already stored.
    pub fn set(&self, credential: Credential) -> bool {
        self.slot.send_if_modified(|current| {
            if current.as_ref() == Some(&credential) {
                return false;
            }
            *current = Some(credential);
            true
        })
    }

    /// Remove the credential. Returns `false` if the store was already empty.
    pub fn clear(&self) -> bool {
        self.slot.send_if_modified(|current| current.take().is_some())
    }

    /// Watch credential changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.slot.subscribe()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
