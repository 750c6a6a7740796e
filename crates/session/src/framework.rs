//! The session framework seam: the component that owns the session object,
//! signs users in and out, and performs redirects.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::SessionError;

/// Session object max age used by [`LocalSession`]
pub const SESSION_MAX_AGE_HOURS: i64 = 24;

/// User section of the session object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub tenant_id: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub first_login: bool,
    #[serde(default)]
    pub must_change_password: bool,
}

/// The session object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
}

/// Authentication status as reported by the framework
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Loading,
    Authenticated(SessionData),
    Unauthenticated,
}

impl SessionStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionStatus::Authenticated(_))
    }

    pub fn session(&self) -> Option<&SessionData> {
        match self {
            SessionStatus::Authenticated(data) => Some(data),
            _ => None,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session().map(|data| data.user.access_token.as_str())
    }
}

/// Partial update applied to the session object without a reload.
///
/// An empty patch asks the framework to re-read the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub access_token: Option<String>,
}

impl SessionPatch {
    pub fn access_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
    }
}

/// Arguments of a sign-out call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignOutOptions {
    /// Let the framework perform the redirect itself
    pub redirect: bool,
    pub callback_url: String,
}

/// The session framework the lifecycle manager collaborates with
#[async_trait]
pub trait SessionFramework: Send + Sync {
    /// Watch the authentication status
    fn status(&self) -> watch::Receiver<SessionStatus>;

    /// Current session object, if authenticated
    fn get_session(&self) -> Option<SessionData> {
        let status = self.status();
        let current = status.borrow();
        current.session().cloned()
    }

    /// Establish a session after a successful credential exchange
    async fn sign_in(&self, session: SessionData) -> Result<(), SessionError>;

    /// Mutate the session object in place
    async fn update(&self, patch: SessionPatch) -> Result<Option<SessionData>, SessionError>;

    /// Terminate the session
    async fn sign_out(&self, options: SignOutOptions) -> Result<(), SessionError>;
}

/// Performs client-side redirects
pub trait Navigator: Send + Sync {
    fn navigate(&self, location: &str);
}

/// Redirects are delivered to whoever holds the receiving end
impl Navigator for mpsc::UnboundedSender<String> {
    fn navigate(&self, location: &str) {
        if self.send(location.to_string()).is_err() {
            log::debug!("Navigation to {} dropped, no receiver", location);
        }
    }
}

/// In-process session framework
pub struct LocalSession {
    status: watch::Sender<SessionStatus>,
    sign_outs: Mutex<Vec<SignOutOptions>>,
    updates: AtomicUsize,
}

impl LocalSession {
    /// Start unauthenticated
    pub fn new() -> Self {
        let (status, _) = watch::channel(SessionStatus::Unauthenticated);
        Self {
            status,
            sign_outs: Mutex::new(Vec::new()),
            updates: AtomicUsize::new(0),
        }
    }

    /// Start authenticated with the given session
    pub fn authenticated(session: SessionData) -> Self {
        let local = Self::new();
        local.status.send_replace(SessionStatus::Authenticated(session));
        local
    }

    /// Build a session object around an access token
    pub fn session_for(user: SessionUser) -> SessionData {
        SessionData {
            user,
            expires: Self::next_expiry(),
        }
    }

    fn next_expiry() -> DateTime<Utc> {
        Utc::now() + ChronoDuration::hours(SESSION_MAX_AGE_HOURS)
    }

    /// Sign-out calls received so far
    pub fn sign_out_calls(&self) -> Vec<SignOutOptions> {
        self.sign_outs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of `update` calls received so far
    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Report the session as unauthenticated, as when it expires server-side
    pub fn expire(&self) {
        self.status.send_replace(SessionStatus::Unauthenticated);
    }
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionFramework for LocalSession {
    fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    async fn sign_in(&self, session: SessionData) -> Result<(), SessionError> {
        self.status.send_replace(SessionStatus::Authenticated(session));
        Ok(())
    }

    async fn update(&self, patch: SessionPatch) -> Result<Option<SessionData>, SessionError> {
        self.updates.fetch_add(1, Ordering::SeqCst);

        let mut updated = None;
        self.status.send_if_modified(|status| match status {
            SessionStatus::Authenticated(data) => {
                data.expires = Self::next_expiry();
                let token_changed = match patch.access_token {
                    Some(ref token) if *token != data.user.access_token => {
                        data.user.access_token = token.clone();
                        true
                    }
                    _ => false,
                };
                updated = Some(data.clone());
                token_changed
            }
            _ => false,
        });

        Ok(updated)
    }

    async fn sign_out(&self, options: SignOutOptions) -> Result<(), SessionError> {
        self.sign_outs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(options);
        self.status.send_replace(SessionStatus::Unauthenticated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(token: &str) -> SessionUser {
        SessionUser {
            id: "1".to_string(),
            email: "admin@msf.org".to_string(),
            name: None,
            role: Some("SUPER_ADMIN".to_string()),
            tenant_id: None,
            access_token: token.to_string(),
            first_login: false,
            must_change_password: false,
        }
    }

    #[tokio::test]
    async fn test_update_replaces_token_and_notifies() {
        let local = LocalSession::authenticated(LocalSession::session_for(user("old")));
        let mut status = local.status();
        status.borrow_and_update();

        let updated = local.update(SessionPatch::access_token("new")).await.unwrap();
        assert_eq!(updated.unwrap().user.access_token, "new");
        assert!(status.has_changed().unwrap());
        assert_eq!(local.get_session().unwrap().user.access_token, "new");
    }

    #[tokio::test]
    async fn test_empty_update_does_not_notify() {
        let local = LocalSession::authenticated(LocalSession::session_for(user("token")));
        let mut status = local.status();
        status.borrow_and_update();

        local.update(SessionPatch::default()).await.unwrap();
        assert!(!status.has_changed().unwrap());
        assert_eq!(local.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_records_call() {
        let local = LocalSession::authenticated(LocalSession::session_for(user("token")));
        let options = SignOutOptions {
            redirect: false,
            callback_url: "/login".to_string(),
        };

        local.sign_out(options.clone()).await.unwrap();
        assert_eq!(local.sign_out_calls(), vec![options]);
        assert_eq!(*local.status().borrow(), SessionStatus::Unauthenticated);
    }

    #[test]
    fn test_session_user_uses_camel_case() {
        let json = serde_json::to_value(user("abc")).unwrap();
        assert_eq!(json["accessToken"], "abc");
        assert_eq!(json["tenantId"], serde_json::Value::Null);
    }
}
