//! Forced logout: redirects, route guard and the login-page notice

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::credential::CredentialStore;
use crate::events::{self, EventSender, SessionEvent};
use crate::framework::{Navigator, SessionFramework, SessionStatus, SignOutOptions};

/// Why a session was terminated. Only used for the user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogoutReason {
    Inactivity,
    Unauthenticated,
    /// Never raised here, since a failed renewal keeps the session; parsed from login-page markers
    RefreshFailed,
    CredentialRejected,
    Error,
}

impl LogoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactivity => "inactivity",
            Self::Unauthenticated => "unauthenticated",
            Self::RefreshFailed => "tokenRefreshFailed",
            Self::CredentialRejected => "credentialRejected",
            Self::Error => "error",
        }
    }
}

/// Routes that stay reachable without a session
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl RouteGuard {
    pub fn new(exact: Vec<String>, prefixes: Vec<String>) -> Self {
        Self { exact, prefixes }
    }

    pub fn is_public(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        self.exact.iter().any(|route| route == path)
            || self.prefixes.iter().any(|prefix| {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .map_or(false, |rest| rest.starts_with('/'))
            })
    }
}

/// Terminates the session once, however many triggers fire
pub struct LogoutCoordinator {
    store: CredentialStore,
    framework: Arc<dyn SessionFramework>,
    navigator: Option<Arc<dyn Navigator>>,
    events: EventSender,
    guard: RouteGuard,
    login_path: String,
    fired: AtomicBool,
}

impl LogoutCoordinator {
    pub fn new(
        store: CredentialStore,
        framework: Arc<dyn SessionFramework>,
        navigator: Option<Arc<dyn Navigator>>,
        events: EventSender,
        guard: RouteGuard,
        login_path: &str,
    ) -> Self {
        Self {
            store,
            framework,
            navigator,
            events,
            guard,
            login_path: login_path.to_string(),
            fired: AtomicBool::new(false),
        }
    }

    /// Redirect target for a forced logout
    pub fn login_redirect(&self, reason: LogoutReason) -> String {
        format!(
            "{}?message=session_expired&reason={}",
            self.login_path,
            urlencoding::encode(reason.as_str())
        )
    }

    /// Clear the credential, sign out and redirect.
    ///
    /// Returns `false` if this session was already terminated.
    pub async fn force_logout(&self, reason: LogoutReason) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("Forcing logout: {}", reason.as_str());
        self.store.clear();

        let location = self.login_redirect(reason);
        let options = SignOutOptions {
            redirect: false,
            callback_url: location.clone(),
        };
        if let Err(err) = self.framework.sign_out(options).await {
            warn!("Sign-out failed, redirecting anyway: {}", err);
        }

        if let Some(ref navigator) = self.navigator {
            navigator.navigate(&location);
        }

        events::emit(&self.events, SessionEvent::LoggedOut { reason });
        true
    }

    /// React to a status report from the session framework.
    ///
    /// An unauthenticated session on a protected route is terminated without retry.
    pub async fn on_status(&self, status: &SessionStatus, route: &str) -> bool {
        match status {
            SessionStatus::Unauthenticated if !self.guard.is_public(route) => {
                self.force_logout(LogoutReason::Unauthenticated).await
            }
            _ => false,
        }
    }

    /// Allow the next session to be terminated again
    pub fn rearm(&self) {
        self.fired.store(false, Ordering::SeqCst);
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }
}

/// Toast shown on the login page after a forced logout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryNotice {
    pub message: &'static str,
    pub description: &'static str,
}

impl ExpiryNotice {
    /// Read the logout marker from a login page query string
    pub fn from_query(query: &str) -> Option<Self> {
        let query = query.trim_start_matches('?');
        let mut expired = false;
        let mut reason = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match (key.as_ref(), value.as_ref()) {
                ("sessionExpired", "true") | ("message", "session_expired") => expired = true,
                ("reason", _) => reason = Some(value.to_string()),
                _ => {}
            }
        }

        if !expired {
            return None;
        }

        Some(match reason.as_deref() {
            Some("inactivity") => Self {
                message: "Your session has expired due to inactivity. Please log in again.",
                description: "Security timeout",
            },
            Some("error") => Self {
                message: "A session error occurred. Please log in again.",
                description: "Authentication error",
            },
            _ => Self {
                message: "Your session has expired. Please log in again.",
                description: "Security timeout",
            },
        })
    }
}
