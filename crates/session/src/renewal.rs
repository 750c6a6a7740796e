//! Credential renewal against the backend refresh endpoint

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::clock::SharedClock;
use crate::credential::{Credential, CredentialStore};
use crate::error::SessionError;
use crate::events::{self, EventSender, SessionEvent};
use crate::framework::{SessionFramework, SessionPatch};
use crate::state::SessionState;

/// Body returned by the refresh endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Exchanges a still-valid credential for a fresh one
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn refresh(&self, current: &Credential) -> Result<RefreshResponse, SessionError>;
}

/// `POST {api}/auth/refresh` with the current credential as bearer
pub struct HttpTokenEndpoint {
    url: String,
    http_client: Client,
}

impl HttpTokenEndpoint {
    /// `api_url` is the backend API base, e.g. `http://localhost:8000/api/v1`
    pub fn new(api_url: &str, http_client: Client) -> Self {
        Self {
            url: format!("{}/auth/refresh", api_url.trim_end_matches('/')),
            http_client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn refresh(&self, current: &Credential) -> Result<RefreshResponse, SessionError> {
        let response = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .bearer_auth(current.value())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::RenewalRejected { status, body });
        }

        let body = response.text().await?;
        let parsed: RefreshResponse = serde_json::from_str(&body)?;
        if parsed.access_token.trim().is_empty() {
            return Err(SessionError::MalformedResponse(
                "empty access_token".to_string(),
            ));
        }

        Ok(parsed)
    }
}

/// Outcome of the most recent exchange, kept for callers that queued behind it
struct Settled {
    attempt: u64,
    outcome: Result<Credential, String>,
}

/// Runs renewals and installs their result.
///
/// A failed renewal leaves the current credential in place; natural expiry
/// takes the session down later through the unauthenticated path.
pub struct RenewalExecutor {
    endpoint: Arc<dyn TokenEndpoint>,
    store: CredentialStore,
    framework: Arc<dyn SessionFramework>,
    events: EventSender,
    clock: SharedClock,
    timeout: Option<Duration>,
    warning_window: Duration,
    attempts: AtomicU64,
    in_flight: Mutex<Option<Settled>>,
}

impl RenewalExecutor {
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        store: CredentialStore,
        framework: Arc<dyn SessionFramework>,
        events: EventSender,
        clock: SharedClock,
        timeout: Option<Duration>,
        warning_window: Duration,
    ) -> Self {
        Self {
            endpoint,
            store,
            framework,
            events,
            clock,
            timeout,
            warning_window,
            attempts: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    /// Renew `current`.
    ///
    /// Concurrent callers share one exchange: a caller that waited behind an
    /// exchange gets its outcome, failure included.
    pub async fn renew(&self, current: &Credential) -> Result<Credential, SessionError> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let mut last = self.in_flight.lock().await;

        if let Some(settled) = last.as_ref().filter(|s| s.attempt > seen) {
            debug!("Joined a refresh that settled while waiting");
            return settled
                .outcome
                .clone()
                .map_err(SessionError::RenewalFailed);
        }

        match self.store.get() {
            None => return Err(SessionError::MissingCredential),
            Some(latest) if latest != *current => {
                debug!("Credential already replaced, skipping refresh");
                return Ok(latest);
            }
            Some(_) => {}
        }

        debug!("Refreshing access token");
        let result = self.settle(current).await;

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        *last = Some(Settled {
            attempt,
            outcome: result
                .as_ref()
                .map(Credential::clone)
                .map_err(|err| err.to_string()),
        });

        result
    }

    async fn settle(&self, current: &Credential) -> Result<Credential, SessionError> {
        match self.exchange(current).await {
            Ok(response) => {
                let renewed = Credential::new(response.access_token);
                self.store.set(renewed.clone());

                if let Err(err) = self
                    .framework
                    .update(SessionPatch::access_token(renewed.value()))
                    .await
                {
                    warn!("Token refreshed but session update failed: {}", err);
                }

                info!("Token refreshed successfully");
                events::emit(&self.events, SessionEvent::Renewed);
                Ok(renewed)
            }
            Err(err) => {
                warn!("Token refresh failed, keeping current token: {}", err);
                events::emit(
                    &self.events,
                    SessionEvent::RenewalFailed {
                        reason: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    async fn exchange(&self, current: &Credential) -> Result<RefreshResponse, SessionError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.endpoint.refresh(current))
                .await
                .map_err(|_| SessionError::Timeout(limit))?,
            None => self.endpoint.refresh(current).await,
        }
    }

    /// The current token, renewed first if it is inside the warning window.
    ///
    /// Falls back to the existing token when the renewal fails.
    pub async fn valid_token(&self) -> Option<String> {
        let current = self.store.get()?;
        let now = self.clock.now_ms();
        let state = SessionState::compute(Some(&current), now, now, self.warning_window);

        if !state.is_expiring {
            return Some(current.value().to_string());
        }

        match self.renew(&current).await {
            Ok(renewed) => Some(renewed.value().to_string()),
            Err(_) => Some(current.value().to_string()),
        }
    }
}
