//! Periodic session probe against the backend

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::activity::{ActivityBus, Interaction};
use crate::credential::{Credential, CredentialStore};
use crate::logout::{LogoutCoordinator, LogoutReason};

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Valid,
    /// The backend refused the credential
    Rejected,
    /// The probe could not reach a verdict
    Unreachable(String),
}

/// Asks the backend whether a credential is still accepted
#[async_trait]
pub trait SessionProbe: Send + Sync {
    async fn probe(&self, credential: &Credential) -> ProbeOutcome;
}

/// `GET {api}/users/me` with the bearer credential
pub struct HttpSessionProbe {
    url: String,
    http_client: Client,
}

impl HttpSessionProbe {
    pub fn new(api_url: &str, http_client: Client) -> Self {
        Self {
            url: format!("{}/users/me", api_url.trim_end_matches('/')),
            http_client,
        }
    }
}

#[async_trait]
impl SessionProbe for HttpSessionProbe {
    async fn probe(&self, credential: &Credential) -> ProbeOutcome {
        let response = match self
            .http_client
            .get(&self.url)
            .bearer_auth(credential.value())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return ProbeOutcome::Unreachable(err.to_string()),
        };

        match response.status() {
            status if status.is_success() => ProbeOutcome::Valid,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProbeOutcome::Rejected,
            status => ProbeOutcome::Unreachable(format!("unexpected status {}", status)),
        }
    }
}

/// Runs the probe on an interval and whenever the window regains focus
pub struct HealthCheck {
    probe: Arc<dyn SessionProbe>,
    store: CredentialStore,
    coordinator: Arc<LogoutCoordinator>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl HealthCheck {
    pub fn new(
        probe: Arc<dyn SessionProbe>,
        store: CredentialStore,
        coordinator: Arc<LogoutCoordinator>,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            store,
            coordinator,
            interval,
            task: None,
        }
    }

    pub fn start(&mut self, bus: &ActivityBus) {
        self.stop();

        let probe = Arc::clone(&self.probe);
        let store = self.store.clone();
        let coordinator = Arc::clone(&self.coordinator);
        let period = self.interval;
        let mut signals = bus.subscribe();

        self.task = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    signal = signals.recv() => match signal {
                        Ok(Interaction::Focus) => {}
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return,
                    },
                }

                let Some(credential) = store.get() else {
                    continue;
                };

                match probe.probe(&credential).await {
                    ProbeOutcome::Valid => debug!("Session probe ok"),
                    ProbeOutcome::Rejected => {
                        tokio::spawn(async move {
                            coordinator
                                .force_logout(LogoutReason::CredentialRejected)
                                .await;
                        });
                        return;
                    }
                    ProbeOutcome::Unreachable(reason) => {
                        warn!("Session probe inconclusive: {}", reason);
                    }
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HealthCheck {
    fn drop(&mut self) {
        self.stop();
    }
}
