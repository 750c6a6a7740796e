//! Advisory expiry check.
//!
//! Runs on a fixed interval, publishes a [`SessionState`] for display and,
//! inside the warning window, asks the session framework to re-read the
//! session. It never calls the renewal endpoint; that is the scheduler's job.

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::SharedClock;
use crate::credential::CredentialStore;
use crate::events::{self, EventSender, SessionEvent};
use crate::framework::{SessionFramework, SessionPatch};
use crate::state::SessionState;

pub struct ExpiryMonitor {
    interval: Duration,
    warning_window: Duration,
    clock: SharedClock,
    store: CredentialStore,
    framework: Arc<dyn SessionFramework>,
    events: EventSender,
    state: Arc<watch::Sender<SessionState>>,
    task: Option<JoinHandle<()>>,
}

impl ExpiryMonitor {
    pub fn new(
        interval: Duration,
        warning_window: Duration,
        clock: SharedClock,
        store: CredentialStore,
        framework: Arc<dyn SessionFramework>,
        events: EventSender,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::initial(clock.now_ms()));
        Self {
            interval,
            warning_window,
            clock,
            store,
            framework,
            events,
            state: Arc::new(state),
            task: None,
        }
    }

    /// Begin periodic checks; the first check runs immediately
    pub fn start(&mut self, activity: watch::Receiver<i64>) {
        self.stop();

        let period = self.interval;
        let window = self.warning_window;
        let clock = Arc::clone(&self.clock);
        let store = self.store.clone();
        let framework = Arc::clone(&self.framework);
        let events = self.events.clone();
        let published = Arc::clone(&self.state);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let credential = store.get();
                let last_activity = *activity.borrow();
                let state = SessionState::compute(
                    credential.as_ref(),
                    clock.now_ms(),
                    last_activity,
                    window,
                );
                published.send_replace(state);

                if state.should_warn() {
                    let remaining = state.time_until_expiry_ms.unwrap_or_default();
                    debug!("Session expires in {}s, refreshing session", remaining / 1000);
                    events::emit(
                        &events,
                        SessionEvent::ExpiryWarning {
                            time_until_expiry_ms: remaining,
                        },
                    );
                    if let Err(err) = framework.update(SessionPatch::default()).await {
                        warn!("Session update failed: {}", err);
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

    /// Watch the published state
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The most recently published state
    pub fn current(&self) -> SessionState {
        *self.state.borrow()
    }
}

impl Drop for ExpiryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
