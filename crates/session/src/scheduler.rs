//! Proactive renewal timer.
//!
//! The scheduler follows the credential store: every change cancels the
//! pending timer before a new one is armed, so at most one renewal timer
//! exists per session. Renewals are spaced at least `debounce` apart; a
//! credential change inside that window pushes the timer out to the end of
//! the window instead of firing early.

use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::clock::SharedClock;
use crate::config::RenewalTiming;
use crate::credential::{Credential, CredentialStore};
use crate::events::{self, EventSender, SessionEvent};
use crate::renewal::RenewalExecutor;

/// Scheduler state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Scheduled { fires_at_ms: i64 },
    /// The timer elapsed and a renewal is running
    Fired,
}

struct SchedulerState {
    phase: SchedulerPhase,
    timer: Option<JoinHandle<()>>,
    armed_for: Option<String>,
    generation: u64,
    renewing: bool,
    last_renewal_ms: Option<i64>,
}

impl SchedulerState {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.armed_for = None;
        self.renewing = false;
    }
}

struct SchedulerInner {
    timing: RenewalTiming,
    debounce: Duration,
    clock: SharedClock,
    store: CredentialStore,
    executor: Arc<RenewalExecutor>,
    events: EventSender,
    state: Mutex<SchedulerState>,
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_credential_changed(self: &Arc<Self>, credential: Option<Credential>) {
        let mut state = self.lock();
        match credential {
            None => {
                if state.timer.is_some() {
                    debug!("Credential cleared, cancelling token refresh");
                }
                state.cancel_timer();
                state.phase = SchedulerPhase::Idle;
                state.last_renewal_ms = None;
            }
            Some(_) if state.renewing => {
                debug!("Refresh in flight, re-arming once it settles");
            }
            Some(credential) => {
                if state.armed_for.as_deref() == Some(credential.value()) {
                    return;
                }
                self.arm(&mut state, &credential);
            }
        }
    }

    fn arm(self: &Arc<Self>, state: &mut SchedulerState, credential: &Credential) {
        state.cancel_timer();

        let now = self.clock.now_ms();
        let mut delay = self.timing.delay_for(credential, now);

        if let Some(last) = state.last_renewal_ms {
            let elapsed = Duration::from_millis(now.saturating_sub(last).max(0) as u64);
            if let Some(remaining) = self.debounce.checked_sub(elapsed) {
                if remaining > delay {
                    debug!(
                        "Last refresh {}s ago, deferring next refresh by {}s",
                        elapsed.as_secs(),
                        remaining.as_secs()
                    );
                    delay = remaining;
                }
            }
        }

        let generation = state.generation;
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        state.phase = SchedulerPhase::Scheduled {
            fires_at_ms: now.saturating_add(delay_ms),
        };
        state.armed_for = Some(credential.value().to_string());

        let inner = Arc::clone(self);
        state.timer = Some(tokio::spawn(inner.fire(generation, delay)));

        info!("Token refresh scheduled in {} minutes", delay.as_secs() / 60);
        events::emit(&self.events, SessionEvent::RenewalScheduled { delay });
    }

    async fn fire(self: Arc<Self>, generation: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        let credential = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            let Some(credential) = self.store.get() else {
                state.phase = SchedulerPhase::Idle;
                return;
            };
            state.phase = SchedulerPhase::Fired;
            state.renewing = true;
            state.last_renewal_ms = Some(self.clock.now_ms());
            credential
        };

        info!("Proactively refreshing token");
        // failures are logged and reported by the executor
        let _ = self.executor.renew(&credential).await;

        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.renewing = false;
        state.last_renewal_ms = Some(self.clock.now_ms());
        // this is our own handle; detach it rather than abort it
        drop(state.timer.take());

        match self.store.get() {
            Some(latest) => self.arm(&mut state, &latest),
            None => {
                state.armed_for = None;
                state.phase = SchedulerPhase::Idle;
            }
        }
    }
}

/// Arms, cancels and fires the proactive renewal timer
pub struct ExpiryScheduler {
    inner: Arc<SchedulerInner>,
    driver: Option<JoinHandle<()>>,
}

impl ExpiryScheduler {
    pub fn new(
        timing: RenewalTiming,
        debounce: Duration,
        clock: SharedClock,
        store: CredentialStore,
        executor: Arc<RenewalExecutor>,
        events: EventSender,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                timing,
                debounce,
                clock,
                store,
                executor,
                events,
                state: Mutex::new(SchedulerState {
                    phase: SchedulerPhase::Idle,
                    timer: None,
                    armed_for: None,
                    generation: 0,
                    renewing: false,
                    last_renewal_ms: None,
                }),
            }),
            driver: None,
        }
    }

    /// Follow the credential store, arming for the credential it holds now
    pub fn start(&mut self) {
        self.stop();

        let mut credentials = self.inner.store.subscribe();
        let initial = credentials.borrow_and_update().clone();
        self.inner.on_credential_changed(initial);

        let inner = Arc::clone(&self.inner);
        self.driver = Some(tokio::spawn(async move {
            while credentials.changed().await.is_ok() {
                let credential = credentials.borrow_and_update().clone();
                inner.on_credential_changed(credential);
            }
        }));
    }

    /// Stop following the store and cancel any pending timer
    pub fn stop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        let mut state = self.inner.lock();
        state.cancel_timer();
        state.phase = SchedulerPhase::Idle;
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.inner.lock().phase
    }

    /// Number of live renewal timers, 0 or 1
    pub fn pending_timers(&self) -> usize {
        let state = self.inner.lock();
        match state.timer {
            Some(ref timer) if !timer.is_finished() => 1,
            _ => 0,
        }
    }

    /// When the last renewal attempt settled
    pub fn last_renewal_ms(&self) -> Option<i64> {
        self.inner.lock().last_renewal_ms
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
