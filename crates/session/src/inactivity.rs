//! Inactivity dead-man timer

use log::info;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::InactivityTimeout;
use crate::events::{self, EventSender, SessionEvent};
use crate::logout::{LogoutCoordinator, LogoutReason};

/// Warns after a quiet period and forces logout after a further grace
/// period. Any tracked activity restarts the cycle.
pub struct InactivityMonitor {
    timeout: InactivityTimeout,
    coordinator: Arc<LogoutCoordinator>,
    events: EventSender,
    task: Option<JoinHandle<()>>,
}

impl InactivityMonitor {
    pub fn new(
        timeout: InactivityTimeout,
        coordinator: Arc<LogoutCoordinator>,
        events: EventSender,
    ) -> Self {
        Self {
            timeout,
            coordinator,
            events,
            task: None,
        }
    }

    /// Start the cycle now, restarting it whenever `activity` changes
    pub fn start(&mut self, mut activity: watch::Receiver<i64>) {
        self.stop();

        let timeout = self.timeout;
        let coordinator = Arc::clone(&self.coordinator);
        let events = self.events.clone();
        activity.borrow_and_update();

        self.task = Some(tokio::spawn(async move {
            'cycle: loop {
                let warn_at = Instant::now() + timeout.warn_after;
                tokio::select! {
                    _ = tokio::time::sleep_until(warn_at) => {}
                    changed = activity.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        activity.borrow_and_update();
                        continue 'cycle;
                    }
                }

                info!(
                    "No activity for {} minutes, logging out in {} minutes",
                    timeout.warn_after.as_secs() / 60,
                    timeout.logout_after.as_secs() / 60
                );
                events::emit(
                    &events,
                    SessionEvent::InactivityWarning {
                        logout_in: timeout.logout_after,
                    },
                );

                tokio::select! {
                    _ = tokio::time::sleep(timeout.logout_after) => {
                        // runs detached; stopping this monitor must not cancel it
                        tokio::spawn(async move {
                            coordinator.force_logout(LogoutReason::Inactivity).await;
                        });
                        return;
                    }
                    changed = activity.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        activity.borrow_and_update();
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

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
