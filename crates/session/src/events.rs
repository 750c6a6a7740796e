//! Lifecycle notifications for banners, toasts and tests

use std::time::Duration;
use tokio::sync::broadcast;

use crate::logout::LogoutReason;

const EVENT_CAPACITY: usize = 64;

/// Something observable happened to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RenewalScheduled { delay: Duration },
    Renewed,
    RenewalFailed { reason: String },
    /// The credential is about to expire
    ExpiryWarning { time_until_expiry_ms: i64 },
    /// No activity for a while; logout follows unless the user interacts
    InactivityWarning { logout_in: Duration },
    LoggedOut { reason: LogoutReason },
}

pub type EventSender = broadcast::Sender<SessionEvent>;

pub(crate) fn channel() -> EventSender {
    let (sender, _) = broadcast::channel(EVENT_CAPACITY);
    sender
}

pub(crate) fn emit(events: &EventSender, event: SessionEvent) {
    // nobody listening is fine
    let _ = events.send(event);
}
