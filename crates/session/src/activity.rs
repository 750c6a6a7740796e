//! User interaction tracking

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::clock::SharedClock;

const BUS_CAPACITY: usize = 256;

/// Interaction signals the host can publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interaction {
    MouseDown,
    MouseMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
    /// Window gained focus. Not counted as activity.
    Focus,
    /// Window lost focus. Not counted as activity.
    Blur,
}

impl Interaction {
    /// The signal classes that count as user activity
    pub const TRACKED: [Interaction; 6] = [
        Interaction::MouseDown,
        Interaction::MouseMove,
        Interaction::KeyPress,
        Interaction::Scroll,
        Interaction::TouchStart,
        Interaction::Click,
    ];

    pub fn is_tracked(self) -> bool {
        Self::TRACKED.contains(&self)
    }
}

/// Document-level fan-out point for interaction signals.
///
/// Publishing never blocks and never waits on listeners.
#[derive(Debug, Clone)]
pub struct ActivityBus {
    sender: broadcast::Sender<Interaction>,
}

impl ActivityBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publish a signal to every attached listener
    pub fn publish(&self, interaction: Interaction) {
        // no listeners attached is fine
        let _ = self.sender.send(interaction);
    }

    /// Attach a listener
    pub fn subscribe(&self) -> broadcast::Receiver<Interaction> {
        self.sender.subscribe()
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ActivityBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the timestamp of the most recent tracked interaction.
///
/// [`start`](Self::start) attaches a listener to the bus; [`stop`](Self::stop)
/// (or dropping the tracker) detaches it.
pub struct ActivityTracker {
    clock: SharedClock,
    last_activity: Arc<watch::Sender<i64>>,
    listener: Option<JoinHandle<()>>,
}

impl ActivityTracker {
    pub fn new(clock: SharedClock) -> Self {
        let (last_activity, _) = watch::channel(clock.now_ms());
        Self {
            clock,
            last_activity: Arc::new(last_activity),
            listener: None,
        }
    }

    /// Attach to the bus, resetting the activity timestamp to now
    pub fn start(&mut self, bus: &ActivityBus) {
        self.stop();
        self.touch();

        let mut signals = bus.subscribe();
        let clock = Arc::clone(&self.clock);
        let last_activity = Arc::clone(&self.last_activity);

        self.listener = Some(tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(interaction) if interaction.is_tracked() => {
                        last_activity.send_replace(clock.now_ms());
                    }
                    Ok(_) => {}
                    // dropped signals still mean someone was interacting
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        last_activity.send_replace(clock.now_ms());
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Detach from the bus
    pub fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.listener.as_ref().map_or(false, |l| !l.is_finished())
    }

    /// Record activity now, without going through the bus
    pub fn touch(&self) {
        self.last_activity.send_replace(self.clock.now_ms());
    }

    pub fn last_activity_ms(&self) -> i64 {
        *self.last_activity.borrow()
    }

    /// Watch the activity timestamp
    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.last_activity.subscribe()
    }
}

impl Drop for ActivityTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
