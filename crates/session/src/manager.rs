//! Session lifecycle manager: wires the store, trackers, timers and the
//! logout coordinator to a session framework.

use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::activity::{ActivityBus, ActivityTracker};
use crate::clock::{SharedClock, SystemClock};
use crate::config::SessionOptions;
use crate::credential::{Credential, CredentialStore};
use crate::error::SessionError;
use crate::events::{self, EventSender, SessionEvent};
use crate::framework::{Navigator, SessionFramework, SessionStatus};
use crate::health::{HealthCheck, SessionProbe};
use crate::inactivity::InactivityMonitor;
use crate::logout::{LogoutCoordinator, LogoutReason, RouteGuard};
use crate::monitor::ExpiryMonitor;
use crate::renewal::{RenewalExecutor, TokenEndpoint};
use crate::scheduler::{ExpiryScheduler, SchedulerPhase};
use crate::state::SessionState;

/// Components that only run while the session is authenticated
struct Lifecycle {
    bus: ActivityBus,
    tracker: ActivityTracker,
    scheduler: ExpiryScheduler,
    monitor: ExpiryMonitor,
    inactivity: Option<InactivityMonitor>,
    health: Option<HealthCheck>,
    active: bool,
}

impl Lifecycle {
    fn activate(&mut self) {
        if self.active {
            return;
        }
        self.active = true;

        self.tracker.start(&self.bus);
        self.scheduler.start();
        self.monitor.start(self.tracker.subscribe());
        if let Some(ref mut inactivity) = self.inactivity {
            inactivity.start(self.tracker.subscribe());
        }
        if let Some(ref mut health) = self.health {
            health.start(&self.bus);
        }
        debug!("Session lifecycle active");
    }

    fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        self.tracker.stop();
        self.scheduler.stop();
        self.monitor.stop();
        if let Some(ref mut inactivity) = self.inactivity {
            inactivity.stop();
        }
        if let Some(ref mut health) = self.health {
            health.stop();
        }
        debug!("Session lifecycle stopped");
    }
}

fn coordinator_for(
    options: &SessionOptions,
    store: &CredentialStore,
    framework: &Arc<dyn SessionFramework>,
    navigator: Option<Arc<dyn Navigator>>,
    events: &EventSender,
) -> Arc<LogoutCoordinator> {
    Arc::new(LogoutCoordinator::new(
        store.clone(),
        Arc::clone(framework),
        navigator,
        events.clone(),
        RouteGuard::new(options.public_routes.clone(), options.public_prefixes.clone()),
        &options.login_path,
    ))
}

fn lock(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session lifecycle manager.
///
/// Nothing runs until [`start`](Self::start). [`stop`](Self::stop), or dropping
/// the manager, cancels every timer and detaches every listener.
pub struct SessionManager {
    options: SessionOptions,
    clock: SharedClock,
    store: CredentialStore,
    bus: ActivityBus,
    events: EventSender,
    route: Arc<watch::Sender<String>>,
    framework: Arc<dyn SessionFramework>,
    executor: Arc<RenewalExecutor>,
    coordinator: Arc<LogoutCoordinator>,
    probe: Option<Arc<dyn SessionProbe>>,
    lifecycle: Option<Arc<Mutex<Lifecycle>>>,
    supervisor: Option<JoinHandle<()>>,
}

impl SessionManager {
    /// Create a manager on the system clock
    pub fn new(
        framework: Arc<dyn SessionFramework>,
        endpoint: Arc<dyn TokenEndpoint>,
        options: SessionOptions,
    ) -> Self {
        Self::with_clock(framework, endpoint, options, Arc::new(SystemClock))
    }

    /// Create a manager on an explicit clock
    pub fn with_clock(
        framework: Arc<dyn SessionFramework>,
        endpoint: Arc<dyn TokenEndpoint>,
        options: SessionOptions,
        clock: SharedClock,
    ) -> Self {
        let store = CredentialStore::new();
        let events = events::channel();
        let (route, _) = watch::channel("/".to_string());

        let executor = Arc::new(RenewalExecutor::new(
            endpoint,
            store.clone(),
            Arc::clone(&framework),
            events.clone(),
            Arc::clone(&clock),
            options.renewal_timeout,
            options.warning_window,
        ));

        let coordinator = coordinator_for(&options, &store, &framework, None, &events);

        Self {
            coordinator,
            options,
            clock,
            store,
            bus: ActivityBus::new(),
            events,
            route: Arc::new(route),
            framework,
            executor,
            probe: None,
            lifecycle: None,
            supervisor: None,
        }
    }

    /// Deliver forced-logout redirects to `navigator`
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.coordinator = coordinator_for(
            &self.options,
            &self.store,
            &self.framework,
            Some(navigator),
            &self.events,
        );
        self
    }

    /// Probe the backend periodically and on focus
    pub fn with_probe(mut self, probe: Arc<dyn SessionProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    fn build_lifecycle(&self) -> Lifecycle {
        let options = &self.options;

        Lifecycle {
            bus: self.bus.clone(),
            tracker: ActivityTracker::new(Arc::clone(&self.clock)),
            scheduler: ExpiryScheduler::new(
                options.renewal_timing,
                options.renewal_debounce,
                Arc::clone(&self.clock),
                self.store.clone(),
                Arc::clone(&self.executor),
                self.events.clone(),
            ),
            monitor: ExpiryMonitor::new(
                options.expiry_check_interval,
                options.warning_window,
                Arc::clone(&self.clock),
                self.store.clone(),
                Arc::clone(&self.framework),
                self.events.clone(),
            ),
            inactivity: options.inactivity.map(|timeout| {
                InactivityMonitor::new(timeout, Arc::clone(&self.coordinator), self.events.clone())
            }),
            health: self.probe.as_ref().map(|probe| {
                HealthCheck::new(
                    Arc::clone(probe),
                    self.store.clone(),
                    Arc::clone(&self.coordinator),
                    options.probe_interval,
                )
            }),
            active: false,
        }
    }

    /// Follow the session framework
    pub fn start(&mut self) {
        self.stop();

        let lifecycle = Arc::new(Mutex::new(self.build_lifecycle()));
        self.lifecycle = Some(Arc::clone(&lifecycle));

        let status = self.framework.status();
        let route = self.route.subscribe();
        let store = self.store.clone();
        let coordinator = Arc::clone(&self.coordinator);

        self.supervisor = Some(tokio::spawn(supervise(
            status,
            route,
            store,
            coordinator,
            lifecycle,
        )));
    }

    /// Cancel every timer and detach every listener
    pub fn stop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
        if let Some(lifecycle) = self.lifecycle.take() {
            lock(&lifecycle).deactivate();
        }
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.as_ref().map_or(false, |s| !s.is_finished())
    }

    /// True while the authenticated components are running
    pub fn is_active(&self) -> bool {
        self.lifecycle.as_ref().map_or(false, |l| lock(l).active)
    }

    /// Handle for the networking layer
    pub fn store(&self) -> CredentialStore {
        self.store.clone()
    }

    /// Where the host publishes interaction signals
    pub fn activity(&self) -> ActivityBus {
        self.bus.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Report the route currently displayed
    pub fn set_route(&self, path: &str) {
        self.route.send_replace(path.to_string());
    }

    pub fn session_state(&self) -> SessionState {
        let now = self.clock.now_ms();
        let last_activity = self
            .lifecycle
            .as_ref()
            .map_or(now, |l| lock(l).tracker.last_activity_ms());
        SessionState::compute(
            self.store.get().as_ref(),
            now,
            last_activity,
            self.options.warning_window,
        )
    }

    pub fn scheduler_phase(&self) -> SchedulerPhase {
        self.lifecycle
            .as_ref()
            .map_or(SchedulerPhase::Idle, |l| lock(l).scheduler.phase())
    }

    /// Live renewal timers, 0 or 1
    pub fn pending_renewals(&self) -> usize {
        self.lifecycle
            .as_ref()
            .map_or(0, |l| lock(l).scheduler.pending_timers())
    }

    /// Renew immediately, as the "stay logged in" action does
    pub async fn renew_now(&self) -> Result<Credential, SessionError> {
        let current = self.store.get().ok_or(SessionError::MissingCredential)?;
        self.executor.renew(&current).await
    }

    /// Current token, renewed first if it is about to expire
    pub async fn valid_token(&self) -> Option<String> {
        self.executor.valid_token().await
    }

    pub async fn force_logout(&self, reason: LogoutReason) -> bool {
        self.coordinator.force_logout(reason).await
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn supervise(
    mut status: watch::Receiver<SessionStatus>,
    mut route: watch::Receiver<String>,
    store: CredentialStore,
    coordinator: Arc<LogoutCoordinator>,
    lifecycle: Arc<Mutex<Lifecycle>>,
) {
    // session token last copied into the store; renewals may have moved the store on since
    let mut installed: Option<String> = None;

    loop {
        let current = status.borrow_and_update().clone();
        let path = route.borrow_and_update().clone();

        match current {
            SessionStatus::Authenticated(ref session) => {
                let token = &session.user.access_token;
                if installed.as_ref() != Some(token) {
                    store.set(Credential::new(token.as_str()));
                    installed = Some(token.clone());
                }
                let mut components = lock(&lifecycle);
                if !components.active {
                    coordinator.rearm();
                    components.activate();
                }
            }
            SessionStatus::Unauthenticated => {
                installed = None;
                lock(&lifecycle).deactivate();
                store.clear();
                coordinator.on_status(&current, &path).await;
            }
            SessionStatus::Loading => {}
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = route.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
