//! Session lifecycle for the Msafiri admin portal
//!
//! This crate keeps a bearer credential alive for as long as the user is
//! around, and ends the session when they are not:
//!
//! - [`CredentialStore`] holds the current token; API clients read it per request.
//! - [`introspect`] decodes the token's expiry without verifying it.
//! - [`ActivityTracker`] records the last user interaction published on an [`ActivityBus`].
//! - [`ExpiryScheduler`] arms a single proactive renewal timer per session.
//! - [`RenewalExecutor`] exchanges the token and installs the result.
//! - [`LogoutCoordinator`] signs out and redirects on inactivity or lost sessions.
//!
//! [`SessionManager`] wires all of them to a [`SessionFramework`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use msafiri_session::{HttpTokenEndpoint, LocalSession, SessionManager, SessionOptions};
//!
//! # async fn run() {
//! let framework = Arc::new(LocalSession::new());
//! let endpoint = Arc::new(HttpTokenEndpoint::new(
//!     "http://localhost:8000/api/v1",
//!     reqwest::Client::new(),
//! ));
//!
//! let mut manager = SessionManager::new(framework, endpoint, SessionOptions::default());
//! manager.start();
//! manager.set_route("/dashboard");
//! # }
//! ```

pub mod activity;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod framework;
pub mod health;
pub mod inactivity;
pub mod introspect;
pub mod logout;
pub mod manager;
pub mod monitor;
pub mod renewal;
pub mod scheduler;
pub mod state;

pub use activity::{ActivityBus, ActivityTracker, Interaction};
pub use clock::{Clock, RuntimeClock, SharedClock, SystemClock};
pub use config::{InactivityTimeout, RenewalTiming, SessionOptions};
pub use credential::{Credential, CredentialStore};
pub use error::SessionError;
pub use events::{EventSender, SessionEvent};
pub use framework::{
    LocalSession, Navigator, SessionData, SessionFramework, SessionPatch, SessionStatus,
    SessionUser, SignOutOptions,
};
pub use health::{HealthCheck, HttpSessionProbe, ProbeOutcome, SessionProbe};
pub use inactivity::InactivityMonitor;
pub use logout::{ExpiryNotice, LogoutCoordinator, LogoutReason, RouteGuard};
pub use manager::SessionManager;
pub use monitor::ExpiryMonitor;
pub use renewal::{HttpTokenEndpoint, RefreshResponse, RenewalExecutor, TokenEndpoint};
pub use scheduler::{ExpiryScheduler, SchedulerPhase};
pub use state::SessionState;
