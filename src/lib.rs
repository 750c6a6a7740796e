//! Msafiri Portal Client Library
//!
//! A Rust client for the Msafiri admin portal backend. Signing in starts a
//! managed session: the access token is renewed before it expires, idle
//! sessions are logged out, and every API request carries the current token
//! and tenant.

pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;

use log::info;
use reqwest::Client;
use std::sync::Arc;

use msafiri_session::{
    Credential, HttpSessionProbe, HttpTokenEndpoint, LocalSession, Navigator, SessionData,
    SessionFramework, SessionManager, SignOutOptions,
};

use crate::auth::Auth;
use crate::config::PortalOptions;
use crate::error::Error;
use crate::fetch::ApiClient;

pub use msafiri_session as session;

/// The main entry point for the portal client
pub struct Portal {
    /// HTTP client shared by every backend call
    pub http_client: Client,
    options: PortalOptions,
    framework: Arc<LocalSession>,
    session: SessionManager,
    api: ApiClient,
    auth: Auth,
}

impl Portal {
    /// Create a new portal client
    ///
    /// # Example
    ///
    /// ```
    /// use msafiri_portal::{Portal, config::PortalOptions};
    ///
    /// let options = PortalOptions::default().with_tenant_id("msf-oca");
    /// let portal = Portal::new(options).unwrap();
    /// assert_eq!(portal.api().tenant_id(), Some("msf-oca"));
    /// ```
    pub fn new(options: PortalOptions) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let framework = Arc::new(LocalSession::new());
        let endpoint = Arc::new(HttpTokenEndpoint::new(
            &options.api_url,
            http_client.clone(),
        ));
        let session = SessionManager::new(framework.clone(), endpoint, options.session.clone());

        let api = ApiClient::new(&options.api_url, http_client.clone(), session.store())
            .with_tenant_id(options.tenant_id.clone());
        let auth = Auth::new(api.clone());

        Ok(Self {
            http_client,
            options,
            framework,
            session,
            api,
            auth,
        })
    }

    /// Create a portal client configured from the environment
    pub fn from_env() -> Result<Self, Error> {
        Self::new(PortalOptions::from_env()?)
    }

    /// Deliver forced-logout redirects to `navigator`
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.session = self.session.with_navigator(navigator);
        self
    }

    /// Probe `GET /users/me` periodically and on focus
    pub fn with_health_check(mut self) -> Self {
        let probe = HttpSessionProbe::new(&self.options.api_url, self.http_client.clone());
        self.session = self.session.with_probe(Arc::new(probe));
        self
    }

    /// Start following the session
    pub fn start(&mut self) {
        self.session.start();
    }

    /// Stop every session timer
    pub fn stop(&mut self) {
        self.session.stop();
    }

    /// Log in and establish the session
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        tenant_slug: Option<&str>,
    ) -> Result<SessionData, Error> {
        let data = self.auth.sign_in(email, password, tenant_slug).await?;

        self.session
            .store()
            .set(Credential::new(data.user.access_token.as_str()));
        self.framework.sign_in(data.clone()).await?;

        Ok(data)
    }

    /// End the session at the user's request
    pub async fn sign_out(&self) -> Result<(), Error> {
        self.session.store().clear();
        self.framework
            .sign_out(SignOutOptions {
                redirect: true,
                callback_url: self.options.session.login_path.clone(),
            })
            .await?;
        info!("Signed out");
        Ok(())
    }

    /// Get a reference to the auth client
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Get a reference to the tenant-aware API client
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Get a reference to the session lifecycle manager
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The in-process session object
    pub fn framework(&self) -> Arc<LocalSession> {
        Arc::clone(&self.framework)
    }

    pub fn options(&self) -> &PortalOptions {
        &self.options
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::auth::{LoginResponse, User, UserRole};
    pub use crate::config::PortalOptions;
    pub use crate::error::Error;
    pub use crate::fetch::ApiClient;
    pub use crate::Portal;
    pub use msafiri_session::{LogoutReason, SessionEvent, SessionOptions};
}
