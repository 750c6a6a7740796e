//! Configuration options for the portal client

use std::env;
use std::time::Duration;

use msafiri_session::SessionOptions;

use crate::error::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

pub const API_URL_VAR: &str = "MSAFIRI_API_URL";
pub const TENANT_ID_VAR: &str = "MSAFIRI_TENANT_ID";
pub const REQUEST_TIMEOUT_VAR: &str = "MSAFIRI_REQUEST_TIMEOUT_SECS";

/// Configuration options for the portal client
#[derive(Debug, Clone)]
pub struct PortalOptions {
    /// Backend API base, including the version prefix
    pub api_url: String,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Tenant sent as `X-Tenant-ID` on every API request
    pub tenant_id: Option<String>,

    /// Session lifecycle settings
    pub session: SessionOptions,
}

impl Default for PortalOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            tenant_id: None,
            session: SessionOptions::default(),
        }
    }
}

impl PortalOptions {
    /// Defaults overridden by `MSAFIRI_API_URL`, `MSAFIRI_TENANT_ID` and
    /// `MSAFIRI_REQUEST_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(url) = lookup(API_URL_VAR).filter(|v| !v.trim().is_empty()) {
            url::Url::parse(&url)?;
            options.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(tenant) = lookup(TENANT_ID_VAR).filter(|v| !v.trim().is_empty()) {
            options.tenant_id = Some(tenant);
        }

        if let Some(raw) = lookup(REQUEST_TIMEOUT_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::config(format!(
                    "{} must be whole seconds, got {:?}",
                    REQUEST_TIMEOUT_VAR, raw
                ))
            })?;
            options.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(options)
    }

    /// Set the API base URL
    pub fn with_api_url(mut self, value: &str) -> Self {
        self.api_url = value.trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the tenant header value
    pub fn with_tenant_id(mut self, value: &str) -> Self {
        self.tenant_id = Some(value.to_string());
        self
    }

    /// Set the session lifecycle options
    pub fn with_session(mut self, value: SessionOptions) -> Self {
        self.session = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let options = PortalOptions::from_lookup(lookup(&[])).unwrap();
        assert_eq!(options.api_url, DEFAULT_API_URL);
        assert_eq!(options.request_timeout, Some(Duration::from_secs(30)));
        assert!(options.tenant_id.is_none());
        assert_eq!(options.session.login_path, "/login");
    }

    #[test]
    fn test_environment_overrides() {
        let options = PortalOptions::from_lookup(lookup(&[
            (API_URL_VAR, "https://api.msafiri.example/api/v1/"),
            (TENANT_ID_VAR, "msf-oca"),
            (REQUEST_TIMEOUT_VAR, "10"),
        ]))
        .unwrap();

        assert_eq!(options.api_url, "https://api.msafiri.example/api/v1");
        assert_eq!(options.tenant_id.as_deref(), Some("msf-oca"));
        assert_eq!(options.request_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let options = PortalOptions::from_lookup(lookup(&[(REQUEST_TIMEOUT_VAR, "0")])).unwrap();
        assert!(options.request_timeout.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            PortalOptions::from_lookup(lookup(&[(REQUEST_TIMEOUT_VAR, "soon")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            PortalOptions::from_lookup(lookup(&[(API_URL_VAR, "not a url")])),
            Err(Error::Url(_))
        ));
    }
}
