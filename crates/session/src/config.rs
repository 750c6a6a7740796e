//! Configuration options for the session lifecycle

use std::time::Duration;

use crate::credential::Credential;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// How the proactive renewal delay is derived from a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalTiming {
    /// Renew a fixed time after the credential is installed
    FixedLead(Duration),
    /// Renew `buffer` before the decoded expiry; use `fallback` when the
    /// expiry cannot be decoded
    BeforeExpiry { buffer: Duration, fallback: Duration },
}

impl RenewalTiming {
    /// Delay until renewal for a credential observed at `now_ms`
    pub fn delay_for(&self, credential: &Credential, now_ms: i64) -> Duration {
        match *self {
            RenewalTiming::FixedLead(lead) => lead,
            RenewalTiming::BeforeExpiry { buffer, fallback } => {
                match credential.time_until_expiry_ms(now_ms) {
                    Some(remaining) => {
                        let buffer_ms = i64::try_from(buffer.as_millis()).unwrap_or(i64::MAX);
                        let delay_ms = remaining.saturating_sub(buffer_ms).max(0);
                        Duration::from_millis(delay_ms as u64)
                    }
                    None => fallback,
                }
            }
        }
    }
}

impl Default for RenewalTiming {
    fn default() -> Self {
        // backend tokens live four hours
        RenewalTiming::FixedLead(Duration::from_secs(3 * HOUR))
    }
}

/// Dead-man timer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InactivityTimeout {
    /// Quiet period before the warning
    pub warn_after: Duration,
    /// Grace period between the warning and the forced logout
    pub logout_after: Duration,
}

impl Default for InactivityTimeout {
    fn default() -> Self {
        Self {
            warn_after: Duration::from_secs(25 * MINUTE),
            logout_after: Duration::from_secs(5 * MINUTE),
        }
    }
}

/// Configuration options for the session lifecycle
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// When the proactive renewal fires
    pub renewal_timing: RenewalTiming,

    /// Minimum spacing between two renewal attempts
    pub renewal_debounce: Duration,

    /// Upper bound on a single renewal exchange
    pub renewal_timeout: Option<Duration>,

    /// Time-to-expiry below which the session counts as expiring
    pub warning_window: Duration,

    /// Period of the advisory expiry check
    pub expiry_check_interval: Duration,

    /// Inactivity dead-man timer; `None` disables it
    pub inactivity: Option<InactivityTimeout>,

    /// Period of the session probe, when a probe is configured
    pub probe_interval: Duration,

    /// Login entry point used for forced-logout redirects
    pub login_path: String,

    /// Routes that never force a logout
    pub public_routes: Vec<String>,

    /// Route prefixes that never force a logout
    pub public_prefixes: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            renewal_timing: RenewalTiming::default(),
            renewal_debounce: Duration::from_secs(30 * MINUTE),
            renewal_timeout: Some(Duration::from_secs(30)),
            warning_window: Duration::from_secs(5 * MINUTE),
            expiry_check_interval: Duration::from_secs(30),
            inactivity: Some(InactivityTimeout::default()),
            probe_interval: Duration::from_secs(5 * MINUTE),
            login_path: "/login".to_string(),
            public_routes: vec!["/".to_string(), "/login".to_string()],
            public_prefixes: vec![
                "/_next".to_string(),
                "/api".to_string(),
                "/icon".to_string(),
                "/images".to_string(),
            ],
        }
    }
}

impl SessionOptions {
    /// Set the renewal timing
    pub fn with_renewal_timing(mut self, value: RenewalTiming) -> Self {
        self.renewal_timing = value;
        self
    }

    /// Set the renewal debounce window
    pub fn with_renewal_debounce(mut self, value: Duration) -> Self {
        self.renewal_debounce = value;
        self
    }

    /// Set the renewal timeout
    pub fn with_renewal_timeout(mut self, value: Option<Duration>) -> Self {
        self.renewal_timeout = value;
        self
    }

    /// Set the expiry warning window
    pub fn with_warning_window(mut self, value: Duration) -> Self {
        self.warning_window = value;
        self
    }

    /// Set the advisory expiry check interval
    pub fn with_expiry_check_interval(mut self, value: Duration) -> Self {
        self.expiry_check_interval = value;
        self
    }

    /// Set or disable the inactivity timeout
    pub fn with_inactivity(mut self, value: Option<InactivityTimeout>) -> Self {
        self.inactivity = value;
        self
    }

    /// Set the session probe interval
    pub fn with_probe_interval(mut self, value: Duration) -> Self {
        self.probe_interval = value;
        self
    }

    /// Set the login path
    pub fn with_login_path(mut self, value: &str) -> Self {
        self.login_path = value.to_string();
        self
    }

    /// Add a public route
    pub fn with_public_route(mut self, value: &str) -> Self {
        self.public_routes.push(value.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn credential_expiring_in(now_ms: i64, secs: i64) -> Credential {
        let exp = now_ms / 1000 + secs;
        let claims = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(format!(r#"{{"exp":{}}}"#, exp));
        Credential::new(format!("h.{}.s", claims))
    }

    #[test]
    fn test_fixed_lead_ignores_expiry() {
        let timing = RenewalTiming::default();
        let credential = credential_expiring_in(0, 60);
        assert_eq!(timing.delay_for(&credential, 0), Duration::from_secs(3 * HOUR));
    }

    #[test]
    fn test_before_expiry_subtracts_buffer() {
        let timing = RenewalTiming::BeforeExpiry {
            buffer: Duration::from_secs(HOUR),
            fallback: Duration::from_secs(3 * HOUR),
        };

        let credential = credential_expiring_in(0, 4 * 3600);
        assert_eq!(timing.delay_for(&credential, 0), Duration::from_secs(3 * HOUR));

        let nearly_gone = credential_expiring_in(0, 60);
        assert_eq!(timing.delay_for(&nearly_gone, 0), Duration::ZERO);

        let opaque = Credential::new("opaque");
        assert_eq!(timing.delay_for(&opaque, 0), Duration::from_secs(3 * HOUR));
    }
}
