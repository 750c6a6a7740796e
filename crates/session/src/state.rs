//! Read-only projection of the session for display

use std::time::Duration;

use crate::credential::Credential;

/// Derived session state. Recomputed on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    /// A credential is present and its expiry is in the future or unknown
    pub is_valid: bool,
    /// Time to expiry is below the warning window
    pub is_expiring: bool,
    pub time_until_expiry_ms: Option<i64>,
    pub last_activity_ms: i64,
}

impl SessionState {
    /// State before any credential has been seen
    pub fn initial(now_ms: i64) -> Self {
        Self {
            is_valid: false,
            is_expiring: false,
            time_until_expiry_ms: None,
            last_activity_ms: now_ms,
        }
    }

    /// Compute the state from the current credential and clock readings
    pub fn compute(
        credential: Option<&Credential>,
        now_ms: i64,
        last_activity_ms: i64,
        warning_window: Duration,
    ) -> Self {
        let Some(credential) = credential else {
            return Self {
                last_activity_ms,
                ..Self::initial(now_ms)
            };
        };

        let time_until_expiry_ms = credential.time_until_expiry_ms(now_ms);
        let window_ms = i64::try_from(warning_window.as_millis()).unwrap_or(i64::MAX);

        Self {
            is_valid: time_until_expiry_ms.map_or(true, |t| t > 0),
            is_expiring: time_until_expiry_ms.map_or(false, |t| t < window_ms),
            time_until_expiry_ms,
            last_activity_ms,
        }
    }

    /// Inside the warning window but not yet expired
    pub fn should_warn(&self) -> bool {
        self.is_expiring && self.is_valid && self.time_until_expiry_ms.is_some()
    }
}
