//! Sign-in against the portal backend

mod types;

use log::info;
use reqwest::Method;

use msafiri_session::{LocalSession, SessionData, SessionUser};

use crate::error::Error;
use crate::fetch::ApiClient;

pub use types::*;

const DEFAULT_ROLE: UserRole = UserRole::SuperAdmin;

/// Client for backend authentication
#[derive(Clone)]
pub struct Auth {
    api: ApiClient,
}

impl Auth {
    pub(crate) fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Exchange email and password for an access token.
    ///
    /// With a `tenant_slug` the tenant login endpoint is used with a JSON
    /// body; otherwise the standard form-encoded login.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        tenant_slug: Option<&str>,
    ) -> Result<LoginResponse, Error> {
        let response = match tenant_slug {
            Some(tenant_slug) => {
                let body = TenantLoginRequest {
                    email,
                    password,
                    tenant_slug,
                };
                self.api
                    .anonymous(Method::POST, "/auth/login/tenant")
                    .skip_auth_error()
                    .json(&body)?
                    .execute::<LoginResponse>()
                    .await?
            }
            None => {
                self.api
                    .anonymous(Method::POST, "/auth/login")
                    .skip_auth_error()
                    .form(&[("username", email), ("password", password)])
                    .execute::<LoginResponse>()
                    .await?
            }
        };

        if response.access_token.trim().is_empty() {
            return Err(Error::auth("Login response carried no access token"));
        }

        Ok(response)
    }

    /// Log in and build the session object for the signed-in user
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        tenant_slug: Option<&str>,
    ) -> Result<SessionData, Error> {
        let response = self.login(email, password, tenant_slug).await?;
        info!("Signed in {}", email);
        Ok(session_data(email, response))
    }

    /// The user the current credential belongs to
    pub async fn current_user(&self) -> Result<User, Error> {
        self.api.get("/users/me").execute::<User>().await
    }
}

/// Session object for a successful login
pub fn session_data(email: &str, response: LoginResponse) -> SessionData {
    let name = response
        .full_name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());

    LocalSession::session_for(SessionUser {
        id: response.user_id.unwrap_or(1).to_string(),
        email: email.to_string(),
        name: Some(name),
        role: Some(
            response
                .role
                .unwrap_or_else(|| DEFAULT_ROLE.as_str().to_string()),
        ),
        tenant_id: response.tenant_id,
        access_token: response.access_token,
        first_login: response.first_login,
        must_change_password: response.must_change_password,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: serde_json::Value) -> LoginResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_session_data_from_full_response() {
        let data = session_data(
            "admin@msf.org",
            response(serde_json::json!({
                "access_token": "token-1",
                "token_type": "bearer",
                "user_id": 12,
                "full_name": "Amina Otieno",
                "role": "MT_ADMIN",
                "tenant_id": "msf-oca",
                "first_login": true,
                "must_change_password": true
            })),
        );

        assert_eq!(data.user.id, "12");
        assert_eq!(data.user.name.as_deref(), Some("Amina Otieno"));
        assert_eq!(data.user.role.as_deref(), Some("MT_ADMIN"));
        assert_eq!(data.user.tenant_id.as_deref(), Some("msf-oca"));
        assert_eq!(data.user.access_token, "token-1");
        assert!(data.user.first_login);
        assert!(data.user.must_change_password);
        assert!(data.expires > chrono::Utc::now() + chrono::Duration::hours(23));
    }

    #[test]
    fn test_session_data_defaults() {
        let data = session_data(
            "field.coordinator@msf.org",
            response(serde_json::json!({ "access_token": "token-2" })),
        );

        assert_eq!(data.user.id, "1");
        assert_eq!(data.user.name.as_deref(), Some("field.coordinator"));
        assert_eq!(data.user.role.as_deref(), Some("SUPER_ADMIN"));
        assert!(data.user.tenant_id.is_none());
        assert!(!data.user.first_login);
    }

    #[test]
    fn test_role_names() {
        let role: UserRole = serde_json::from_str("\"EVENT_ADMIN\"").unwrap();
        assert_eq!(role, UserRole::EventAdmin);
        assert_eq!(role.as_str(), "EVENT_ADMIN");
        assert!(role.is_admin());
        assert!(!UserRole::Visitor.is_admin());
    }
}
