//! Types for backend authentication

use serde::{Deserialize, Serialize};

/// Response of `POST /auth/login` and `POST /auth/login/tenant`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// The access token
    pub access_token: String,

    /// The token type, normally `bearer`
    #[serde(default)]
    pub token_type: Option<String>,

    /// Numeric user id
    #[serde(default)]
    pub user_id: Option<i64>,

    #[serde(default)]
    pub full_name: Option<String>,

    /// Role name as sent by the backend
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Whether this is the user's first sign-in
    #[serde(default)]
    pub first_login: bool,

    #[serde(default)]
    pub must_change_password: bool,

    #[serde(default)]
    pub welcome_message: Option<String>,
}

/// Body of a tenant-scoped login
#[derive(Debug, Clone, Serialize)]
pub struct TenantLoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub tenant_slug: &'a str,
}

/// Portal roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SuperAdmin,
    MtAdmin,
    HrAdmin,
    EventAdmin,
    Visitor,
    Guest,
    Staff,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "SUPER_ADMIN",
            UserRole::MtAdmin => "MT_ADMIN",
            UserRole::HrAdmin => "HR_ADMIN",
            UserRole::EventAdmin => "EVENT_ADMIN",
            UserRole::Visitor => "VISITOR",
            UserRole::Guest => "GUEST",
            UserRole::Staff => "STAFF",
        }
    }

    /// Roles allowed into the admin portal
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            UserRole::SuperAdmin | UserRole::MtAdmin | UserRole::HrAdmin | UserRole::EventAdmin
        )
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    PendingApproval,
    Inactive,
    Suspended,
}

/// User record as returned by `GET /users/me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    #[serde(default)]
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
}
