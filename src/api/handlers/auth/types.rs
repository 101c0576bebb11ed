//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{
    store::{DeviceSession, User},
    utils::display_name_fallback,
    IssuedCredentials, Principal,
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailCodeRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailCodeResponse {
    pub challenge_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailCodeVerifyRequest {
    pub challenge_id: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl From<&IssuedCredentials> for AccessTokenResponse {
    fn from(issued: &IssuedCredentials) -> Self {
        Self {
            access_token: issued.access_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: issued.access_expires_in,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    pub trainer_unlocked: bool,
    /// Admin id when this is an impersonation session.
    pub impersonated_by: Option<i64>,
}

impl From<&Principal> for MeResponse {
    fn from(principal: &Principal) -> Self {
        let user = &principal.user;
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user
                .display_name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| display_name_fallback(&user.email)),
            is_admin: user.is_admin,
            trainer_unlocked: user.trainer_unlocked,
            impersonated_by: principal.session.impersonated_by,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionView {
    pub id: String,
    pub device_label: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
    pub last_used_at: String,
    pub impersonated: bool,
}

impl From<&DeviceSession> for SessionView {
    fn from(session: &DeviceSession) -> Self {
        Self {
            id: session.id.to_string(),
            device_label: session.device_label.clone(),
            ip: session.ip.clone(),
            user_agent: session.user_agent.clone(),
            created_at: session.created_at.to_rfc3339(),
            last_used_at: session.last_used_at.to_rfc3339(),
            impersonated: session.impersonated_by.is_some(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionView>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RevokeAllResponse {
    pub revoked: u64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.display_name.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ImpersonateIssueRequest {
    pub user_id: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ImpersonateIssueResponse {
    pub url: String,
    pub expires_at: String,
    pub user: UserSummary,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ImpersonateConsumeRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ImpersonateConsumeResponse {
    pub admin_id: Option<i64>,
    pub user: UserSummary,
}

#[derive(Deserialize, Debug)]
pub struct OAuthStartQuery {
    pub next: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}
