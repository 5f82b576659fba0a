// Authentication: path whitelist, token service and the identity they produce

pub mod error;
pub mod service;
pub mod whitelist;

pub use error::AuthError;
pub use service::AuthService;
pub use whitelist::{AuthWhitelist, PathPattern};

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

/// Log target for everything authentication related
pub const AUTH_TAG: &str = "auth";

/// Request header carrying the bearer credential
pub const AUTH_HEADER_NAME: &str = "authorization";

/// Scheme prefix expected in front of the token
pub const AUTH_PREFIX: &str = "Bearer";

/// The principal attached to a request, either from a verified token
/// or the anonymous fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthIdentity {
    pub user_id: i64,
    pub roles: Vec<String>,
}

impl AuthIdentity {
    pub fn new(user_id: i64, roles: Vec<String>) -> Self {
        Self { user_id, roles }
    }

    /// The dummy user installed for white-listed or non-rigorous requests
    pub fn anonymous() -> Self {
        Self {
            user_id: -1,
            roles: Vec::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id == -1 && self.roles.is_empty()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// JWT payload: `{ userId, roles, iat, exp }`. Tokens without `exp` are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(identity: &AuthIdentity, lifetime: Duration) -> Result<Self, AuthError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(lifetime)
            .ok_or_else(|| AuthError::TokenGeneration("token expiry out of range".to_string()))?;

        Ok(Self {
            user_id: identity.user_id,
            roles: identity.roles.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        })
    }
}

impl From<Claims> for AuthIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            roles: claims.roles,
        }
    }
}
