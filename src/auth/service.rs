use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::OnceCell;

use super::{AuthError, AuthIdentity, Claims, AUTH_PREFIX, AUTH_TAG};
use crate::config::AuthConfig;

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

/// Token lifetime for `hours`, if tokens issued now can carry it
fn token_lifetime(hours: u64) -> Result<Duration, AuthError> {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .filter(|lifetime| Utc::now().checked_add_signed(*lifetime).is_some())
        .ok_or(AuthError::InvalidExpiry(hours))
}

/// Issues and verifies bearer tokens.
///
/// Owned by the composition root and handed to whoever needs it. The secret
/// can be set exactly once; every other call fails until it has been.
pub struct AuthService {
    keys: OnceCell<Keys>,
}

impl AuthService {
    pub fn new() -> Self {
        Self { keys: OnceCell::new() }
    }

    /// Create and initialize in one step
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let service = Self::new();
        service.init(config)?;
        Ok(service)
    }

    pub fn init(&self, config: &AuthConfig) -> Result<(), AuthError> {
        let secrets = config.secrets.trim();
        if secrets.is_empty() {
            return Err(AuthError::MissingSecret);
        }

        let keys = Keys {
            encoding: EncodingKey::from_secret(secrets.as_bytes()),
            decoding: DecodingKey::from_secret(secrets.as_bytes()),
            lifetime: token_lifetime(config.token_expiry_hours)?,
        };
        self.keys.set(keys).map_err(|_| AuthError::AlreadyInitialized)?;

        tracing::debug!(target: AUTH_TAG, "Auth service initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.keys.get().is_some()
    }

    fn keys(&self) -> Result<&Keys, AuthError> {
        self.keys.get().ok_or(AuthError::NotInitialized)
    }

    /// Create a signed token for the given user
    pub fn issue(&self, user_id: i64, roles: Vec<String>) -> Result<String, AuthError> {
        self.issue_identity(&AuthIdentity::new(user_id, roles))
    }

    pub fn issue_identity(&self, identity: &AuthIdentity) -> Result<String, AuthError> {
        let keys = self.keys()?;
        let claims = Claims::new(identity, keys.lifetime)?;

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    /// Verify an `Authorization` header value.
    ///
    /// Returns `Ok(None)` when the value does not use the bearer scheme.
    pub fn verify(&self, header_value: &str) -> Result<Option<AuthIdentity>, AuthError> {
        let keys = self.keys()?;

        let Some(token) = header_value.strip_prefix(AUTH_PREFIX) else {
            return Ok(None);
        };
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidToken("empty token".to_string()));
        }

        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &keys.decoding, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        Ok(Some(data.claims.into()))
    }
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new()
    }
}
