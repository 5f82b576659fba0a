use thiserror::Error;

/// Authentication errors. `MissingSecret`, `InvalidExpiry` and `InvalidPattern` are wiring-time
/// configuration errors; the rest surface per request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing required parameters: secrets")]
    MissingSecret,

    #[error("Missing init of auth provider")]
    NotInitialized,

    #[error("Auth provider is already initialized")]
    AlreadyInitialized,

    #[error("Invalid token expiry: {0} hours")]
    InvalidExpiry(u64),

    #[error("Invalid whitelist pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Missing auth token")]
    MissingToken,

    #[error("Auth token is invalid: {0}")]
    InvalidToken(String),

    #[error("Auth token has expired")]
    Expired,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
}

impl AuthError {
    /// True for errors that can only happen while wiring the server
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AuthError::MissingSecret
                | AuthError::AlreadyInitialized
                | AuthError::InvalidExpiry(_)
                | AuthError::InvalidPattern { .. }
        )
    }
}
