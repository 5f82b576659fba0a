use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::{AuthError, AuthIdentity, AuthService, AuthWhitelist, AUTH_HEADER_NAME, AUTH_TAG};
use crate::config::AuthConfig;
use crate::error::ApiError;

/// Result of running one request through the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Identity to attach; the pipeline proceeds
    Continue(AuthIdentity),
    /// Error to send; the pipeline stops
    Rejected(AuthError),
}

/// Decides per request whether it may proceed and under which identity.
///
/// Without a usable token a request still proceeds as the anonymous user
/// when its path is white-listed or the gate is not rigorous.
pub struct AuthGate {
    white_list: AuthWhitelist,
    service: Arc<AuthService>,
    verify_rigorous: bool,
}

impl AuthGate {
    /// Build the gate and its token service. Fails on a missing secret or a bad pattern.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let service = Arc::new(AuthService::from_config(config)?);
        Self::with_service(service, &config.white_list, config.verify_rigorous)
    }

    /// Build the gate around an already initialized service
    pub fn with_service<S: AsRef<str>>(
        service: Arc<AuthService>,
        white_list: &[S],
        verify_rigorous: bool,
    ) -> Result<Self, AuthError> {
        if !service.is_initialized() {
            return Err(AuthError::NotInitialized);
        }

        Ok(Self {
            white_list: AuthWhitelist::new(white_list)?,
            service,
            verify_rigorous,
        })
    }

    pub fn service(&self) -> &Arc<AuthService> {
        &self.service
    }

    pub fn white_list(&self) -> &AuthWhitelist {
        &self.white_list
    }

    pub fn is_rigorous(&self) -> bool {
        self.verify_rigorous
    }

    /// Single authentication attempt for `path` with the raw header value
    pub fn decide(&self, path: &str, credential: Option<&str>) -> GateDecision {
        let Some(credential) = credential.map(str::trim).filter(|c| !c.is_empty()) else {
            return self.fallback(path, AuthError::MissingToken);
        };

        match self.service.verify(credential) {
            Ok(Some(identity)) => GateDecision::Continue(identity),
            Ok(None) => self.fallback(path, AuthError::InvalidToken("not a bearer token".to_string())),
            Err(err) => {
                tracing::debug!(target: AUTH_TAG, "Token verification failed for {}: {}", path, err);
                self.fallback(path, err)
            }
        }
    }

    fn fallback(&self, path: &str, reason: AuthError) -> GateDecision {
        if self.white_list.verify(path) || !self.verify_rigorous {
            return GateDecision::Continue(AuthIdentity::anonymous());
        }

        match reason {
            AuthError::MissingToken => {
                tracing::warn!(target: AUTH_TAG, "Missing auth token: {}", path)
            }
            _ => tracing::warn!(target: AUTH_TAG, "Auth token is invalid: {}", path),
        }
        GateDecision::Rejected(reason)
    }
}

/// Axum middleware running the gate; install with `middleware::from_fn_with_state`.
pub async fn auth_gate_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    let decision = {
        let credential = request
            .headers()
            .get(AUTH_HEADER_NAME)
            .and_then(|value| value.to_str().ok());
        // Nested routers see a stripped uri; white-list patterns are full request paths
        let path = match request.extensions().get::<OriginalUri>() {
            Some(OriginalUri(original)) => original.path(),
            None => request.uri().path(),
        };
        gate.decide(path, credential)
    };

    match decision {
        GateDecision::Continue(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        GateDecision::Rejected(reason) => ApiError::from(reason).into_response(),
    }
}

/// Plain axum handlers can take the gate's identity as an argument
#[async_trait]
impl<S> FromRequestParts<S> for AuthIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthIdentity>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}
