pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod middleware;

pub use auth::{AuthError, AuthIdentity, AuthService, AuthWhitelist};
pub use context::{
    to_route_handler, ActionExecutor, ActionOutcome, ActionPool, ActionRepository, BaseActionPool, HttpContext,
    RequestContext,
};
pub use error::ApiError;
pub use middleware::{auth_gate_middleware, AuthGate, GateDecision};

/// The current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
