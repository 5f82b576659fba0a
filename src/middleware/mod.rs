pub mod auth;
pub mod response;

pub use auth::{auth_gate_middleware, AuthGate, GateDecision};
pub use response::ApiResponse;
