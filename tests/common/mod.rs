#![allow(dead_code)]

use std::sync::Arc;

use action_context::{
    auth_gate_middleware, config::AuthConfig, to_route_handler, ActionExecutor, AuthGate, HttpContext,
};
use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    middleware,
    routing::any,
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret";

pub const WHITE_LIST: &[&str] = &["/about", "/text/*", "/text/*:d/details", "/public/*:all"];

pub fn auth_config(verify_rigorous: bool) -> AuthConfig {
    AuthConfig {
        secrets: SECRET.to_string(),
        white_list: WHITE_LIST.iter().map(|p| p.to_string()).collect(),
        verify_rigorous,
        token_expiry_hours: 1,
    }
}

pub fn gate(verify_rigorous: bool) -> Arc<AuthGate> {
    Arc::new(AuthGate::new(&auth_config(verify_rigorous)).expect("valid auth config"))
}

/// Router mapping each `(path, action)` pair onto the executor, behind the auth gate
pub fn app<E>(gate: Arc<AuthGate>, executor: Arc<E>, routes: &[(&str, &str)]) -> Router
where
    E: ActionExecutor<Context = HttpContext> + 'static,
{
    let mut router = Router::new();
    for (path, action) in routes {
        router = router.route(path, any(to_route_handler(executor.clone(), *action)));
    }
    router.layer(middleware::from_fn_with_state(gate, auth_gate_middleware))
}

pub fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::empty()).expect("request")
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Run one request through the router; the body is parsed as JSON when present
pub async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;

    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body: {:?}", bytes))?
    };
    Ok((status, body))
}

pub fn bearer(gate: &AuthGate, user_id: i64, roles: &[&str]) -> String {
    let token = gate
        .service()
        .issue(user_id, roles.iter().map(|r| r.to_string()).collect())
        .expect("token");
    format!("Bearer {}", token)
}
