use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::{to_bytes, Bytes},
    extract::{FromRequestParts, Query, RawPathParams, Request},
    http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{pool::PoolConnection, PgPool, Postgres};
use uuid::Uuid;

use super::ACTION_TAG;
use crate::auth::AuthIdentity;
use crate::error::ApiError;
use crate::middleware::response::ApiResponse;

/// Body size used when no [`BodyLimit`] extension is installed
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Maximum number of body bytes the dispatcher buffers per request
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit(pub usize);

/// Database pool shared by all requests. Connections are checked out per request.
#[derive(Debug, Clone)]
pub struct ConnectionPool(pub PgPool);

/// Named application settings, installed as a request extension
#[derive(Debug, Clone, Default)]
pub struct AppSettings(Arc<HashMap<String, Value>>);

impl AppSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a setting. Fails when the value cannot be represented as JSON.
    pub fn with(mut self, name: impl Into<String>, value: impl Serialize) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Arc::make_mut(&mut self.0).insert(name.into(), value);
        Ok(self)
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let value = self.0.get(name)?;
        serde_json::from_value(value.clone()).ok()
    }
}

/// Template engine used by [`HttpContext::render`]
pub trait ViewRenderer: Send + Sync {
    fn render(&self, view: &str, model: &Value) -> Result<String, ApiError>;
}

/// Request extension holding the view renderer
#[derive(Clone)]
pub struct ViewEngine(pub Arc<dyn ViewRenderer>);

/// What an action sees of its request. One instance per request.
///
/// [`HttpContext`] is the stock implementation. Custom contexts wrap it and
/// add their own helpers; every accessor below delegates to the wrapped one.
pub trait RequestContext: Clone + Send + Sync + 'static {
    fn from_http(http: HttpContext) -> Self;

    fn http(&self) -> &HttpContext;

    fn auth_user(&self) -> AuthIdentity {
        self.http().auth_user()
    }

    fn param(&self, name: &str) -> Option<String> {
        self.http().param(name)
    }

    fn param_or(&self, name: &str, default: &str) -> String {
        self.http().param_or(name, default)
    }

    fn param_int(&self, name: &str, default: i64) -> i64 {
        self.http().param_int(name, default)
    }

    fn header(&self, name: &str) -> Option<String> {
        self.http().header(name)
    }

    fn set_header(&self, name: &str, value: &str) -> Result<(), ApiError> {
        self.http().set_header(name, value)
    }

    fn body<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        self.http().body()
    }

    fn setting<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.http().setting(name)
    }

    fn conn(&self) -> Option<ConnectionPool> {
        self.http().conn()
    }

    fn send_data<T: Serialize>(&self, data: T) -> bool {
        self.http().send_data(data)
    }

    fn send_error(&self, reason: ApiError) -> bool {
        self.http().send_error(reason)
    }

    fn send_media(&self, mime: &str, data: impl Into<Bytes>) -> bool {
        self.http().send_media(mime, data)
    }

    fn send_status(&self, status: StatusCode) -> bool {
        self.http().send_status(status)
    }

    fn render<T: Serialize>(&self, view: &str, model: T) -> bool {
        self.http().render(view, model)
    }

    fn has_responded(&self) -> bool {
        self.http().has_responded()
    }

    fn take_response(&self) -> Option<Response> {
        self.http().take_response()
    }
}

#[derive(Default)]
struct ResponseSlot {
    response: Option<Response>,
    headers: HeaderMap,
    sent: bool,
}

struct Inner {
    request_id: Uuid,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    extensions: Extensions,
    path_params: Vec<(String, String)>,
    query: HashMap<String, String>,
    body: Bytes,
    slot: Mutex<ResponseSlot>,
}

/// Context over an axum request. Cheap to clone; clones share one response slot.
#[derive(Clone)]
pub struct HttpContext {
    inner: Arc<Inner>,
}

impl HttpContext {
    /// Buffer the request and capture everything an action may ask for
    pub async fn from_request(request: Request) -> Result<Self, ApiError> {
        let (mut parts, body) = request.into_parts();

        let path_params = match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(params) => params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            Err(_) => Vec::new(),
        };

        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();

        let limit = parts
            .extensions
            .get::<BodyLimit>()
            .map(|limit| limit.0)
            .unwrap_or(DEFAULT_BODY_LIMIT);
        let body = to_bytes(body, limit).await.map_err(|e| {
            tracing::debug!(target: ACTION_TAG, "Failed to buffer body of {}: {}", parts.uri, e);
            ApiError::payload_too_large(format!("Request body exceeds {} bytes or could not be read", limit))
        })?;

        let request_id = Uuid::new_v4();
        tracing::debug!(target: ACTION_TAG, "Context {} for {} {}", request_id, parts.method, parts.uri);

        Ok(Self {
            inner: Arc::new(Inner {
                request_id,
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                extensions: parts.extensions,
                path_params,
                query,
                body,
                slot: Mutex::new(ResponseSlot::default()),
            }),
        })
    }

    pub fn request_id(&self) -> Uuid {
        self.inner.request_id
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    /// Identity installed by the auth gate, the anonymous user if there is none
    pub fn auth_user(&self) -> AuthIdentity {
        self.extension::<AuthIdentity>().unwrap_or_else(AuthIdentity::anonymous)
    }

    /// Any value a layer put into the request extensions
    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner.extensions.get::<T>().cloned()
    }

    /// Path parameter, falling back to the query string.
    ///
    /// A numeric name addresses path parameters by position and never falls back.
    pub fn param(&self, name: &str) -> Option<String> {
        if let Ok(index) = name.parse::<usize>() {
            return self.inner.path_params.get(index).map(|(_, value)| value.clone());
        }

        self.inner
            .path_params
            .iter()
            .find(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.clone())
            .or_else(|| self.query(name))
    }

    pub fn param_or(&self, name: &str, default: &str) -> String {
        self.param(name).unwrap_or_else(|| default.to_string())
    }

    pub fn param_int(&self, name: &str, default: i64) -> i64 {
        self.param(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.inner.query.get(name).cloned()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.inner
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Header added to whatever response the action emits
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), ApiError> {
        let name = HeaderName::try_from(name)
            .map_err(|e| ApiError::internal_server_error(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| ApiError::internal_server_error(format!("Invalid header value: {}", e)))?;

        self.slot().headers.insert(name, value);
        Ok(())
    }

    /// Decode the JSON body
    pub fn body<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.inner.body).map_err(|e| ApiError::invalid_json(e.to_string()))
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.inner.body
    }

    pub fn setting<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.inner.extensions.get::<AppSettings>()?.get(name)
    }

    pub fn conn(&self) -> Option<ConnectionPool> {
        self.extension::<ConnectionPool>()
    }

    /// Check out a pooled connection. It goes back to the pool when dropped.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, ApiError> {
        let ConnectionPool(pool) = self
            .conn()
            .ok_or_else(|| ApiError::service_unavailable("No database connection configured"))?;
        Ok(pool.acquire().await?)
    }

    pub fn send_data<T: Serialize>(&self, data: T) -> bool {
        match ApiResponse::success(data) {
            Ok(envelope) => self.emit(envelope.into_response()),
            Err(e) => {
                tracing::error!(target: ACTION_TAG, "Failed to serialize response data: {}", e);
                self.emit(ApiError::internal_server_error("Failed to serialize response data").into_response())
            }
        }
    }

    pub fn send_error(&self, reason: ApiError) -> bool {
        self.emit(reason.into_response())
    }

    pub fn send_media(&self, mime: &str, data: impl Into<Bytes>) -> bool {
        match HeaderValue::try_from(mime) {
            Ok(content_type) => {
                let body: Bytes = data.into();
                self.emit(([(header::CONTENT_TYPE, content_type)], body).into_response())
            }
            Err(_) => self.send_error(ApiError::internal_server_error(format!("Invalid media type '{}'", mime))),
        }
    }

    pub fn send_status(&self, status: StatusCode) -> bool {
        self.emit(status.into_response())
    }

    /// Render a view through the installed [`ViewEngine`] and send it as HTML
    pub fn render<T: Serialize>(&self, view: &str, model: T) -> bool {
        let Some(ViewEngine(engine)) = self.extension::<ViewEngine>() else {
            return self.send_error(ApiError::internal_server_error("No view engine configured"));
        };

        let rendered = serde_json::to_value(model)
            .map_err(|e| ApiError::internal_server_error(format!("Invalid view model: {}", e)))
            .and_then(|model| engine.render(view, &model));

        match rendered {
            Ok(html) => self.emit(Html(html).into_response()),
            Err(reason) => self.send_error(reason),
        }
    }

    pub fn has_responded(&self) -> bool {
        self.slot().sent
    }

    /// Hand the emitted response to the transport, with any headers set by the action
    pub fn take_response(&self) -> Option<Response> {
        let mut slot = self.slot();
        let mut response = slot.response.take()?;
        for (name, value) in slot.headers.drain() {
            if let Some(name) = name {
                response.headers_mut().insert(name, value);
            }
        }
        Some(response)
    }

    /// Store the response unless one was already emitted
    fn emit(&self, response: Response) -> bool {
        let mut slot = self.slot();
        if slot.sent {
            tracing::warn!(
                target: ACTION_TAG,
                "Response already sent for {} {} ({}), dropping status {}",
                self.inner.method,
                self.inner.uri,
                self.inner.request_id,
                response.status()
            );
            return false;
        }

        slot.sent = true;
        slot.response = Some(response);
        true
    }

    fn slot(&self) -> MutexGuard<'_, ResponseSlot> {
        // A panicking action must not take the slot down with it
        self.inner.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RequestContext for HttpContext {
    fn from_http(http: HttpContext) -> Self {
        http
    }

    fn http(&self) -> &HttpContext {
        self
    }
}

impl std::fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContext")
            .field("request_id", &self.inner.request_id)
            .field("method", &self.inner.method)
            .field("uri", &self.inner.uri)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;
    use serde_json::json;

    async fn context(uri: &str, body: &str) -> HttpContext {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-trace", "abc")
            .body(Body::from(body.to_string()))
            .unwrap();
        HttpContext::from_request(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_query_params_and_headers() {
        let ctx = context("/items?page=3&name=box", "").await;
        assert_eq!(ctx.param("name").as_deref(), Some("box"));
        assert_eq!(ctx.param_int("page", 1), 3);
        assert_eq!(ctx.param_int("size", 25), 25);
        assert_eq!(ctx.param_or("missing", "none"), "none");
        assert_eq!(ctx.header("x-trace").as_deref(), Some("abc"));
        assert_eq!(ctx.path(), "/items");
    }

    #[tokio::test]
    async fn test_numeric_name_skips_query() {
        let ctx = context("/items?0=from-query", "").await;
        assert_eq!(ctx.param("0"), None);
    }

    #[tokio::test]
    async fn test_body_decode() {
        #[derive(Deserialize)]
        struct Login {
            user: String,
        }

        let ctx = context("/login", r#"{"user":"anna"}"#).await;
        let login: Login = ctx.body().unwrap();
        assert_eq!(login.user, "anna");
        assert_eq!(ctx.raw_body().len(), 15);

        let broken = context("/login", "{not json").await;
        let err = broken.body::<Login>().err().unwrap();
        assert_eq!(err.error_code(), "INVALID_JSON");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let request = axum::http::Request::builder()
            .uri("/upload")
            .extension(BodyLimit(4))
            .body(Body::from("too long for the limit"))
            .unwrap();
        let err = HttpContext::from_request(request).await.err().unwrap();
        assert_eq!(err.status_code(), 413);
    }

    #[tokio::test]
    async fn test_settings_and_identity() {
        let settings = AppSettings::new()
            .with("page.size", 50)
            .unwrap()
            .with("title", "demo")
            .unwrap();
        let request = axum::http::Request::builder()
            .uri("/")
            .extension(settings)
            .extension(AuthIdentity::new(9, vec!["admin".into()]))
            .body(Body::empty())
            .unwrap();
        let ctx = HttpContext::from_request(request).await.unwrap();

        assert_eq!(ctx.setting::<u32>("page.size"), Some(50));
        assert_eq!(ctx.setting::<String>("title").as_deref(), Some("demo"));
        assert_eq!(ctx.setting::<String>("unknown"), None);
        assert_eq!(ctx.auth_user().user_id, 9);
        assert!(ctx.conn().is_none());
    }

    #[test]
    fn test_settings_reject_non_json_values() {
        let mut by_pair = HashMap::new();
        by_pair.insert((1, 2), "non-string key");
        assert!(AppSettings::new().with("pairs", by_pair).is_err());
    }

    #[tokio::test]
    async fn test_anonymous_without_gate() {
        let ctx = context("/", "").await;
        assert!(ctx.auth_user().is_anonymous());
    }

    #[tokio::test]
    async fn test_acquire_without_pool() {
        let ctx = context("/", "").await;
        let err = ctx.acquire().await.err().unwrap();
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn test_response_is_write_once() {
        let ctx = context("/", "").await;
        assert!(!ctx.has_responded());
        assert!(ctx.send_data(json!({ "id": 1 })));
        assert!(!ctx.send_error(ApiError::bad_request("late")));
        assert!(ctx.has_responded());

        let response = ctx.take_response().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], 1);
    }

    #[tokio::test]
    async fn test_clones_share_response() {
        let ctx = context("/", "").await;
        let clone = ctx.clone();
        clone.send_status(StatusCode::NO_CONTENT);
        assert!(ctx.has_responded());
        assert_eq!(ctx.take_response().unwrap().status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_send_media_and_headers() {
        let ctx = context("/", "").await;
        ctx.set_header("x-request-id", &ctx.request_id().to_string()).unwrap();
        ctx.send_media("image/png", vec![0x89, 0x50, 0x4e, 0x47]);

        let response = ctx.take_response().unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert!(response.headers().contains_key("x-request-id"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_header_name() {
        let ctx = context("/", "").await;
        assert!(ctx.set_header("bad header", "x").is_err());
    }

    struct Greeting;

    impl ViewRenderer for Greeting {
        fn render(&self, view: &str, model: &Value) -> Result<String, ApiError> {
            match view {
                "hello" => Ok(format!("<h1>Hello {}</h1>", model["name"].as_str().unwrap_or("?"))),
                other => Err(ApiError::not_found(format!("Unknown view '{}'", other))),
            }
        }
    }

    #[tokio::test]
    async fn test_render_view() {
        let request = axum::http::Request::builder()
            .uri("/")
            .extension(ViewEngine(Arc::new(Greeting)))
            .body(Body::empty())
            .unwrap();
        let ctx = HttpContext::from_request(request).await.unwrap();
        ctx.render("hello", json!({ "name": "anna" }));

        let response = ctx.take_response().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<h1>Hello anna</h1>");
    }

    #[tokio::test]
    async fn test_render_without_engine() {
        let ctx = context("/", "").await;
        ctx.render("hello", json!({}));
        let response = ctx.take_response().unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
