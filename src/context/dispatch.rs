use std::sync::Arc;

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::future::{BoxFuture, FutureExt};

use super::action::{ActionExecutor, ActionOutcome};
use super::{HttpContext, RequestContext, ACTION_TAG};
use crate::error::ApiError;

/// Turn a named action of a pool or repository into an axum handler.
///
/// ```ignore
/// Router::new().route("/users/:id", get(to_route_handler(repository.clone(), "user.get")))
/// ```
pub fn to_route_handler<E>(
    executor: Arc<E>,
    action_name: impl Into<String>,
) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static
where
    E: ActionExecutor + ?Sized + 'static,
{
    let action_name: Arc<str> = Arc::from(action_name.into());

    move |request: Request| {
        let executor = Arc::clone(&executor);
        let action_name = Arc::clone(&action_name);
        async move { dispatch(executor.as_ref(), &action_name, request).await }.boxed()
    }
}

/// Build the context, execute the action and hand back the one response it emitted.
pub async fn dispatch<E>(executor: &E, action_name: &str, request: Request) -> Response
where
    E: ActionExecutor + ?Sized,
{
    let http = match HttpContext::from_request(request).await {
        Ok(http) => http,
        Err(reason) => return reason.into_response(),
    };
    let ctx = <E::Context as RequestContext>::from_http(http);

    let outcome = executor.execute(action_name, &ctx).await;
    let http = ctx.http();
    match outcome {
        ActionOutcome::Done => {}
        ActionOutcome::NotFound => tracing::warn!(
            target: ACTION_TAG,
            "Unknown action \"{}\" -> \"{}: {}\"",
            action_name,
            http.method(),
            http.uri()
        ),
        ActionOutcome::Failed => tracing::warn!(
            target: ACTION_TAG,
            "Action \"{}\" failed -> \"{}: {}\"",
            action_name,
            http.method(),
            http.uri()
        ),
    }

    match ctx.take_response() {
        Some(response) => response,
        None => {
            tracing::warn!(
                target: ACTION_TAG,
                "Action \"{}\" sent no response -> \"{}: {}\"",
                action_name,
                http.method(),
                http.uri()
            );
            ApiError::no_response("The action did not send a response").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BaseActionPool;
    use axum::{body::Body, http::StatusCode};

    fn request(uri: &str) -> Request {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_returns_emitted_response() {
        let pool = Arc::new(BaseActionPool::new().add_action(
            "ok",
            |ctx: HttpContext| async move {
                ctx.send_status(StatusCode::NO_CONTENT);
                Ok(())
            },
            &[],
        ));

        let handler = to_route_handler(pool, "ok");
        let response = handler(request("/ok")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_silent_action_gets_fallback() {
        let pool = Arc::new(BaseActionPool::new().add_action("silent", |_ctx: HttpContext| async { Ok(()) }, &[]));

        let response = dispatch(pool.as_ref(), "silent", request("/silent")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let pool = Arc::new(BaseActionPool::<HttpContext>::new());
        let response = dispatch(pool.as_ref(), "nope", request("/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
