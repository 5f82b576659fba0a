use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use super::{RequestContext, ACTION_TAG};
use crate::error::ApiError;

/// What an action returns. `Err` is turned into the error response.
pub type ActionResult = Result<(), ApiError>;

/// Type-erased action function
pub type ActionFn<C> = Arc<dyn Fn(C) -> BoxFuture<'static, ActionResult> + Send + Sync>;

/// An entry of an action pool
pub struct ActionItem<C> {
    /// The name of the action
    pub name: String,
    /// Roles the action is meant for. Stored only; dispatch does not enforce them.
    pub roles: Vec<String>,
    /// The action function
    pub action: ActionFn<C>,
}

impl<C: RequestContext> ActionItem<C> {
    pub fn new<F, Fut>(name: impl Into<String>, action: F, roles: &[&str]) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            roles: roles.iter().map(|role| role.to_string()).collect(),
            action: Arc::new(move |ctx: C| action(ctx).boxed()),
        }
    }

    /// Run the action, turning a returned error or a panic into the error response
    pub async fn invoke(&self, ctx: &C) -> ActionOutcome {
        let result = AssertUnwindSafe(async { (self.action)(ctx.clone()).await })
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(())) => ActionOutcome::Done,
            Ok(Err(reason)) => {
                tracing::warn!(target: ACTION_TAG, "Action '{}' failed: {}", self.name, reason);
                ctx.send_error(reason);
                ActionOutcome::Failed
            }
            Err(panic) => {
                tracing::error!(
                    target: ACTION_TAG,
                    "Action '{}' panicked: {}",
                    self.name,
                    panic_message(panic.as_ref())
                );
                ctx.send_error(ApiError::internal_server_error("An error occurred while processing your request"));
                ActionOutcome::Failed
            }
        }
    }
}

impl<C> Clone for ActionItem<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            roles: self.roles.clone(),
            action: Arc::clone(&self.action),
        }
    }
}

impl<C> fmt::Debug for ActionItem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionItem")
            .field("name", &self.name)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// How an execute call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action ran without raising
    Done,
    /// No action with that name; a not-found response was sent
    NotFound,
    /// The action raised; an error response was sent
    Failed,
}

impl ActionOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, ActionOutcome::Done)
    }
}

/// Anything that can execute a named action against a context
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    type Context: RequestContext;

    /// Execute the action and make sure a response was emitted for it.
    async fn execute(&self, name: &str, ctx: &Self::Context) -> ActionOutcome;
}

/// An executor that knows its action names
pub trait ActionPool: ActionExecutor {
    /// All action names of the pool
    fn actions(&self) -> Vec<String>;

    fn has(&self, name: &str) -> bool;
}

/// Send the standard response for an unknown action name
pub fn send_not_found<C: RequestContext>(ctx: &C) {
    ctx.send_error(ApiError::not_found("unknown url"));
}
