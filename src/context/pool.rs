use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;

use super::action::{send_not_found, ActionExecutor, ActionItem, ActionOutcome, ActionPool, ActionResult};
use super::{HttpContext, RequestContext, ACTION_TAG};

/// A module's table of named actions.
///
/// Filled while wiring the server and only read afterwards. Adding an action
/// under an existing name replaces the former one.
pub struct BaseActionPool<C: RequestContext = HttpContext> {
    action_map: HashMap<String, ActionItem<C>>,
}

impl<C: RequestContext> BaseActionPool<C> {
    pub fn new() -> Self {
        Self {
            action_map: HashMap::new(),
        }
    }

    /// Add an action. A former action with the same name is overridden.
    pub fn add_action<F, Fut>(mut self, name: impl Into<String>, action: F, roles: &[&str]) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let item = ActionItem::new(name, action, roles);
        tracing::trace!(target: ACTION_TAG, "add action ({})", item.name);
        self.action_map.insert(item.name.clone(), item);
        self
    }

    /// Roles registered with the action
    pub fn roles(&self, name: &str) -> Option<&[String]> {
        self.action_map.get(name).map(|item| item.roles.as_slice())
    }

    pub fn len(&self) -> usize {
        self.action_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.action_map.is_empty()
    }
}

impl<C: RequestContext> Default for BaseActionPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<C: RequestContext> ActionExecutor for BaseActionPool<C> {
    type Context = C;

    async fn execute(&self, name: &str, ctx: &C) -> ActionOutcome {
        let http = ctx.http();
        tracing::trace!(target: ACTION_TAG, "{} -> ({}:{})", name, http.method(), http.uri());

        match self.action_map.get(name) {
            Some(item) => item.invoke(ctx).await,
            None => {
                send_not_found(ctx);
                ActionOutcome::NotFound
            }
        }
    }
}

impl<C: RequestContext> ActionPool for BaseActionPool<C> {
    /// Names in sorted order
    fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.action_map.keys().cloned().collect();
        names.sort();
        names
    }

    fn has(&self, name: &str) -> bool {
        self.action_map.contains_key(name)
    }
}
