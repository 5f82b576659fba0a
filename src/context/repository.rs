use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::action::{send_not_found, ActionExecutor, ActionOutcome, ActionPool};
use super::{HttpContext, RequestContext, ACTION_TAG};

/// Merges several action pools into one lookup surface.
///
/// Each action name points at the pool that owns it. When two pools share a
/// name, the pool added last wins.
pub struct ActionRepository<C: RequestContext = HttpContext> {
    map: HashMap<String, Arc<dyn ActionPool<Context = C>>>,
}

impl<C: RequestContext> ActionRepository<C> {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Add an action pool and map all of its action names to it
    pub fn add_pool<P>(mut self, pool: Arc<P>) -> Self
    where
        P: ActionPool<Context = C> + 'static,
    {
        let pool: Arc<dyn ActionPool<Context = C>> = pool;
        for name in pool.actions() {
            if self.map.contains_key(&name) {
                tracing::debug!(target: ACTION_TAG, "action ({}) is now served by a later pool", name);
            }
            self.map.insert(name, Arc::clone(&pool));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<C: RequestContext> Default for ActionRepository<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<C: RequestContext> ActionExecutor for ActionRepository<C> {
    type Context = C;

    async fn execute(&self, name: &str, ctx: &C) -> ActionOutcome {
        match self.map.get(name) {
            Some(pool) => pool.execute(name, ctx).await,
            None => {
                tracing::trace!(target: ACTION_TAG, "no pool for action ({})", name);
                send_not_found(ctx);
                ActionOutcome::NotFound
            }
        }
    }
}

/// Repositories nest: a repository can be added to another one
impl<C: RequestContext> ActionPool for ActionRepository<C> {
    fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map.keys().cloned().collect();
        names.sort();
        names
    }

    fn has(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }
}
