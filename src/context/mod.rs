// Request context and named action dispatch
//
// Pools hold named actions, a repository merges pools, and `to_route_handler`
// binds one action name to an axum route.

pub mod action;
#[allow(clippy::module_inception)]
pub mod context;
pub mod dispatch;
pub mod pool;
pub mod repository;

pub use action::{ActionExecutor, ActionFn, ActionItem, ActionOutcome, ActionPool, ActionResult};
pub use context::{
    AppSettings, BodyLimit, ConnectionPool, HttpContext, RequestContext, ViewEngine, ViewRenderer,
    DEFAULT_BODY_LIMIT,
};
pub use dispatch::{dispatch, to_route_handler};
pub use pool::BaseActionPool;
pub use repository::ActionRepository;

/// Log target for action registration and dispatch
pub const ACTION_TAG: &str = "action";
