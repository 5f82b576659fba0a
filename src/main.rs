use std::sync::Arc;

use anyhow::Context;
use axum::{
    middleware,
    routing::{get, post},
    Extension, Router,
};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use action_context::{
    auth_gate_middleware,
    config::{self, AppConfig},
    context::{AppSettings, BodyLimit, ConnectionPool},
    is_production, to_route_handler, ActionRepository, ApiError, AuthGate, AuthService, BaseActionPool,
    HttpContext, VERSION,
};

#[derive(Debug, Parser)]
#[command(name = "action-context", version, about = "Demo server for the action-context dispatch layer")]
struct Args {
    /// Port to listen on (overrides API_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Token secret (overrides AUTH_SECRETS)
    #[arg(long)]
    secrets: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up AUTH_SECRETS, DATABASE_URL, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = config::config().clone();
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(secrets) = args.secrets {
        config.auth.secrets = secrets;
    }

    tracing::info!("Starting action-context {} in {:?} mode", VERSION, config.environment);
    if is_production!() && !config.auth.verify_rigorous {
        tracing::warn!("Auth gate is not rigorous in production: requests without token run as anonymous");
    }

    // A missing secret or a broken whitelist pattern stops the server here
    let gate = Arc::new(AuthGate::new(&config.auth).context("invalid auth configuration")?);
    let app = app(&config, gate)?;

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn app(config: &AppConfig, gate: Arc<AuthGate>) -> anyhow::Result<Router> {
    let repository = Arc::new(
        ActionRepository::new()
            .add_pool(Arc::new(system_actions()))
            .add_pool(Arc::new(session_actions(Arc::clone(gate.service())))),
    );

    let settings = AppSettings::new()
        .with("title", "action-context demo")?
        .with("version", VERSION)?;

    let mut router = Router::new()
        .route("/", get(to_route_handler(repository.clone(), "about")))
        .route("/about", get(to_route_handler(repository.clone(), "about")))
        .route("/health", get(to_route_handler(repository.clone(), "health")))
        .route("/settings/:name", get(to_route_handler(repository.clone(), "settings")))
        .route("/login/:id", post(to_route_handler(repository.clone(), "login")))
        .route("/whoami", get(to_route_handler(repository.clone(), "whoami")))
        .layer(middleware::from_fn_with_state(gate, auth_gate_middleware))
        .layer(Extension(settings))
        .layer(Extension(BodyLimit(config.api.max_request_size_bytes)));

    if let Some(url) = &config.database.url {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect_lazy(url)
            .context("invalid DATABASE_URL")?;
        router = router.layer(Extension(ConnectionPool(pool)));
    }

    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    Ok(router.layer(CorsLayer::permissive()))
}

fn system_actions() -> BaseActionPool {
    BaseActionPool::new()
        .add_action(
            "about",
            |ctx: HttpContext| async move {
                ctx.send_data(json!({
                    "name": ctx.setting::<String>("title"),
                    "version": ctx.setting::<String>("version"),
                    "user": ctx.auth_user(),
                }));
                Ok(())
            },
            &[],
        )
        .add_action(
            "settings",
            |ctx: HttpContext| async move {
                let name = ctx.param_or("name", "");
                match ctx.setting::<serde_json::Value>(&name) {
                    Some(value) => {
                        ctx.send_data(json!({ "name": name, "value": value }));
                        Ok(())
                    }
                    None => Err(ApiError::not_found(format!("No setting named '{}'", name))),
                }
            },
            &[],
        )
        .add_action(
            "health",
            |ctx: HttpContext| async move {
                if ctx.conn().is_none() {
                    ctx.send_data(json!({ "status": "ok", "database": "not configured" }));
                    return Ok(());
                }

                // Returned to the pool when `conn` drops, also on the error path
                let mut conn = ctx.acquire().await?;
                sqlx::query("SELECT 1").execute(&mut *conn).await?;
                ctx.send_data(json!({ "status": "ok", "database": "ok" }));
                Ok(())
            },
            &[],
        )
}

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    roles: Vec<String>,
}

fn session_actions(service: Arc<AuthService>) -> BaseActionPool {
    BaseActionPool::new()
        .add_action(
            "login",
            move |ctx: HttpContext| {
                let service = Arc::clone(&service);
                async move {
                    let user_id = ctx.param_int("id", -1);
                    if user_id < 0 {
                        return Err(ApiError::bad_request("Invalid user id"));
                    }

                    let login: LoginRequest = if ctx.raw_body().is_empty() {
                        LoginRequest::default()
                    } else {
                        ctx.body()?
                    };

                    let token = service.issue(user_id, login.roles)?;
                    ctx.send_data(json!({ "token": token }));
                    Ok(())
                }
            },
            &[],
        )
        .add_action(
            "whoami",
            |ctx: HttpContext| async move {
                let user = ctx.auth_user();
                if user.is_anonymous() {
                    return Err(ApiError::unauthorized("Login required"));
                }
                ctx.send_data(user);
                Ok(())
            },
            &["user"],
        )
}
