use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

/// Settings for the auth gate and the token service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing and verifying tokens
    pub secrets: String,
    /// Path patterns that may pass without a token
    pub white_list: Vec<String>,
    /// Reject requests without a valid token (true) or fall back to the anonymous user (false)
    pub verify_rigorous: bool,
    pub token_expiry_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            enable_request_logging: true,
            max_request_size_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secrets: String::new(),
            white_list: Vec::new(),
            verify_rigorous: true,
            token_expiry_hours: 24,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Some(v) = env::var("API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Auth overrides
        if let Ok(v) = env::var("AUTH_SECRETS") {
            self.auth.secrets = v;
        }
        if let Ok(v) = env::var("AUTH_WHITE_LIST") {
            self.auth.white_list = parse_list(&v);
        }
        if let Ok(v) = env::var("AUTH_VERIFY_RIGOROUS") {
            self.auth.verify_rigorous = v.parse().unwrap_or(self.auth.verify_rigorous);
        }
        if let Ok(v) = env::var("AUTH_TOKEN_EXPIRY_HOURS") {
            self.auth.token_expiry_hours = v.parse().unwrap_or(self.auth.token_expiry_hours);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v).filter(|url| !url.trim().is_empty());
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            auth: AuthConfig {
                secrets: String::new(),
                white_list: vec!["/".to_string(), "/about".to_string(), "/login/*:d".to_string()],
                verify_rigorous: false,
                token_expiry_hours: 24 * 7, // 1 week
            },
            database: DatabaseConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            auth: AuthConfig {
                white_list: vec!["/".to_string(), "/about".to_string(), "/login/*:d".to_string()],
                ..AuthConfig::default()
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig::default(),
            auth: AuthConfig {
                white_list: vec!["/".to_string(), "/about".to_string()],
                token_expiry_hours: 4,
                ..AuthConfig::default()
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
            },
        }
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
