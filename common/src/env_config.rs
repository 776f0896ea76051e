use std::{env, sync::Arc};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// Holds everything read from the environment at start-up: database and
/// server parameters, logging preferences, the secret used to validate
/// sessions issued by the auth service, and the Creem payment settings.
/// Payment secrets are optional here; handlers report their absence as a
/// server error on the request that needs them.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to. Without it the server keeps
    /// subscriptions in memory.
    pub database_url: Option<String>,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// File the logger mirrors console output into.
    pub log_file: String,
    /// Public URL of the web application, used for checkout redirects when
    /// the request carries no `Origin` header.
    pub app_url: String,
    /// Configuration for validating session tokens.
    pub auth_config: AuthConfig,
    /// Creem payment provider settings.
    pub creem: CreemConfig,
}

#[derive(Clone, Debug)]
/// Secret shared with the auth service that signs session tokens (HS256).
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Clone, Debug)]
pub struct CreemConfig {
    /// API key used for checkout creation. `creem_test_` keys target the test API.
    pub api_key: Option<String>,
    /// Shared secret used to sign webhook deliveries.
    pub webhook_secret: Option<String>,
    /// When false, only the presence of the signature header is checked.
    pub verify_signature: bool,
    /// Overrides the base URL derived from the API key.
    pub api_base_url: Option<String>,
}

impl AuthConfig {
    /// Reads `AUTH_JWT_SECRET`.
    ///
    /// # Panics
    ///
    /// Panics if `AUTH_JWT_SECRET` is not set.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        AuthConfig {
            jwt_secret: env::var("AUTH_JWT_SECRET").expect("AUTH_JWT_SECRET must be set"),
        }
    }
}

impl CreemConfig {
    /// Reads the Creem settings. Empty values count as missing.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        CreemConfig {
            api_key: non_empty_var("CREEM_API_KEY"),
            webhook_secret: non_empty_var("CREEM_WEBHOOK_SECRET"),
            verify_signature: env::var("CREEM_WEBHOOK_VERIFY_SIGNATURE")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                != "false",
            api_base_url: non_empty_var("CREEM_API_BASE_URL"),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`: `development` or `production`
    /// - `AUTH_JWT_SECRET`: secret for validating session tokens
    ///
    /// Optional (with defaults):
    /// - `DATABASE_URL`: Postgres connection string (default: in-memory store)
    /// - `IP`: Server host (default: "127.0.0.1")
    /// - `PORT`: Server port (default: 8080)
    /// - `WORKERS`: Number of worker threads (default: 4)
    /// - `CORS_ALLOWED_ORIGIN`: Allowed CORS origin (default: "http://localhost:3000")
    /// - `ENABLE_CONSOLE_LOGGING`: Whether to enable console logging (default: true)
    /// - `LOG_FILE`: Log file path (default: "nanobanana.log")
    /// - `APP_URL`: Web application URL (default: "http://localhost:3000")
    /// - `CREEM_API_KEY`, `CREEM_WEBHOOK_SECRET`, `CREEM_API_BASE_URL`
    /// - `CREEM_WEBHOOK_VERIFY_SIGNATURE` (default: true)
    ///
    /// # Panics
    ///
    /// Panics if a required variable is missing.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: non_empty_var("DATABASE_URL"),
            server_host: env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            num_workers: env::var("WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            console_logging_enabled: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                == "true",
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "nanobanana.log".to_string()),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            auth_config: AuthConfig::from_env(),
            creem: CreemConfig::from_env(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
