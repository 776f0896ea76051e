use actix_web::HttpResponse;
use serde_json::Value;
use thiserror::Error;

pub type Res<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    // === CONVERSION ERRORS ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid session token: {0}")]
    JWT(#[from] jsonwebtoken::errors::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    // === APPLICATION ERRORS ===
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    /// A secret or key the server needs is not configured.
    #[error("{0}")]
    Config(String),

    /// The payment provider answered with a non-2xx status.
    #[error("{message}")]
    Upstream {
        message: String,
        details: Value,
        debug: Value,
    },

    /// Subscription store failure surfaced to the client with a fixed message.
    #[error("{0}")]
    Store(String),

    #[error("{0}")]
    MalformedPayload(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn to_http_response(&self) -> HttpResponse {
        let is_dev = cfg!(debug_assertions);

        let to_internal_json = |err_msg: &str| {
            if is_dev {
                serde_json::json!({ "error": err_msg })
            } else {
                serde_json::json!({ "error": "Internal server error" })
            }
        };

        match self {
            // === CONVERSION ERRORS ===
            AppError::Database(error) => {
                log::error!("Database error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }
            AppError::JWT(error) => {
                log::debug!("JWT error: {}", error);
                HttpResponse::Unauthorized().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::Reqwest(error) => {
                log::error!("Reqwest error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(&error.to_string()))
            }

            // === APPLICATION ERRORS ===
            AppError::Unauthorized(_) => {
                HttpResponse::Unauthorized().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::BadRequest(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::Config(message) => {
                log::error!("Configuration error: {}", message);
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({ "error": self.to_string() }))
            }
            AppError::Upstream {
                message,
                details,
                debug,
            } => {
                log::error!("Upstream error: {} details={} debug={}", message, details, debug);
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": message,
                    "details": details,
                    "debug": debug,
                }))
            }
            AppError::Store(_) => HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": self.to_string() })),
            AppError::MalformedPayload(message) => {
                log::error!("Malformed payload: {}", message);
                HttpResponse::InternalServerError()
                    .json(serde_json::json!({ "error": "Webhook handler failed" }))
            }

            AppError::Internal(error) => {
                log::error!("Internal error: {}", error);
                HttpResponse::InternalServerError().json(to_internal_json(error))
            }
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        self.to_http_response()
    }
}
