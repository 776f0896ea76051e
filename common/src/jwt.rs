use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    env_config::AuthConfig,
    error::{AppError, Res},
};

/// Session claims issued by the auth service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Id of the authenticated user.
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Uuid {
        self.sub
    }
}

/// Signs a session token for `user_id` valid for `hours`.
pub fn generate_jwt(
    user_id: Uuid,
    email: Option<String>,
    hours: i64,
    config: &AuthConfig,
) -> Res<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(hours))
        .ok_or_else(|| AppError::Internal("Token expiration out of range".to_string()))?
        .timestamp();

    let claims = Claims {
        sub: user_id,
        email,
        exp: expiration as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(AppError::from)
}

/// Extracts claims object from a session token.
/// Audience is not checked: the auth service stamps its own `aud`.
pub fn validate_jwt(token: &str, secret: &str) -> Res<Claims> {
    let mut validation = Validation::default();
    validation.validate_aud = false;

    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}
