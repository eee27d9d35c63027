use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use chrono::{Duration, Utc};
use guidely_core::AccountRole;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Account id, decimal.
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// The verified caller, inserted into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: AccountRole,
}

pub fn decode_token(secret: &str, token: &str) -> Result<AuthUser, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthenticationError("Invalid or expired token".to_string()))?;

    let user_id = token_data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::AuthenticationError("Token subject is not an account id".to_string()))?;
    let role = token_data
        .claims
        .role
        .parse::<AccountRole>()
        .map_err(|_| AppError::AuthenticationError("Token carries an unknown role".to_string()))?;

    Ok(AuthUser { user_id, role })
}

pub fn issue_token(secret: &str, user_id: i64, role: AccountRole, ttl_seconds: i64) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_owned(),
        exp: (Utc::now() + Duration::seconds(ttl_seconds)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

// ============================================================================
// Bearer Authentication Middleware
// ============================================================================

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let user = decode_token(&state.auth.secret, bearer.token())?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
