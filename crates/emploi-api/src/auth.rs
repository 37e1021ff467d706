//! Bearer token and webhook secret authentication.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use emploi_models::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Claims of an Emploi+ access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user id
    pub sub: String,
    /// Expiration
    pub exp: i64,
    /// Issued at
    #[serde(default)]
    pub iat: Option<i64>,
}

/// HS256 token verifier.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    enabled: bool,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            enabled: !secret.is_empty(),
        }
    }

    /// Verify a token and return the user it was issued to.
    pub fn verify(&self, token: &str) -> Result<UserId, ApiError> {
        if !self.enabled {
            return Err(ApiError::unauthorized("Token verification is not configured"));
        }

        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {}", e)))?;

        data.claims
            .sub
            .parse::<UserId>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| ApiError::unauthorized("Token subject is not a user id"))
    }
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: UserId,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthorized("Missing or malformed Authorization header"))?;

        let user_id = state.auth.verify(bearer.token())?;
        Ok(AuthUser { user_id })
    }
}

/// Compare two byte strings without an early exit on the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Marker for requests that presented the webhook secret.
#[derive(Debug, Clone, Copy)]
pub struct WebhookCaller;

#[axum::async_trait]
impl FromRequestParts<AppState> for WebhookCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.config.webhook_secret.as_bytes();
        if expected.is_empty() {
            warn!("WEBHOOK_SECRET is not set, rejecting webhook call");
            return Err(ApiError::unauthorized("Webhook secret not configured"));
        }

        let provided = parts
            .headers
            .get(WEBHOOK_SECRET_HEADER)
            .map(|v| v.as_bytes())
            .ok_or_else(|| ApiError::unauthorized("Missing webhook secret"))?;

        if !constant_time_eq(provided, expected) {
            warn!(path = %parts.uri.path(), "Webhook secret mismatch");
            return Err(ApiError::unauthorized("Invalid webhook secret"));
        }

        Ok(WebhookCaller)
    }
}
