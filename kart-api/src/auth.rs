use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use kart_core::AuthContext;
use serde_json::Value;

use crate::error::AppError;
use crate::state::AppState;

/// Caller identity from `Authorization: Bearer <jwt>`. An absent header yields
/// `None` and is left to the pipeline to reject; a present but invalid token
/// is a 401 here.
pub struct MaybeAuth(pub Option<AuthContext>);

impl FromRequestParts<AppState> for MaybeAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
            return Ok(MaybeAuth(None));
        };

        let token = header
            .to_str()
            .ok()
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::AuthenticationError("Malformed Authorization header".to_string())
            })?;

        if state.jwt_secret.is_empty() {
            return Err(AppError::ServiceError("JWT secret not configured".to_string()));
        }

        let claims = decode::<Value>(
            token,
            &DecodingKey::from_secret(state.jwt_secret.expose().as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))?
        .claims;

        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::AuthenticationError("Token has no subject".to_string()))?
            .to_string();

        Ok(MaybeAuth(Some(AuthContext::new(token, subject, claims))))
    }
}
