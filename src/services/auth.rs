//! Bearer-token authentication extractors backed by the configured JWT
//! secrets. Registration and OTP flows live in the external identity
//! service; this module only verifies what it issued.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    error::{AppError, ServiceError},
    state::SharedState,
    utils::jwt::{self, Claims},
};

fn bearer_token(parts: &Parts) -> Result<&str, ServiceError> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::AuthRequired("missing bearer token".into()))
}

/// Authenticated participant.
pub struct AuthUser(pub Claims);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = jwt::verify(&state.config().jwt_secret, token)?;
        Ok(AuthUser(claims))
    }
}

/// Claims when a valid bearer token is present, `None` otherwise. Used by
/// read endpoints that personalise but never reject.
pub struct MaybeUser(pub Option<Claims>);

impl FromRequestParts<SharedState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let claims = bearer_token(parts)
            .ok()
            .and_then(|token| jwt::verify(&state.config().jwt_secret, token).ok());
        Ok(MaybeUser(claims))
    }
}

/// Authenticated admin (or superadmin).
pub struct AdminUser(pub Claims);

impl FromRequestParts<SharedState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            return Err(ServiceError::Forbidden("admin role required".into()).into());
        }
        Ok(AdminUser(claims))
    }
}

/// Authenticated superadmin; gates disaster-recovery endpoints.
pub struct SuperAdminUser(pub Claims);

impl FromRequestParts<SharedState> for SuperAdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if !claims.is_superadmin() {
            return Err(ServiceError::Forbidden("superadmin role required".into()).into());
        }
        Ok(SuperAdminUser(claims))
    }
}

/// Verify a token handed over a WebSocket query string.
pub fn verify_ws_token(state: &SharedState, token: &str) -> Result<Claims, ServiceError> {
    jwt::verify(&state.config().jwt_secret, token)
}
