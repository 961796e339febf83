use crate::error::AppError;
use crate::handlers::auth::verify_jwt_token;
use crate::models::auth::Claims;
use crate::AppState;
use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Pull the token out of a `Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let token = bearer_token(auth_str).ok_or_else(|| {
        AppError::Unauthorized("Invalid Authorization header format. Expected 'Bearer <token>'".to_string())
    })?;

    let state = request
        .extensions()
        .get::<Arc<AppState>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("Application state missing from request".to_string()))?;

    let claims = verify_jwt_token(token, &state.config.jwt_secret).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;

    // Handlers read the caller from `Extension<Claims>`
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Authenticated caller's user id.
pub fn require_user_id(claims: &Claims) -> Result<i32, AppError> {
    claims
        .user_id()
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))
}
