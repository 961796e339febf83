use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::auth::Claims;
use crate::AppState;
use axum::{extract::Request, middleware::Next, response::Response};
use std::sync::Arc;

/// Staff, superusers and the addresses listed in `ADMIN_EMAILS` may
/// moderate payments.
pub fn is_admin(claims: &Claims, config: &AppConfig) -> bool {
    claims.is_superuser || claims.is_staff || config.is_admin_email(&claims.email)
}

/// Runs after `auth_middleware`, which stores the claims.
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required for admin access.".to_string()))?;

    let state = request
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or_else(|| AppError::Internal("Application state missing from request".to_string()))?;

    if !is_admin(claims, &state.config) {
        tracing::warn!("Admin access denied for {}", claims.email);
        return Err(AppError::Forbidden(
            "Admin access required. You must be staff or an approved admin.".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
