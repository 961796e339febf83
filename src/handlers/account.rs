// src/handlers/account.rs
use crate::error::{ApiResult, AppError};
use crate::handlers::auth::load_user;
use crate::middleware::auth::{auth_middleware, require_user_id};
use crate::models::auth::{Claims, User};
use crate::models::subscription::{access_state, effective_plan, AccessState, SubscriptionStatus};
use crate::services::quota::{self, UsageSummary};
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

pub fn account_routes() -> Router {
    Router::new()
        .route("/api/account", get(get_account))
        .route("/api/account/access", get(check_access))
        .layer(axum::middleware::from_fn(auth_middleware))
}

/// Profile page data: subscription, today's usage and chat count.
async fn get_account(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;
    let user = load_user(&state, user_id).await?;

    let chat_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chats WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.db_pool)
        .await?;

    Ok(Json(account_json(&user, chat_count)))
}

fn account_json(user: &User, chat_count: i64) -> serde_json::Value {
    json!({
        "success": true,
        "account": {
            "email": user.email,
            "status": user.subscription_status(),
            "plan": effective_plan(user),
            "requested_plan": user.requested_plan,
            "paid": user.paid,
            "start_date": user.start_date,
            "end_date": user.end_date,
            "trial_start": user.trial_start,
            "trial_end": user.trial_end,
            "trial_used": user.trial_used,
            "is_staff": user.is_staff,
            "is_superuser": user.is_superuser,
            "created_at": user.created_at,
        },
        "usage": UsageSummary::for_user(user, quota::today()),
        "chat_count": chat_count,
    })
}

/// Dashboard gate. Lapsed trials and plans are written back as `expired`.
async fn check_access(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;
    let user = load_user(&state, user_id).await?;

    let access = access_state(&user, Utc::now());

    if access.is_expired() && user.subscription_status() != SubscriptionStatus::Expired {
        sqlx::query("UPDATE users SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(SubscriptionStatus::Expired.as_str())
            .bind(user_id)
            .execute(&state.db_pool)
            .await?;
        tracing::info!("⌛ Subscription expired for user {} ({:?})", user_id, access);
    }

    Ok(Json(access_json(access)))
}

/// AI features need an unexpired trial or an approved plan.
pub fn require_access(user: &User, now: DateTime<Utc>) -> Result<(), AppError> {
    let access = access_state(user, now);
    match access.denial_message() {
        None => Ok(()),
        Some(message) => {
            tracing::warn!("🔒 User {} blocked from AI features: {:?}", user.id, access);
            Err(AppError::AccessDenied {
                message: message.to_string(),
                route: access.route(),
            })
        }
    }
}

/// Load the caller and apply `require_access`.
pub async fn load_active_user(state: &AppState, user_id: i32) -> Result<User, AppError> {
    let user = load_user(state, user_id).await?;
    require_access(&user, Utc::now())?;
    Ok(user)
}

fn access_json(access: AccessState) -> serde_json::Value {
    json!({
        "success": true,
        "access": access,
        "allowed": access == AccessState::Active,
        "route": access.route(),
    })
}
