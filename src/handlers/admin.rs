// src/handlers/admin.rs
use crate::error::{ApiResult, AppError};
use crate::extract::{PathParams, QueryParams};
use crate::handlers::billing::PAYMENT_COLUMNS;
use crate::middleware::admin::admin_middleware;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::{User, UserResponse, USER_COLUMNS};
use crate::models::subscription::{Payment, PaymentStatus, PlanCode, SubscriptionStatus};
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn admin_routes() -> Router {
    Router::new()
        .route("/api/admin/stats", get(admin_stats_api))
        .route("/api/admin/pending-users", get(pending_users_api))
        .route("/api/admin/users/:id/approve", post(approve_user))
        .route("/api/admin/users/:id/deny", post(deny_user))
        .route("/api/admin/payments", get(list_payments_api))
        .layer(axum::middleware::from_fn(admin_middleware))
        .layer(axum::middleware::from_fn(auth_middleware))
}

#[derive(Deserialize)]
pub struct PaymentsQuery {
    pub status: Option<String>,
}

#[derive(Debug, FromRow, Serialize)]
struct PendingUserRow {
    id: i32,
    email: String,
    requested_plan: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    payment_id: Option<uuid::Uuid>,
    payment_reference: Option<String>,
    payment_email: Option<String>,
    payment_created_at: Option<DateTime<Utc>>,
}

pub async fn admin_stats_api(Extension(state): Extension<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let by_status = sqlx::query_as::<_, (String, i64)>("SELECT status, COUNT(*) FROM users GROUP BY status")
        .fetch_all(&state.db_pool)
        .await?;

    let total_users: i64 = by_status.iter().map(|(_, count)| count).sum();
    let users_by_status: BTreeMap<String, i64> = by_status.into_iter().collect();

    let total_chats = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chats")
        .fetch_one(&state.db_pool)
        .await?;

    let total_messages = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_messages")
        .fetch_one(&state.db_pool)
        .await?;

    let pending_payments = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payments WHERE status = $1")
        .bind(PaymentStatus::Pending.as_str())
        .fetch_one(&state.db_pool)
        .await?;

    Ok(Json(json!({
        "success": true,
        "stats": {
            "total_users": total_users,
            "users_by_status": users_by_status,
            "total_chats": total_chats,
            "total_messages": total_messages,
            "pending_payments": pending_payments
        }
    })))
}

/// Users waiting for review, each with their latest pending payment.
pub async fn pending_users_api(Extension(state): Extension<Arc<AppState>>) -> ApiResult<serde_json::Value> {
    let users = sqlx::query_as::<_, PendingUserRow>(
        "SELECT u.id, u.email, u.requested_plan, u.created_at, u.updated_at,
                p.id AS payment_id, p.reference AS payment_reference,
                p.email AS payment_email, p.created_at AS payment_created_at
         FROM users u
         LEFT JOIN LATERAL (
             SELECT id, reference, email, created_at FROM payments
             WHERE user_id = u.id AND status = 'pending'
             ORDER BY created_at DESC
             LIMIT 1
         ) p ON true
         WHERE u.status = $1
         ORDER BY u.updated_at DESC",
    )
    .bind(SubscriptionStatus::Pending.as_str())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "count": users.len(),
        "users": users
    })))
}

/// Plan the approval grants: the requested plan, or monthly when the
/// request never named a valid paid plan.
pub fn approved_plan(user: &User) -> PlanCode {
    user.requested_plan
        .as_deref()
        .and_then(PlanCode::parse)
        .filter(|plan| *plan != PlanCode::Trial)
        .unwrap_or(PlanCode::Monthly)
}

async fn find_user(state: &AppState, user_id: i32) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Activate the requested plan. The plan window starts at approval time.
pub async fn approve_user(
    Extension(state): Extension<Arc<AppState>>,
    PathParams(user_id): PathParams<i32>,
) -> ApiResult<serde_json::Value> {
    let user = find_user(&state, user_id).await?;
    let plan = approved_plan(&user);
    let (start, end) = plan.window_from(Utc::now());

    let mut tx = state.db_pool.begin().await?;

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET status = $2, plan = $3, paid = true, start_date = $4, end_date = $5, updated_at = NOW()
         WHERE id = $1
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(SubscriptionStatus::Approved.as_str())
    .bind(plan.as_str())
    .bind(start)
    .bind(end)
    .fetch_one(&mut *tx)
    .await?;

    let payments = sqlx::query(
        "UPDATE payments SET status = $2, start_date = $3, end_date = $4, updated_at = NOW()
         WHERE user_id = $1 AND status = $5",
    )
    .bind(user_id)
    .bind(PaymentStatus::Approved.as_str())
    .bind(start)
    .bind(end)
    .bind(PaymentStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "✅ Approved user {} on plan {} until {} ({} payments)",
        user_id,
        plan.as_str(),
        end,
        payments.rows_affected()
    );

    Ok(Json(json!({
        "success": true,
        "message": format!("{} approved on the {} plan", user.email, plan.as_str()),
        "user": UserResponse::from(user),
        "start_date": start,
        "end_date": end
    })))
}

pub async fn deny_user(
    Extension(state): Extension<Arc<AppState>>,
    PathParams(user_id): PathParams<i32>,
) -> ApiResult<serde_json::Value> {
    let mut tx = state.db_pool.begin().await?;

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(SubscriptionStatus::Denied.as_str())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    sqlx::query("UPDATE payments SET status = $2, updated_at = NOW() WHERE user_id = $1 AND status = $3")
        .bind(user_id)
        .bind(PaymentStatus::Denied.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("❌ Denied user {}", user_id);

    Ok(Json(json!({
        "success": true,
        "message": format!("{} denied", user.email),
        "user": UserResponse::from(user)
    })))
}

pub async fn list_payments_api(
    QueryParams(params): QueryParams<PaymentsQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> ApiResult<serde_json::Value> {
    let status = match params.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            PaymentStatus::parse(raw)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown payment status '{}'", raw)))?,
        ),
        None => None,
    };

    let payments: Vec<Payment> = match status {
        Some(status) => {
            sqlx::query_as(&format!(
                "SELECT {} FROM payments WHERE status = $1 ORDER BY created_at DESC",
                PAYMENT_COLUMNS
            ))
            .bind(status.as_str())
            .fetch_all(&state.db_pool)
            .await?
        }
        None => {
            sqlx::query_as(&format!("SELECT {} FROM payments ORDER BY created_at DESC", PAYMENT_COLUMNS))
                .fetch_all(&state.db_pool)
                .await?
        }
    };

    Ok(Json(json!({
        "success": true,
        "count": payments.len(),
        "payments": payments
    })))
}
