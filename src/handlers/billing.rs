// src/handlers/billing.rs
use crate::error::{ApiResult, AppError};
use crate::extract::{JsonBody, PathParams};
use crate::handlers::auth::load_user;
use crate::middleware::auth::{auth_middleware, require_user_id};
use crate::models::auth::{Claims, User, USER_COLUMNS};
use crate::models::subscription::{
    available_plans, Payment, PaymentRequest, PaymentStatus, PlanCode, SubscriptionStatus,
};
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub const PAYMENT_COLUMNS: &str = "id, user_id, email, plan, amount, method, status, reference, \
     start_date, end_date, created_at, updated_at";

pub fn billing_routes() -> Router {
    Router::new()
        .route("/api/billing/plans", get(list_plans))
        .route("/api/billing/trial", post(start_trial))
        .route("/api/billing/payments", post(request_payment))
        .route("/api/billing/payments/:id", get(payment_status))
        .layer(axum::middleware::from_fn(auth_middleware))
}

async fn list_plans(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<serde_json::Value> {
    let user = load_user(&state, require_user_id(&claims)?).await?;

    Ok(Json(json!({
        "success": true,
        "plans": available_plans(&user),
        "status": user.subscription_status(),
    })))
}

/// One free trial per account, never after a paid plan.
async fn start_trial(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;
    let (start, end) = PlanCode::Trial.window_from(Utc::now());

    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET status = $2, plan = $3, trial_start = $4, trial_end = $5, \
            start_date = $4, end_date = $5, trial_messages_sent = 0, trial_used = true, updated_at = NOW() \
         WHERE id = $1 AND trial_used = false AND paid = false \
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(SubscriptionStatus::Trial.as_str())
    .bind(PlanCode::Trial.as_str())
    .bind(start)
    .bind(end)
    .fetch_optional(&state.db_pool)
    .await?;

    let Some(user) = user else {
        // Distinguish a missing account from a spent trial
        load_user(&state, user_id).await?;
        return Err(AppError::Conflict(
            "You have already used your free trial. Please choose a paid plan.".to_string(),
        ));
    };

    tracing::info!("🎁 Trial started for user {} until {}", user.id, end);

    Ok(Json(json!({
        "success": true,
        "message": "Your 3-day free trial has started.",
        "status": user.subscription_status(),
        "trial_start": user.trial_start,
        "trial_end": user.trial_end,
        "route": "/dashboard",
    })))
}

fn validate_payment_request(payload: &PaymentRequest) -> Result<PlanCode, AppError> {
    let plan = PlanCode::parse(&payload.plan)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown plan '{}'", payload.plan)))?;

    if plan == PlanCode::Trial {
        return Err(AppError::BadRequest(
            "The free trial does not require a payment".to_string(),
        ));
    }

    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("Please provide a contact email".to_string()));
    }

    Ok(plan)
}

/// Record a manual payment and put the account on hold until an admin
/// reviews it.
async fn request_payment(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    JsonBody(payload): JsonBody<PaymentRequest>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;
    let plan = validate_payment_request(&payload)?;
    let catalogue = plan.plan();
    let (start, end) = plan.window_from(Utc::now());
    let reference = payload
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let mut tx = state.db_pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>(&format!(
        "INSERT INTO payments (id, user_id, email, plan, amount, method, status, reference, start_date, end_date, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, 'manual', $6, $7, $8, $9, NOW(), NOW()) \
         RETURNING {}",
        PAYMENT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(payload.email.trim())
    .bind(plan.as_str())
    .bind(catalogue.amount)
    .bind(PaymentStatus::Pending.as_str())
    .bind(reference)
    .bind(start)
    .bind(end)
    .fetch_one(&mut *tx)
    .await?;

    let updated = sqlx::query(
        "UPDATE users SET status = $1, requested_plan = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(SubscriptionStatus::Pending.as_str())
    .bind(plan.as_str())
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::Unauthorized("User not found".to_string()));
    }

    tx.commit().await?;

    tracing::info!(
        "💳 Payment {} requested by user {}: {} ({})",
        payment.id,
        user_id,
        plan.as_str(),
        catalogue.amount
    );

    Ok(Json(json!({
        "success": true,
        "message": "Payment submitted. Your account will be activated once it is approved.",
        "payment": payment,
        "route": "/pending",
    })))
}

/// Where the pending page should send the user for a given status.
pub fn next_route(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Approved | SubscriptionStatus::Trial => "/dashboard",
        SubscriptionStatus::Expired => "/billing",
        _ => "/pending",
    }
}

async fn payment_status(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    PathParams(payment_id): PathParams<Uuid>,
) -> ApiResult<serde_json::Value> {
    let user_id = require_user_id(&claims)?;

    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {} FROM payments WHERE id = $1 AND user_id = $2",
        PAYMENT_COLUMNS
    ))
    .bind(payment_id)
    .bind(user_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    let user = load_user(&state, user_id).await?;
    let status = user.subscription_status();

    Ok(Json(json!({
        "success": true,
        "payment": payment,
        "status": status,
        "route": next_route(status),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{claims_for, database_state, insert_user, reload_user};

    fn request(plan: &str, email: &str) -> PaymentRequest {
        PaymentRequest {
            plan: plan.to_string(),
            email: email.to_string(),
            reference: None,
        }
    }

    #[test]
    fn test_payment_request_validation() {
        assert_eq!(validate_payment_request(&request("monthly", "me@buzai.test")).unwrap(), PlanCode::Monthly);
        assert!(matches!(
            validate_payment_request(&request("trial", "me@buzai.test")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_payment_request(&request("lifetime", "me@buzai.test")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_payment_request(&request("yearly", "  ")),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_next_route_after_review() {
        assert_eq!(next_route(SubscriptionStatus::Approved), "/dashboard");
        assert_eq!(next_route(SubscriptionStatus::Trial), "/dashboard");
        assert_eq!(next_route(SubscriptionStatus::Expired), "/billing");
        assert_eq!(next_route(SubscriptionStatus::Pending), "/pending");
        assert_eq!(next_route(SubscriptionStatus::Denied), "/pending");
    }

    #[tokio::test]
    async fn test_trial_can_be_started_only_once() {
        let Some(state) = database_state(None).await else { return };
        let user = insert_user(&state.db_pool, SubscriptionStatus::None).await;
        let claims = claims_for(&user);

        let Json(started) = start_trial(Extension(state.clone()), Extension(claims.clone()))
            .await
            .unwrap();
        assert_eq!(started["status"], "trial");
        assert_eq!(started["route"], "/dashboard");

        let user = reload_user(&state.db_pool, user.id).await;
        assert!(user.trial_used);
        assert_eq!(user.plan.as_deref(), Some("trial"));
        let window = user.trial_end.unwrap() - user.trial_start.unwrap();
        assert_eq!(window, PlanCode::Trial.duration());

        let again = start_trial(Extension(state.clone()), Extension(claims)).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_paid_account_cannot_start_trial() {
        let Some(state) = database_state(None).await else { return };
        let user = insert_user(&state.db_pool, SubscriptionStatus::Approved).await;
        sqlx::query("UPDATE users SET paid = true WHERE id = $1")
            .bind(user.id)
            .execute(&state.db_pool)
            .await
            .unwrap();

        let result = start_trial(Extension(state.clone()), Extension(claims_for(&user))).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(reload_user(&state.db_pool, user.id).await.status, "approved");
    }

    #[tokio::test]
    async fn test_payment_request_puts_account_on_hold() {
        let Some(state) = database_state(None).await else { return };
        let user = insert_user(&state.db_pool, SubscriptionStatus::None).await;
        let claims = claims_for(&user);

        let mut payload = request("quarterly", "billing@buzai.test");
        payload.reference = Some("  TX-4471 ".to_string());
        let Json(value) = request_payment(Extension(state.clone()), Extension(claims.clone()), JsonBody(payload))
            .await
            .unwrap();
        assert_eq!(value["route"], "/pending");
        assert_eq!(value["payment"]["status"], "pending");
        assert_eq!(value["payment"]["reference"], "TX-4471");

        let user = reload_user(&state.db_pool, user.id).await;
        assert_eq!(user.status, "pending");
        assert_eq!(user.requested_plan.as_deref(), Some("quarterly"));

        let payment_id: Uuid = serde_json::from_value(value["payment"]["id"].clone()).unwrap();
        let Json(status) = payment_status(Extension(state.clone()), Extension(claims), PathParams(payment_id))
            .await
            .unwrap();
        assert_eq!(status["route"], "/pending");
    }
}
