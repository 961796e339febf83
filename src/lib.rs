// lib.rs - BuzAI server library: routes, state and services
use axum::{
    extract::Extension,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openai_client;
pub mod services;

use config::AppConfig;
use openai_client::TextGenerator;

/// Shared by every handler through `Extension<Arc<AppState>>`.
pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub config: AppConfig,
    // None when OPENAI_API_KEY is unset
    pub generator: Option<Arc<dyn TextGenerator>>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/api/status", get(api_status))
        .merge(handlers::auth::auth_routes())
        .merge(handlers::account::account_routes())
        .merge(handlers::billing::billing_routes())
        .merge(handlers::chat::chat_routes())
        .merge(handlers::generate::generate_routes())
        .merge(handlers::upload::upload_routes(max_upload_bytes))
        .merge(handlers::marketing::marketing_routes())
        .merge(handlers::admin::admin_routes())
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let generator_status = if state.generator.is_some() { "configured" } else { "not_configured" };

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "openai": generator_status,
            "model": state.config.openai_model
        },
        "endpoints": {
            "status": "/api/status",
            "auth": "/api/auth/*",
            "account": "/api/account",
            "billing": "/api/billing/*",
            "chats": "/api/chats",
            "generate": "/api/generate",
            "upload": "/api/upload",
            "marketing": "/api/generatePost",
            "admin": "/api/admin/*"
        }
    }))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::handlers::auth::{generate_jwt_token, verify_jwt_token};
    use crate::models::auth::{Claims, User, USER_COLUMNS};
    use crate::models::subscription::SubscriptionStatus;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use uuid::Uuid;

    /// State whose pool never connects: for exercising request paths that
    /// are rejected before any query runs. Needs a tokio runtime.
    pub fn test_state() -> Arc<AppState> {
        let config = AppConfig::for_tests();
        let db_pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap();

        Arc::new(AppState {
            db_pool,
            config,
            generator: None,
        })
    }

    /// State on the migrated database named by `DATABASE_URL`. Database
    /// tests return early when the variable is unset.
    pub async fn database_state(generator: Option<Arc<dyn TextGenerator>>) -> Option<Arc<AppState>> {
        let database_url = std::env::var("DATABASE_URL").ok()?;
        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .expect("DATABASE_URL should point at a reachable Postgres");
        db::run_migrations(&db_pool).await.expect("migrations should apply");

        Some(Arc::new(AppState {
            db_pool,
            config: AppConfig {
                database_url,
                ..AppConfig::for_tests()
            },
            generator,
        }))
    }

    /// A fresh account with a unique email. Trial and plan windows end three
    /// days from now.
    pub async fn insert_user(pool: &PgPool, status: SubscriptionStatus) -> User {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, status, trial_used, trial_start, trial_end, start_date, end_date)
             VALUES ($1, '', $2, $3, NOW(), NOW() + INTERVAL '3 days', NOW(), NOW() + INTERVAL '3 days')
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(format!("user-{}@buzai.test", Uuid::new_v4()))
        .bind(status.as_str())
        .bind(status == SubscriptionStatus::Trial)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    pub async fn insert_chat(pool: &PgPool, user_id: i32) -> Uuid {
        let chat_id = Uuid::new_v4();
        sqlx::query("INSERT INTO chats (id, user_id, title) VALUES ($1, $2, 'Launch plan')")
            .bind(chat_id)
            .bind(user_id)
            .execute(pool)
            .await
            .unwrap();
        chat_id
    }

    pub async fn reload_user(pool: &PgPool, user_id: i32) -> User {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    pub fn bearer(user: &User) -> String {
        format!("Bearer {}", generate_jwt_token(user, "test_secret", 1).unwrap())
    }

    pub fn claims_for(user: &User) -> Claims {
        let token = generate_jwt_token(user, "test_secret", 1).unwrap();
        verify_jwt_token(&token, "test_secret").unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Request, http::StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = build_router(test_support::test_state());

        let response = app
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_routes_reject_anonymous_callers() {
        for (method, uri) in [
            ("GET", "/api/account"),
            ("GET", "/api/billing/plans"),
            ("GET", "/api/chats"),
            ("POST", "/api/generate"),
            ("POST", "/api/generatePost"),
        ] {
            let response = build_router(test_support::test_state())
                .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
            assert!(response.headers().contains_key(middleware::logging::REQUEST_ID_HEADER));
        }
    }
}
