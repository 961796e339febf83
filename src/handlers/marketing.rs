// src/handlers/marketing.rs
use crate::error::{ApiResult, AppError};
use crate::extract::JsonBody;
use crate::handlers::account::load_active_user;
use crate::handlers::chat::{insert_message, load_owned_chat, parse_chat_id};
use crate::middleware::auth::{auth_middleware, require_user_id};
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::models::auth::Claims;
use crate::models::chat::{MarketingPackageRequest, MarketingPackageResponse, MessageRole};
use crate::services::marketing::{manual_summary, static_package, MarketingPackage, PackageSource};
use crate::services::quota::{self, QuotaKind};
use crate::services::MarketingPackageService;
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::post,
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn marketing_routes() -> Router {
    Router::new()
        .route("/api/generatePost", post(generate_marketing_package))
        .layer(axum::middleware::from_fn(rate_limit_middleware))
        .layer(axum::middleware::from_fn(auth_middleware))
}

fn require_idea(payload: &MarketingPackageRequest) -> Result<&str, AppError> {
    payload
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|idea| !idea.is_empty())
        .ok_or_else(|| AppError::BadRequest("Please provide a business idea or topic".to_string()))
}

/// The chat to store the package in. A blank id means none.
fn target_chat(payload: &MarketingPackageRequest) -> Result<Option<Uuid>, AppError> {
    match payload.chat_id.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_chat_id(raw).map(Some),
    }
}

pub fn package_response(package: MarketingPackage) -> MarketingPackageResponse {
    MarketingPackageResponse {
        success: true,
        enhanced: package.source != PackageSource::StaticBackup,
        package_type: package.source.as_str(),
        marketing_package: package.content,
    }
}

async fn generate_marketing_package(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    JsonBody(payload): JsonBody<MarketingPackageRequest>,
) -> ApiResult<MarketingPackageResponse> {
    let user_id = require_user_id(&claims)?;
    let idea = require_idea(&payload)?;
    let chat_id = target_chat(&payload)?;

    if let Some(chat_id) = chat_id {
        load_owned_chat(&state.db_pool, chat_id, user_id).await?;
    }

    load_active_user(&state, user_id).await?;
    quota::enforce(&state.db_pool, user_id, QuotaKind::MarketingPackage).await?;

    tracing::info!("🎨 Generating marketing package for user {}", user_id);

    let package = match &state.generator {
        Some(generator) => MarketingPackageService::new(generator.as_ref()).generate(idea).await,
        None => {
            tracing::warn!("No generation client configured, returning static marketing package");
            MarketingPackage {
                summary: manual_summary(idea),
                content: static_package(idea),
                source: PackageSource::StaticBackup,
            }
        }
    };

    tracing::info!("📦 Marketing package ready ({}) for \"{}\"", package.source.as_str(), package.summary);

    if let Some(chat_id) = chat_id {
        insert_message(&state.db_pool, chat_id, MessageRole::Assistant, &package.content).await?;
    }

    Ok(Json(package_response(package)))
}
