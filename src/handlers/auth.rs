use crate::error::{ApiResult, AppError};
use crate::extract::JsonBody;
use crate::middleware::auth::bearer_token;
use crate::middleware::rate_limit::strict_rate_limit_middleware;
use crate::models::auth::*;
use crate::models::subscription::SubscriptionStatus;
use crate::AppState;
use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap},
    response::Json,
    routing::{get, post, Router},
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde_json::json;
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 6;
const DUPLICATE_EMAIL: &str = "User with this email already exists";

pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .layer(axum::middleware::from_fn(strict_rate_limit_middleware))
        .route("/api/auth/verify", get(verify_token))
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    if email.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".to_string()));
    }

    if !email.contains('@') {
        return Err(AppError::BadRequest("Please enter a valid email address".to_string()));
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters long".to_string(),
        ));
    }

    Ok(())
}

/// A concurrent registration can win the race between the lookup and the
/// insert; its unique violation is the same conflict.
fn registration_error(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            tracing::warn!("Duplicate registration rejected by the email constraint");
            AppError::Conflict(DUPLICATE_EMAIL.to_string())
        }
        other => AppError::Database(other),
    }
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    let email = payload.email.trim().to_lowercase();
    validate_credentials(&email, &payload.password)?;

    let existing_user = sqlx::query_scalar::<_, i32>("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db_pool)
        .await?;

    if existing_user.is_some() {
        return Err(AppError::Conflict(DUPLICATE_EMAIL.to_string()));
    }

    let password_hash = hash(&payload.password, DEFAULT_COST).map_err(|e| {
        tracing::error!("Error hashing password: {}", e);
        AppError::Internal("Failed to hash password".to_string())
    })?;

    // New accounts have no plan until they start the trial or pay
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (email, password_hash, is_active, is_superuser, is_staff, status, created_at, updated_at)
         VALUES ($1, $2, true, false, false, $3, NOW(), NOW())
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(&email)
    .bind(&password_hash)
    .bind(SubscriptionStatus::None.as_str())
    .fetch_one(&state.db_pool)
    .await
    .map_err(registration_error)?;

    tracing::info!("👤 Registered user {} ({})", user.id, user.email);

    let token = issue_token(&state, &user)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "User registered successfully".to_string(),
        user: UserResponse::from(user),
        token,
    }))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".to_string()));
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE email = $1 AND is_active = true",
        USER_COLUMNS
    ))
    .bind(&email)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    let password_ok = verify(&payload.password, &user.password_hash).map_err(|e| {
        tracing::error!("Error verifying password: {}", e);
        AppError::Internal("Failed to verify password".to_string())
    })?;

    if !password_ok {
        tracing::warn!("Failed login for {}", email);
        return Err(AppError::Unauthorized("Invalid email or password".to_string()));
    }

    let token = issue_token(&state, &user)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserResponse::from(user),
        token,
    }))
}

async fn verify_token(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
) -> ApiResult<serde_json::Value> {
    let auth_str = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let token = bearer_token(auth_str).ok_or_else(|| {
        AppError::Unauthorized("Invalid Authorization header format. Expected 'Bearer <token>'".to_string())
    })?;

    let claims = verify_jwt_token(token, &state.config.jwt_secret).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;

    let user_id = claims
        .user_id()
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1 AND is_active = true",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "user": UserResponse::from(user)
    })))
}

/// Load the caller's user row; a token for a removed account is a 401.
pub async fn load_user(state: &AppState, user_id: i32) -> Result<User, AppError> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))
}

fn issue_token(state: &AppState, user: &User) -> Result<String, AppError> {
    generate_jwt_token(user, &state.config.jwt_secret, state.config.jwt_ttl_hours).map_err(|e| {
        tracing::error!("Error generating JWT token: {}", e);
        AppError::Internal("Failed to generate authentication token".to_string())
    })
}

pub fn generate_jwt_token(
    user: &User,
    secret: &str,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration = now + Duration::hours(ttl_hours);

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        is_superuser: user.is_superuser,
        is_staff: user.is_staff,
        exp: expiration.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
}

pub fn verify_jwt_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{database_state, test_state};
    use axum::{body::Body, extract::Request, http::StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[test]
    fn test_token_round_trip() {
        let mut user = User::sample(SubscriptionStatus::Approved);
        user.is_staff = true;

        let token = generate_jwt_token(&user, "secret", 24).unwrap();
        let claims = verify_jwt_token(&token, "secret").unwrap();

        assert_eq!(claims.user_id(), Some(7));
        assert_eq!(claims.email, "founder@buzai.test");
        assert!(claims.is_staff);
        assert!(!claims.is_superuser);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let user = User::sample(SubscriptionStatus::Trial);
        let token = generate_jwt_token(&user, "secret", -2).unwrap();
        assert!(verify_jwt_token(&token, "secret").is_err());
    }

    #[test]
    fn test_credential_validation() {
        assert!(validate_credentials("a@b.co", "secret1").is_ok());
        assert!(matches!(validate_credentials("", "secret1"), Err(AppError::BadRequest(_))));
        assert!(matches!(validate_credentials("nobody", "secret1"), Err(AppError::BadRequest(_))));
        assert!(matches!(validate_credentials("a@b.co", "12345"), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_short_password_before_touching_db() {
        let app = auth_routes().layer(Extension(test_state()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/register")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"email":"new@buzai.test","password":"123"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Password must be at least 6 characters long");
    }

    #[derive(Debug)]
    struct DuplicateEmail;

    impl std::fmt::Display for DuplicateEmail {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("duplicate key value violates unique constraint \"users_email_key\"")
        }
    }

    impl std::error::Error for DuplicateEmail {}

    impl sqlx::error::DatabaseError for DuplicateEmail {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint \"users_email_key\""
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some("23505".into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn test_unique_violation_on_insert_is_conflict() {
        let err = registration_error(sqlx::Error::Database(Box::new(DuplicateEmail)));
        assert!(matches!(&err, AppError::Conflict(msg) if msg == DUPLICATE_EMAIL));

        let err = registration_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_register_with_malformed_json_gets_error_envelope() {
        let app = auth_routes().layer(Extension(test_state()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/register")
                    .header("content-type", "application/json")
                    .body(Body::from("{oops"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid JSON body");
    }

    #[tokio::test]
    async fn test_racing_registrations_yield_one_conflict() {
        let Some(state) = database_state(None).await else { return };
        let email = format!("race-{}@buzai.test", uuid::Uuid::new_v4());
        let attempt = || {
            register(
                Extension(state.clone()),
                JsonBody(RegisterRequest {
                    email: email.clone(),
                    password: "secret123".to_string(),
                }),
            )
        };

        let (first, second) = tokio::join!(attempt(), attempt());
        let results = [first, second];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::Conflict(msg)) if msg == DUPLICATE_EMAIL)));

        let Json(created) = results.into_iter().find_map(Result::ok).unwrap();
        assert_eq!(created.user.status, "none");
    }

    #[tokio::test]
    async fn test_verify_without_header_is_unauthorized() {
        let app = auth_routes().layer(Extension(test_state()));

        let response = app
            .oneshot(Request::builder().uri("/api/auth/verify").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
