// src/handlers/upload.rs
use crate::error::{ApiResult, AppError};
use crate::handlers::account::load_active_user;
use crate::handlers::chat::{load_owned_chat, parse_chat_id};
use crate::middleware::auth::{auth_middleware, require_user_id};
use crate::models::auth::Claims;
use crate::models::chat::FileUploadResponse;
use crate::services::quota::{self, QuotaKind};
use crate::AppState;
use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        DefaultBodyLimit, Extension,
    },
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use std::sync::Arc;

pub fn upload_routes(max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/upload", post(upload_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(axum::middleware::from_fn(auth_middleware))
}

/// "10 MB" for whole mebibytes, otherwise kilobytes.
fn size_label(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}

fn multipart_error(err: MultipartError, max_upload_bytes: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!("Upload rejected: body exceeds {} bytes", max_upload_bytes);
        return AppError::PayloadTooLarge(format!(
            "File is too large. The maximum upload size is {}.",
            size_label(max_upload_bytes)
        ));
    }

    tracing::error!("Failed to parse multipart body: {}", err);
    AppError::BadRequest("Invalid multipart body".to_string())
}

/// The `file` and `chatId` parts of an upload form.
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    data: Option<Vec<u8>>,
    chat_id: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart, max_upload_bytes: usize) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, max_upload_bytes))?
        {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let file_name = field.file_name().unwrap_or("upload.txt").to_string();
                    let data = field.bytes().await.map_err(|e| {
                        tracing::error!("Failed to read bytes for file '{}'", file_name);
                        multipart_error(e, max_upload_bytes)
                    })?;
                    form.file_name = Some(file_name);
                    form.data = Some(data.to_vec());
                }
                Some("chatId") | Some("chat_id") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e, max_upload_bytes))?;
                    form.chat_id = Some(text.trim().to_string()).filter(|id| !id.is_empty());
                }
                other => tracing::debug!("Skipping multipart field {:?}", other),
            }
        }

        Ok(form)
    }

    fn into_parts(self) -> Result<(String, Vec<u8>, String), AppError> {
        match (self.file_name, self.data, self.chat_id) {
            (Some(name), Some(data), Some(chat_id)) => Ok((name, data, chat_id)),
            _ => Err(AppError::BadRequest("Missing file or chat ID".to_string())),
        }
    }
}

/// Text of an uploaded file; invalid UTF-8 sequences become U+FFFD.
pub fn decode_file_content(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

async fn upload_file(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<FileUploadResponse> {
    let user_id = require_user_id(&claims)?;
    let multipart = multipart.map_err(|rejection| {
        tracing::warn!("⚠️ Rejected upload: {}", rejection.body_text());
        AppError::BadRequest("Expected a multipart/form-data body".to_string())
    })?;

    let max_upload_bytes = state.config.max_upload_bytes;
    let (file_name, data, chat_id) = UploadForm::read(multipart, max_upload_bytes).await?.into_parts()?;

    let chat_id = parse_chat_id(&chat_id)?;
    load_owned_chat(&state.db_pool, chat_id, user_id).await?;

    load_active_user(&state, user_id).await?;
    quota::enforce(&state.db_pool, user_id, QuotaKind::Upload).await?;

    let content = decode_file_content(&data);
    let content_length = content.chars().count();

    sqlx::query(
        "UPDATE chats SET file_name = $1, file_content = $2, file_uploaded_at = NOW() WHERE id = $3",
    )
    .bind(&file_name)
    .bind(&content)
    .bind(chat_id)
    .execute(&state.db_pool)
    .await?;

    tracing::info!("✅ File uploaded successfully: {} ({} chars) to chat {}", file_name, content_length, chat_id);

    Ok(Json(FileUploadResponse {
        success: true,
        message: "File uploaded successfully".to_string(),
        file_name,
        content_length,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::User;
    use crate::models::subscription::SubscriptionStatus;
    use crate::test_support::{bearer, database_state, insert_chat, insert_user, reload_user, test_state};
    use axum::{body::Body, extract::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "buzai-boundary";

    fn chat_part(chat_id: &str) -> String {
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"chatId\"\r\n\r\n{id}\r\n",
            b = BOUNDARY,
            id = chat_id
        )
    }

    fn file_part(name: &str, content: &str) -> String {
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
             Content-Type: text/plain\r\n\r\n{content}\r\n",
            b = BOUNDARY,
            name = name,
            content = content
        )
    }

    fn closing() -> String {
        format!("--{}--\r\n", BOUNDARY)
    }

    async fn send_upload(
        state: Arc<AppState>,
        authorization: String,
        content_type: String,
        body: String,
    ) -> (StatusCode, serde_json::Value) {
        let max_upload_bytes = state.config.max_upload_bytes;
        let response = upload_routes(max_upload_bytes)
            .layer(Extension(state))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/upload")
                    .header("authorization", authorization)
                    .header("content-type", content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn multipart_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    fn sample_bearer() -> String {
        bearer(&User::sample(SubscriptionStatus::Trial))
    }

    #[test]
    fn test_decode_is_lossy() {
        assert_eq!(decode_file_content("Q3 revenue: £40k".as_bytes()), "Q3 revenue: £40k");
        assert_eq!(decode_file_content(&[b'o', b'k', 0xff]), "ok\u{fffd}");
    }

    #[test]
    fn test_size_label() {
        assert_eq!(size_label(10 * 1024 * 1024), "10 MB");
        assert_eq!(size_label(1024 * 1024), "1 MB");
        assert_eq!(size_label(2048), "2 KB");
        assert_eq!(size_label(1500), "2 KB");
    }

    #[test]
    fn test_form_requires_both_parts() {
        let missing_chat = UploadForm {
            file_name: Some("plan.txt".to_string()),
            data: Some(b"hello".to_vec()),
            chat_id: None,
        };
        assert_eq!(missing_chat.into_parts().unwrap_err().to_string(), "Missing file or chat ID");

        let complete = UploadForm {
            file_name: Some("plan.txt".to_string()),
            data: Some(Vec::new()),
            chat_id: Some("abc".to_string()),
        };
        assert!(complete.into_parts().is_ok());
    }

    #[tokio::test]
    async fn test_upload_without_file_part_is_bad_request() {
        let body = chat_part(&Uuid::new_v4().to_string()) + &closing();
        let (status, value) = send_upload(test_state(), sample_bearer(), multipart_type(), body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"], "Missing file or chat ID");
    }

    #[tokio::test]
    async fn test_oversized_upload_is_payload_too_large() {
        let content = "x".repeat(1024 * 1024 + 1);
        let body = chat_part(&Uuid::new_v4().to_string()) + &file_part("big.txt", &content) + &closing();
        let (status, value) = send_upload(test_state(), sample_bearer(), multipart_type(), body).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "File is too large. The maximum upload size is 1 MB.");
    }

    #[tokio::test]
    async fn test_non_multipart_body_gets_error_envelope() {
        let (status, value) = send_upload(
            test_state(),
            sample_bearer(),
            "application/json".to_string(),
            r#"{"file":"plan.txt"}"#.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Expected a multipart/form-data body");
    }

    #[tokio::test]
    async fn test_non_uuid_chat_id_is_not_found() {
        let body = chat_part("chat-1") + &file_part("plan.txt", "notes") + &closing();
        let (status, value) = send_upload(test_state(), sample_bearer(), multipart_type(), body).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["error"], "Chat not found");
    }

    #[tokio::test]
    async fn test_trial_upload_is_stored_once_per_day() {
        let Some(state) = database_state(None).await else { return };
        let user = insert_user(&state.db_pool, SubscriptionStatus::Trial).await;
        let chat_id = insert_chat(&state.db_pool, user.id).await;

        let body = chat_part(&chat_id.to_string()) + &file_part("menu.txt", "Espresso 2.50") + &closing();
        let (status, value) = send_upload(state.clone(), bearer(&user), multipart_type(), body.clone()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["file_name"], "menu.txt");
        assert_eq!(value["content_length"], 13);

        let stored: (Option<String>, Option<String>) =
            sqlx::query_as("SELECT file_name, file_content FROM chats WHERE id = $1")
                .bind(chat_id)
                .fetch_one(&state.db_pool)
                .await
                .unwrap();
        assert_eq!(stored, (Some("menu.txt".to_string()), Some("Espresso 2.50".to_string())));

        let (status, value) = send_upload(state.clone(), bearer(&user), multipart_type(), body).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(value["error"], QuotaKind::Upload.daily_limit_message());
        assert_eq!(reload_user(&state.db_pool, user.id).await.uploads_today, 1);
    }

    #[tokio::test]
    async fn test_denied_account_cannot_upload() {
        let Some(state) = database_state(None).await else { return };
        let user = insert_user(&state.db_pool, SubscriptionStatus::Denied).await;
        let chat_id = insert_chat(&state.db_pool, user.id).await;

        let body = chat_part(&chat_id.to_string()) + &file_part("menu.txt", "Espresso") + &closing();
        let (status, value) = send_upload(state, bearer(&user), multipart_type(), body).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(value["route"], "/billing");
    }
}
