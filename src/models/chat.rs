// src/models/chat.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: i32,
    pub title: String,
    pub file_name: Option<String>,
    #[serde(skip_serializing)]
    pub file_content: Option<String>,
    pub file_uploaded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "user" | "human" => Some(MessageRole::User),
            "assistant" | "model" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub role: Option<String>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: Option<String>,
    #[serde(alias = "chatId")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub ok: bool,
    pub result: String,
}

#[derive(Debug, Deserialize)]
pub struct MarketingPackageRequest {
    pub prompt: Option<String>,
    #[serde(alias = "chatId")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarketingPackageResponse {
    pub success: bool,
    pub marketing_package: String,
    pub enhanced: bool,
    pub package_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FileUploadResponse {
    pub success: bool,
    pub message: String,
    pub file_name: String,
    pub content_length: usize,
}

pub const CHAT_COLUMNS: &str = "id, user_id, title, file_name, file_content, file_uploaded_at, created_at";
