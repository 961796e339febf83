use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::subscription::SubscriptionStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub status: String,
    pub plan: Option<String>,
    pub requested_plan: Option<String>,
    pub paid: bool,
    pub trial_used: bool,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub trial_messages_sent: i32,
    pub chats_today: i32,
    pub last_chat_date: Option<NaiveDate>,
    pub uploads_today: i32,
    pub last_upload_date: Option<NaiveDate>,
    pub packages_today: i32,
    pub last_package_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn subscription_status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_string(&self.status)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub status: String,
    pub plan: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Subject (user id)
    pub email: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub exp: usize,   // Expiration time
    pub iat: usize,   // Issued at
}

impl Claims {
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse::<i32>().ok()
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            is_active: user.is_active,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            status: user.status,
            plan: user.plan,
            created_at: user.created_at,
        }
    }
}

pub const USER_COLUMNS: &str = "id, email, password_hash, is_active, is_staff, is_superuser, \
     status, plan, requested_plan, paid, trial_used, trial_start, trial_end, start_date, end_date, \
     trial_messages_sent, chats_today, last_chat_date, uploads_today, last_upload_date, \
     packages_today, last_package_date, created_at, updated_at";

#[cfg(test)]
impl User {
    pub fn sample(status: SubscriptionStatus) -> Self {
        let now = Utc::now();
        User {
            id: 7,
            email: "founder@buzai.test".to_string(),
            password_hash: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            status: status.as_str().to_string(),
            plan: None,
            requested_plan: None,
            paid: false,
            trial_used: false,
            trial_start: None,
            trial_end: None,
            start_date: None,
            end_date: None,
            trial_messages_sent: 0,
            chats_today: 0,
            last_chat_date: None,
            uploads_today: 0,
            last_upload_date: None,
            packages_today: 0,
            last_package_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}
