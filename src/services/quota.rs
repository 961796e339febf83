// Trial usage quotas: daily message/upload/package caps plus the cumulative
// trial message cap. Counters reset when the stored date is not today (UTC).

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::auth::User;
use crate::models::subscription::SubscriptionStatus;

pub const DAILY_MESSAGE_LIMIT: i32 = 10;
pub const TRIAL_MESSAGE_LIMIT: i32 = 30;
pub const DAILY_UPLOAD_LIMIT: i32 = 1;
pub const DAILY_PACKAGE_LIMIT: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaKind {
    Message,
    Upload,
    MarketingPackage,
}

impl QuotaKind {
    pub fn daily_limit(&self) -> i32 {
        match self {
            QuotaKind::Message => DAILY_MESSAGE_LIMIT,
            QuotaKind::Upload => DAILY_UPLOAD_LIMIT,
            QuotaKind::MarketingPackage => DAILY_PACKAGE_LIMIT,
        }
    }

    /// Cumulative cap over the whole trial, if the kind has one.
    pub fn trial_limit(&self) -> Option<i32> {
        match self {
            QuotaKind::Message => Some(TRIAL_MESSAGE_LIMIT),
            _ => None,
        }
    }

    fn counter_column(&self) -> &'static str {
        match self {
            QuotaKind::Message => "chats_today",
            QuotaKind::Upload => "uploads_today",
            QuotaKind::MarketingPackage => "packages_today",
        }
    }

    fn date_column(&self) -> &'static str {
        match self {
            QuotaKind::Message => "last_chat_date",
            QuotaKind::Upload => "last_upload_date",
            QuotaKind::MarketingPackage => "last_package_date",
        }
    }

    pub fn daily_limit_message(&self) -> &'static str {
        match self {
            QuotaKind::Message => "🚫 Daily Message Limit Reached\n\nYou've used all 10 messages for today. This limit resets at midnight.\n\n💡 Upgrade to our paid plan for unlimited messages and advanced features!",
            QuotaKind::Upload => "📎 Daily File Upload Limit\n\nYou've already uploaded 1 file today. This limit resets at midnight.\n\n💡 Upgrade to upload multiple files daily and get unlimited AI analysis!",
            QuotaKind::MarketingPackage => "📊 Daily Marketing Package Limit\n\nYou've already created 1 marketing package today. This limit resets at midnight.\n\n🚀 Upgrade to create unlimited marketing packages and scale your business faster!",
        }
    }
}

pub const TRIAL_COMPLETED_MESSAGE: &str = "🎯 Trial Period Completed\n\nYou've used all 30 messages included in your free trial.\n\n🚀 Upgrade now to continue using BuzAI with:\n• Unlimited messages\n• Priority support\n• Advanced features\n• No restrictions";

/// The slice of a user record the quota rules look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub status: SubscriptionStatus,
    pub count_today: i32,
    pub last_date: Option<NaiveDate>,
    pub trial_messages_sent: i32,
}

impl UsageSnapshot {
    pub fn from_user(user: &User, kind: QuotaKind) -> Self {
        let (count_today, last_date) = match kind {
            QuotaKind::Message => (user.chats_today, user.last_chat_date),
            QuotaKind::Upload => (user.uploads_today, user.last_upload_date),
            QuotaKind::MarketingPackage => (user.packages_today, user.last_package_date),
        };

        Self {
            status: user.subscription_status(),
            count_today,
            last_date,
            trial_messages_sent: user.trial_messages_sent,
        }
    }

    /// Today's count; a counter last touched on another day reads as zero.
    pub fn effective_count(&self, today: NaiveDate) -> i32 {
        if self.last_date == Some(today) {
            self.count_today
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum QuotaDecision {
    /// Not a trial account: nothing is counted.
    Unmetered,
    Allowed { used_today: i32, trial_total: i32 },
    DailyLimitReached,
    TrialLimitReached,
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Unmetered | QuotaDecision::Allowed { .. })
    }

    /// User-facing refusal text, `None` when the action may proceed.
    pub fn refusal_message(&self, kind: QuotaKind) -> Option<&'static str> {
        match self {
            QuotaDecision::DailyLimitReached => Some(kind.daily_limit_message()),
            QuotaDecision::TrialLimitReached => Some(TRIAL_COMPLETED_MESSAGE),
            _ => None,
        }
    }
}

/// Decide what one more action of `kind` would do, without touching storage.
pub fn evaluate(kind: QuotaKind, usage: &UsageSnapshot, today: NaiveDate) -> QuotaDecision {
    if usage.status != SubscriptionStatus::Trial {
        return QuotaDecision::Unmetered;
    }

    let used_today = usage.effective_count(today);
    if used_today >= kind.daily_limit() {
        return QuotaDecision::DailyLimitReached;
    }

    if let Some(limit) = kind.trial_limit() {
        if usage.trial_messages_sent >= limit {
            return QuotaDecision::TrialLimitReached;
        }
    }

    let trial_total = if kind.trial_limit().is_some() {
        usage.trial_messages_sent + 1
    } else {
        usage.trial_messages_sent
    };

    QuotaDecision::Allowed { used_today: used_today + 1, trial_total }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Reset-if-new-day, check and increment in one conditional UPDATE, so two
/// concurrent requests from the same user cannot both take the last slot.
pub async fn consume(
    pool: &PgPool,
    user_id: i32,
    kind: QuotaKind,
    today: NaiveDate,
) -> Result<QuotaDecision, sqlx::Error> {
    let counter = kind.counter_column();
    let date = kind.date_column();
    let (trial_increment, trial_guard) = match kind.trial_limit() {
        Some(_) => (
            ", trial_messages_sent = trial_messages_sent + 1",
            " AND trial_messages_sent < $4",
        ),
        None => ("", ""),
    };

    let sql = format!(
        "UPDATE users SET \
            {counter} = CASE WHEN {date} = $2 THEN {counter} + 1 ELSE 1 END, \
            {date} = $2{trial_increment}, \
            updated_at = NOW() \
         WHERE id = $1 AND status = 'trial' \
           AND (CASE WHEN {date} = $2 THEN {counter} ELSE 0 END) < $3{trial_guard} \
         RETURNING {counter}, trial_messages_sent"
    );

    // A miss is either a refusal or a row that changed under us; re-read and
    // classify, retrying once if the fresh snapshot says the slot is free.
    for _ in 0..2 {
        let mut query = sqlx::query_as::<_, (i32, i32)>(&sql)
            .bind(user_id)
            .bind(today)
            .bind(kind.daily_limit());
        if let Some(limit) = kind.trial_limit() {
            query = query.bind(limit);
        }

        if let Some((used_today, trial_total)) = query.fetch_optional(pool).await? {
            tracing::info!(
                "📊 Trial usage for user {}: {:?} {}/{} today, {} trial messages",
                user_id,
                kind,
                used_today,
                kind.daily_limit(),
                trial_total
            );
            return Ok(QuotaDecision::Allowed { used_today, trial_total });
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            crate::models::auth::USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        let Some(user) = user else {
            return Err(sqlx::Error::RowNotFound);
        };

        let decision = evaluate(kind, &UsageSnapshot::from_user(&user, kind), today);
        match decision {
            QuotaDecision::Allowed { .. } => continue,
            other => {
                if !other.is_allowed() {
                    tracing::warn!("Quota refused for user {}: {:?} -> {:?}", user_id, kind, other);
                }
                return Ok(other);
            }
        }
    }

    Ok(QuotaDecision::DailyLimitReached)
}

/// Consume one unit of `kind`, turning a refusal into a 429.
pub async fn enforce(pool: &PgPool, user_id: i32, kind: QuotaKind) -> Result<QuotaDecision, AppError> {
    let decision = consume(pool, user_id, kind, today()).await.map_err(|e| match e {
        sqlx::Error::RowNotFound => AppError::Unauthorized("User not found".to_string()),
        other => AppError::Database(other),
    })?;

    match decision.refusal_message(kind) {
        Some(message) => Err(AppError::QuotaExceeded(message.to_string())),
        None => Ok(decision),
    }
}

/// Today's usage as shown on the profile page.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub messages_today: i32,
    pub message_daily_limit: i32,
    pub trial_messages_sent: i32,
    pub trial_message_limit: i32,
    pub uploads_today: i32,
    pub upload_daily_limit: i32,
    pub packages_today: i32,
    pub package_daily_limit: i32,
}

impl UsageSummary {
    pub fn for_user(user: &User, today: NaiveDate) -> Self {
        let count = |kind| UsageSnapshot::from_user(user, kind).effective_count(today);
        Self {
            messages_today: count(QuotaKind::Message),
            message_daily_limit: DAILY_MESSAGE_LIMIT,
            trial_messages_sent: user.trial_messages_sent,
            trial_message_limit: TRIAL_MESSAGE_LIMIT,
            uploads_today: count(QuotaKind::Upload),
            upload_daily_limit: DAILY_UPLOAD_LIMIT,
            packages_today: count(QuotaKind::MarketingPackage),
            package_daily_limit: DAILY_PACKAGE_LIMIT,
        }
    }
}
