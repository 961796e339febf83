// src/models/subscription.rs
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::auth::User;

/// Subscription state stored in `users.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    None,
    Trial,
    Pending,
    Approved,
    Denied,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Approved => "approved",
            SubscriptionStatus::Denied => "denied",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn from_string(status: &str) -> Self {
        match status {
            "trial" => SubscriptionStatus::Trial,
            "pending" => SubscriptionStatus::Pending,
            "approved" => SubscriptionStatus::Approved,
            "denied" => SubscriptionStatus::Denied,
            "expired" => SubscriptionStatus::Expired,
            _ => SubscriptionStatus::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanCode {
    Trial,
    Weekly,
    Monthly,
    Quarterly,
    Semiannual,
    Yearly,
}

/// One entry of the plan catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub code: PlanCode,
    pub title: &'static str,
    pub price: &'static str,
    pub duration: &'static str,
    pub amount: Decimal,
    pub is_trial: bool,
    pub features: Vec<&'static str>,
}

pub const TRIAL_DAYS: i64 = 3;
const DAYS_PER_MONTH: i64 = 30;

impl PlanCode {
    pub const ALL: [PlanCode; 6] = [
        PlanCode::Trial,
        PlanCode::Weekly,
        PlanCode::Monthly,
        PlanCode::Quarterly,
        PlanCode::Semiannual,
        PlanCode::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCode::Trial => "trial",
            PlanCode::Weekly => "weekly",
            PlanCode::Monthly => "monthly",
            PlanCode::Quarterly => "quarterly",
            PlanCode::Semiannual => "semiannual",
            PlanCode::Yearly => "yearly",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        PlanCode::ALL
            .into_iter()
            .find(|plan| plan.as_str() == code.trim().to_lowercase())
    }

    /// Length of the plan window. Paid plans count a month as 30 days, so
    /// the weekly plan (a quarter month) lasts 7.5 days.
    pub fn duration(&self) -> Duration {
        let hours_per_month = DAYS_PER_MONTH * 24;
        match self {
            PlanCode::Trial => Duration::days(TRIAL_DAYS),
            PlanCode::Weekly => Duration::hours(hours_per_month / 4),
            PlanCode::Monthly => Duration::hours(hours_per_month),
            PlanCode::Quarterly => Duration::hours(hours_per_month * 3),
            PlanCode::Semiannual => Duration::hours(hours_per_month * 6),
            PlanCode::Yearly => Duration::hours(hours_per_month * 12),
        }
    }

    pub fn window_from(&self, start: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (start, start + self.duration())
    }

    pub fn plan(&self) -> Plan {
        let paid_features = vec!["Unlimited AI chats", "Full strategies", "Advanced content tools"];
        let (title, price, duration, amount) = match self {
            PlanCode::Trial => ("3-Day Free Trial", "$0", "for 3 days", 0),
            PlanCode::Weekly => ("Weekly Plan", "$5", "per week", 5),
            PlanCode::Monthly => ("1 Month", "$15", "per month", 15),
            PlanCode::Quarterly => ("3 Months", "$40", "every 3 months", 40),
            PlanCode::Semiannual => ("6 Months", "$70", "every 6 months", 70),
            PlanCode::Yearly => ("1 Year", "$120", "per year", 120),
        };

        Plan {
            code: *self,
            title,
            price,
            duration,
            amount: Decimal::from(amount),
            is_trial: *self == PlanCode::Trial,
            features: if *self == PlanCode::Trial {
                vec!["Access to AI chats", "Basic strategies", "Social media content"]
            } else {
                paid_features
            },
        }
    }
}

/// Plans the user may still pick. The trial is offered once, and never to
/// users who already paid or were approved.
pub fn available_plans(user: &User) -> Vec<Plan> {
    let hide_trial = user.trial_used
        || user.paid
        || user.subscription_status() == SubscriptionStatus::Approved;

    PlanCode::ALL
        .iter()
        .filter(|code| !(hide_trial && **code == PlanCode::Trial))
        .map(PlanCode::plan)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    Active,
    Pending,
    TrialExpired,
    PlanExpired,
    NoPlan,
}

impl AccessState {
    /// Where the client should send the user next.
    pub fn route(&self) -> &'static str {
        match self {
            AccessState::Active => "/dashboard",
            AccessState::Pending => "/pending",
            AccessState::TrialExpired | AccessState::PlanExpired | AccessState::NoPlan => "/billing",
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, AccessState::TrialExpired | AccessState::PlanExpired)
    }

    /// Why AI features are unavailable, `None` when they are not.
    pub fn denial_message(&self) -> Option<&'static str> {
        match self {
            AccessState::Active => None,
            AccessState::Pending => Some("Your payment is awaiting approval. You will get access once it is reviewed."),
            AccessState::TrialExpired => Some("Your free trial has ended. Please choose a plan to continue."),
            AccessState::PlanExpired => Some("Your plan has expired. Please renew to continue."),
            AccessState::NoPlan => Some("Please start your free trial or choose a plan to continue."),
        }
    }
}

/// Decide whether the user can use the dashboard right now.
pub fn access_state(user: &User, now: DateTime<Utc>) -> AccessState {
    match user.subscription_status() {
        SubscriptionStatus::Pending => AccessState::Pending,
        SubscriptionStatus::Trial => match user.trial_end {
            Some(end) if end > now => AccessState::Active,
            _ => AccessState::TrialExpired,
        },
        SubscriptionStatus::Approved => match user.end_date {
            Some(end) if end > now => AccessState::Active,
            _ => AccessState::PlanExpired,
        },
        _ => AccessState::NoPlan,
    }
}

/// The plan shown to the user. Approved accounts whose plan was never
/// copied over report the plan they asked for.
pub fn effective_plan(user: &User) -> Option<String> {
    match (&user.plan, user.subscription_status()) {
        (None, SubscriptionStatus::Approved) => user.requested_plan.clone(),
        (plan, _) => plan.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Denied,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Denied => "denied",
        }
    }

    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(PaymentStatus::Pending),
            "approved" => Some(PaymentStatus::Approved),
            "denied" => Some(PaymentStatus::Denied),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: i32,
    pub email: String,
    pub plan: String,
    pub amount: Decimal,
    pub method: String,
    pub status: String,
    pub reference: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub plan: String,
    pub email: String,
    pub reference: Option<String>,
}
