use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long a paid promotion keeps an ad at the top of listings.
pub const TOP_DURATION_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A classified listing.
///
/// `is_topped` is set once per successful promotion payment and never
/// cleared; whether the promotion is still running is decided by comparing
/// `topped_expires_at` against the current time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub image_urls: Vec<String>,
    pub animation_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_topped: bool,
    pub topped_expires_at: Option<DateTime<Utc>>,
}

impl Ad {
    /// True while a paid promotion is running.
    pub fn is_top_active(&self, now: DateTime<Utc>) -> bool {
        self.is_topped && self.topped_expires_at.is_some_and(|exp| exp > now)
    }
}

/// Expiry for a promotion that starts at `now`.
pub fn top_expiry_from(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(TOP_DURATION_DAYS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "succeeded" => Some(Self::Succeeded),
            _ => None,
        }
    }
}

/// Payment for an ad promotion, keyed by the processor's payment intent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub ad_id: Uuid,
    pub price_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}
