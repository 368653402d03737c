//! Database row types. These map directly to SQLite rows and are converted
//! into the bazaar-types models at the query boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use bazaar_types::models::{Ad, Payment, PaymentStatus};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub struct AdRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub image_urls: String,
    pub animation_url: Option<String>,
    pub created_at: String,
    pub is_topped: bool,
    pub topped_expires_at: Option<String>,
}

impl AdRow {
    pub fn into_ad(self) -> Result<Ad> {
        Ok(Ad {
            id: self.id.parse().with_context(|| format!("corrupt ad id '{}'", self.id))?,
            owner_id: self
                .owner_id
                .parse()
                .with_context(|| {
                    format!("corrupt owner_id '{}' on ad '{}'", self.owner_id, self.id)
                })?,
            title: self.title,
            description: self.description,
            price: self.price,
            category: self.category,
            image_urls: serde_json::from_str(&self.image_urls)
                .with_context(|| format!("corrupt image_urls on ad '{}'", self.id))?,
            animation_url: self.animation_url,
            created_at: parse_timestamp(&self.created_at)?,
            is_topped: self.is_topped,
            topped_expires_at: self.topped_expires_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

pub struct PaymentRow {
    pub id: String,
    pub ad_id: String,
    pub price_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub created_at: String,
}

impl PaymentRow {
    pub fn into_payment(self) -> Result<Payment> {
        Ok(Payment {
            ad_id: self.ad_id.parse::<Uuid>().context("corrupt payment ad_id")?,
            status: PaymentStatus::parse(&self.status)
                .with_context(|| format!("unknown payment status '{}'", self.status))?,
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            price_id: self.price_id,
            amount: self.amount,
            currency: self.currency,
        })
    }
}

/// Fixed-precision RFC 3339 so stored timestamps sort lexicographically.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone: "YYYY-MM-DD HH:MM:SS".
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{}'", s))
}
