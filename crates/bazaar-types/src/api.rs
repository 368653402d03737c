use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Ad;

// -- JWT Claims --

/// Canonical JWT claims, issued by the auth handlers and checked by the
/// auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

// -- Ads --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAdRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Option<f64>,
    pub category: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub animation_url: Option<String>,
}

/// Partial update. Absent fields are left alone; `price`, `category` and
/// `animation_url` can be cleared by sending `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAdRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub price: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,
    pub image_urls: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub animation_url: Option<Option<String>>,
}

fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdResponse {
    #[serde(flatten)]
    pub ad: Ad,
    /// Whether the promotion is still running at response time.
    pub is_top_active: bool,
}

impl AdResponse {
    pub fn new(ad: Ad, now: DateTime<Utc>) -> Self {
        let is_top_active = ad.is_top_active(now);
        Self { ad, is_top_active }
    }
}

// -- Images --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadImageResponse {
    pub url: String,
}

// -- Payments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePaymentIntentRequest {
    pub ad_id: Option<Uuid>,
    pub price_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePaymentIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
