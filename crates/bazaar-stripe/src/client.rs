use std::collections::HashMap;

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::StripeError;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
    /// Amount in the currency's minor unit. Absent for tiered/custom prices.
    pub unit_amount: Option<i64>,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Thin client over the Stripe REST API (form-encoded requests, bearer auth).
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self::with_base_url(secret_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(secret_key: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            base_url,
        }
    }

    /// API URL for `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StripeError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| StripeError::BaseUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StripeError::BaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn retrieve_price(&self, price_id: &str) -> Result<Price, StripeError> {
        let resp = self
            .http
            .get(self.endpoint(&["prices", price_id])?)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Create a payment intent with automatic payment methods enabled.
    pub async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: &[(&str, &str)],
    ) -> Result<PaymentIntent, StripeError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), amount.to_string()),
            ("currency".into(), currency.to_string()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{}]", key), value.to_string()));
        }

        let resp = self
            .http
            .post(self.endpoint(&["payment_intents"])?)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;
        let intent: PaymentIntent = parse_response(resp).await?;
        debug!("Created payment intent {} for {} {}", intent.id, intent.amount, intent.currency);
        Ok(intent)
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, StripeError> {
    let status = resp.status();
    let body = resp.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
        warn!("Stripe returned {}: {}", status, message);
        return Err(StripeError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_slice(&body)?)
}
