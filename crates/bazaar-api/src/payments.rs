use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::{SubsecRound, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use bazaar_db::PromotionOutcome;
use bazaar_stripe::StripeError;
use bazaar_stripe::webhook::PAYMENT_INTENT_SUCCEEDED;
use bazaar_types::api::{CreatePaymentIntentRequest, CreatePaymentIntentResponse, WebhookAck};
use bazaar_types::models::{Payment, PaymentStatus, top_expiry_from};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::indexer::SyncEvent;
use crate::state::{AppState, run_db};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /payments/intent: start a "top ad" payment.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreatePaymentIntentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let stripe = state
        .stripe
        .as_ref()
        .ok_or(ApiError::Unavailable("Payments are not configured."))?;

    let ad_id = req.ad_id.ok_or_else(|| ApiError::bad_request("Missing ad_id or price_id"))?;
    let price_id = req
        .price_id
        .filter(|p| !p.trim().is_empty())
        .or_else(|| state.stripe_price_id.clone())
        .ok_or_else(|| ApiError::bad_request("Missing ad_id or price_id"))?;
    if !is_valid_price_id(&price_id) {
        return Err(ApiError::bad_request("Invalid price_id or price not found"));
    }

    let ad = run_db(&state, move |db| db.get_ad(ad_id))
        .await?
        .ok_or(ApiError::NotFound)?;
    if ad.is_top_active(Utc::now()) {
        return Err(ApiError::Conflict("Ad is already topped.".into()));
    }

    let price = match stripe.retrieve_price(&price_id).await {
        Ok(price) => price,
        Err(StripeError::Api { status: 404, .. }) => {
            return Err(ApiError::bad_request("Invalid price_id or price not found"));
        }
        Err(e) => return Err(stripe_failure(e)),
    };
    let amount = price
        .unit_amount
        .ok_or_else(|| ApiError::bad_request("Invalid price_id or price not found"))?;

    let ad_id_str = ad_id.to_string();
    let intent = stripe
        .create_payment_intent(
            amount,
            &price.currency,
            &[("ad_id", ad_id_str.as_str()), ("price_id", price_id.as_str())],
        )
        .await
        .map_err(stripe_failure)?;

    let client_secret = intent
        .client_secret
        .clone()
        .ok_or_else(|| anyhow::anyhow!("payment intent {} has no client secret", intent.id))?;

    let payment = Payment {
        id: intent.id.clone(),
        ad_id,
        price_id,
        amount: intent.amount,
        currency: intent.currency.clone(),
        status: PaymentStatus::Pending,
        created_at: Utc::now().trunc_subsecs(6),
    };
    run_db(&state, move |db| db.insert_payment(&payment)).await?;
    info!("Payment intent {} created for ad {}", intent.id, ad_id);

    Ok(Json(CreatePaymentIntentResponse { client_secret }))
}

/// POST /webhooks/stripe: signed server-to-server callback.
///
/// A succeeded payment tops its ad for seven days. Redelivered events are
/// acknowledged without extending the promotion again.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let secret = state
        .stripe_webhook_secret
        .as_deref()
        .ok_or(ApiError::Unavailable("Webhook secret is not configured."))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Webhook Error: missing Stripe-Signature header"))?;

    let event = bazaar_stripe::construct_event(&body, signature, secret).map_err(|e| {
        warn!("Rejected webhook: {}", e);
        ApiError::bad_request(format!("Webhook Error: {}", e))
    })?;

    match event.event_type.as_str() {
        PAYMENT_INTENT_SUCCEEDED => {
            let intent = event
                .payment_intent()
                .map_err(|e| ApiError::bad_request(format!("Webhook Error: {}", e)))?;

            let ad_id = intent.metadata.get("ad_id");
            let price_id = intent.metadata.get("price_id");
            let (Some(ad_id), Some(_)) = (ad_id, price_id) else {
                info!("Payment {} has no promotion metadata; ignoring", intent.id);
                return Ok((StatusCode::OK, Json(WebhookAck { received: true })));
            };
            let Ok(ad_id) = ad_id.parse::<Uuid>() else {
                warn!("Payment {} carries malformed ad_id '{}'", intent.id, ad_id);
                return Ok((StatusCode::OK, Json(WebhookAck { received: true })));
            };

            let expires_at = top_expiry_from(Utc::now().trunc_subsecs(6));
            let event_id = event.id.clone();
            let event_type = event.event_type.clone();
            let payment_id = intent.id.clone();
            let outcome = run_db(&state, move |db| {
                db.apply_promotion(&event_id, &event_type, ad_id, &payment_id, expires_at)
            })
            .await
            .map_err(|e| {
                warn!("Error updating ad {} after payment: {}", ad_id, e);
                ApiError::Unavailable("Failed to update ad status.")
            })?;

            match outcome {
                PromotionOutcome::Applied => {
                    info!("Ad {} topped until {}", ad_id, expires_at);
                    if let Some(ad) = run_db(&state, move |db| db.get_ad(ad_id)).await? {
                        state.indexer.enqueue(SyncEvent::Upsert(ad));
                    }
                }
                PromotionOutcome::AlreadyProcessed => {
                    info!("Event {} already processed; ignoring", event.id);
                }
                PromotionOutcome::AdMissing => {
                    warn!("Payment {} succeeded for unknown ad {}", intent.id, ad_id);
                }
            }
        }
        other => info!("Unhandled event type {}", other),
    }

    Ok((StatusCode::OK, Json(WebhookAck { received: true })))
}

/// Stripe's own error message is relayed with a 500.
fn stripe_failure(e: StripeError) -> ApiError {
    match e {
        StripeError::Api { message, .. } => ApiError::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        },
        other => ApiError::Internal(other.into()),
    }
}

/// Stripe object ids are `[A-Za-z0-9_]` only.
fn is_valid_price_id(id: &str) -> bool {
    id.len() <= 255 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
