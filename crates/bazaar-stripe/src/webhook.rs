use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::client::PaymentIntent;
use crate::error::StripeError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, matching Stripe's SDK default.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl Event {
    /// Interpret `data.object` as a payment intent.
    pub fn payment_intent(&self) -> Result<PaymentIntent, StripeError> {
        Ok(serde_json::from_value(self.data.object.clone())?)
    }
}

/// Verify the `Stripe-Signature` header against the raw body and parse it.
pub fn construct_event(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<Event, StripeError> {
    let now = chrono::Utc::now().timestamp();
    verify_signature(payload, sig_header, secret, now, DEFAULT_TOLERANCE_SECS)?;
    Ok(serde_json::from_slice(payload)?)
}

/// Header format: `t=<unix>,v1=<hex hmac>[,v1=...][,v0=...]`. The signed
/// message is `"<t>.<payload>"`; any one matching `v1` is accepted.
pub fn verify_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in sig_header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(StripeError::InvalidSignature("no v1 signature"));
    }

    let mac = signed_mac(payload, secret, timestamp)?;
    if !signatures.iter().any(|sig| mac.clone().verify_slice(sig).is_ok()) {
        return Err(StripeError::InvalidSignature("no matching signature"));
    }

    if now - timestamp > tolerance_secs {
        return Err(StripeError::InvalidSignature("timestamp outside tolerance"));
    }

    Ok(())
}

/// Build a valid `Stripe-Signature` header for `payload`, as Stripe would.
pub fn signature_header(
    payload: &[u8],
    secret: &str,
    timestamp: i64,
) -> Result<String, StripeError> {
    let sig = signed_mac(payload, secret, timestamp)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(sig)))
}

fn signed_mac(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256, StripeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| StripeError::InvalidSignature("unusable secret"))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{
        "id":"pi_1","amount":500,"currency":"usd","client_secret":null,
        "metadata":{"ad_id":"a","price_id":"p"}}}}"#;

    #[test]
    fn accepts_valid_signature() {
        let header = signature_header(PAYLOAD, SECRET, 1_700_000_000).unwrap();
        verify_signature(PAYLOAD, &header, SECRET, 1_700_000_010, DEFAULT_TOLERANCE_SECS).unwrap();
    }

    #[test]
    fn rejects_tampered_payload() {
        let header = signature_header(PAYLOAD, SECRET, 1_700_000_000).unwrap();
        let tampered = String::from_utf8_lossy(PAYLOAD).replace("500", "1");
        let err = verify_signature(tampered.as_bytes(), &header, SECRET, 1_700_000_000, 300)
            .unwrap_err();
        assert!(matches!(err, StripeError::InvalidSignature("no matching signature")));
    }

    #[test]
    fn rejects_wrong_secret() {
        let header = signature_header(PAYLOAD, "whsec_other", 1_700_000_000).unwrap();
        assert!(verify_signature(PAYLOAD, &header, SECRET, 1_700_000_000, 300).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = signature_header(PAYLOAD, SECRET, 1_700_000_000).unwrap();
        let err = verify_signature(PAYLOAD, &header, SECRET, 1_700_000_301, 300).unwrap_err();
        assert!(matches!(err, StripeError::InvalidSignature("timestamp outside tolerance")));
    }

    #[test]
    fn any_matching_v1_is_enough() {
        let valid = signature_header(PAYLOAD, SECRET, 42).unwrap();
        let v1 = valid.split_once("v1=").unwrap().1;
        let header = format!("t=42,v1={},v1={},v0=abc", "00".repeat(32), v1);
        verify_signature(PAYLOAD, &header, SECRET, 42, 300).unwrap();
    }

    #[test]
    fn rejects_malformed_headers() {
        for header in ["", "v1=abcd", "t=42", "t=abc,v1=00"] {
            assert!(verify_signature(PAYLOAD, header, SECRET, 42, 300).is_err(), "{header}");
        }
    }

    #[test]
    fn event_exposes_payment_intent() {
        let event: Event = serde_json::from_slice(PAYLOAD).unwrap();
        assert_eq!(event.event_type, PAYMENT_INTENT_SUCCEEDED);
        let intent = event.payment_intent().unwrap();
        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.metadata.get("ad_id").map(String::as_str), Some("a"));
    }
}
