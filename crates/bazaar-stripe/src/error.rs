use thiserror::Error;

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("request to Stripe failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid Stripe base URL: {0}")]
    BaseUrl(String),

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(&'static str),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}
