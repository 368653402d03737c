//! Minimal Stripe integration: price lookup, payment intents, and webhook
//! event verification.

pub mod client;
pub mod error;
pub mod webhook;

pub use client::{PaymentIntent, Price, StripeClient};
pub use error::StripeError;
pub use webhook::{Event, construct_event};
