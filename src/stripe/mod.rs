//! Stripe webhook events and their `stripe-signature` verification.
use std::collections::HashMap;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::models::config::StripeConfig;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature of a webhook request.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("No signatures found matching the expected signature for payload")]
    Mismatch,
    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,
    #[error("No v1 signatures found in header")]
    NoSignatures,
    #[error("Timestamp outside the tolerance zone ({age}s old)")]
    Expired { age: i64 },
    #[error("Webhook secret cannot be used as an HMAC key")]
    InvalidSecret,
    #[error("Invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Verifies a raw webhook body against its signature header.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], signature_header: &str) -> Result<Event, SignatureError>;
}

/// Verifier for the `t=<ts>,v1=<hex>` scheme.
#[derive(Clone, Debug)]
pub struct StripeVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl StripeVerifier {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            secret: config.webhook_secret.clone(),
            tolerance_secs: config.tolerance_secs,
        }
    }

    /// Hex signature of `<timestamp>.<payload>`.
    pub fn sign(&self, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
        let mac = self.mac(timestamp, payload)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<Event, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for item in signature_header.split(',') {
            let Some((key, value)) = item.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(SignatureError::NoSignatures);
        }

        let mac = self.mac(timestamp, payload)?;
        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(SignatureError::Mismatch);
        }

        let age = now - timestamp;
        let tolerance = i64::try_from(self.tolerance_secs).unwrap_or(i64::MAX);
        if tolerance > 0 && age > tolerance {
            return Err(SignatureError::Expired { age });
        }

        Ok(serde_json::from_slice(payload)?)
    }
}

impl SignatureVerifier for StripeVerifier {
    fn verify(&self, payload: &[u8], signature_header: &str) -> Result<Event, SignatureError> {
        self.verify_at(payload, signature_header, Utc::now().timestamp())
    }
}

/// Envelope of a webhook event.
#[derive(Clone, Debug, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub receipt_email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

impl PaymentIntent {
    /// Receipt email, then `metadata.customer_email`.
    pub fn customer_email(&self) -> Option<&str> {
        self.receipt_email
            .as_deref()
            .or_else(|| self.metadata.get("customer_email").map(String::as_str))
            .filter(|email| !email.trim().is_empty())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

impl CheckoutSession {
    pub fn customer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|details| details.email.as_deref())
            .or(self.customer_email.as_deref())
            .filter(|email| !email.trim().is_empty())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

/// Event types this service reacts to.
#[derive(Clone, Debug)]
pub enum EventKind {
    PaymentSucceeded(PaymentIntent),
    PaymentFailed(PaymentIntent),
    CheckoutCompleted(CheckoutSession),
    Unhandled,
}

impl Event {
    /// Classify by `type`, decoding `data.object` for known types.
    pub fn classify(&self) -> Result<EventKind, serde_json::Error> {
        let object = self.data.object.clone();
        Ok(match self.event_type.as_str() {
            "payment_intent.succeeded" => EventKind::PaymentSucceeded(serde_json::from_value(object)?),
            "payment_intent.payment_failed" => {
                EventKind::PaymentFailed(serde_json::from_value(object)?)
            }
            "checkout.session.completed" => {
                EventKind::CheckoutCompleted(serde_json::from_value(object)?)
            }
            _ => EventKind::Unhandled,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn verifier() -> StripeVerifier {
        StripeVerifier {
            secret: "whsec_test".into(),
            tolerance_secs: 300,
        }
    }

    /// Signature header for `payload`, signed now with the test secret.
    pub fn signed_header(payload: &str) -> String {
        let timestamp = Utc::now().timestamp();
        let signature = verifier().sign(timestamp, payload.as_bytes()).unwrap();
        format!("t={timestamp},v1={signature}")
    }

    pub fn payment_intent_event(event_type: &str) -> String {
        serde_json::json!({
            "id": "evt_1",
            "type": event_type,
            "data": {
                "object": {
                    "id": "pi_123",
                    "amount": 4900,
                    "currency": "eur",
                    "receipt_email": "client@shop.fr",
                    "metadata": {}
                }
            }
        })
        .to_string()
    }
}
