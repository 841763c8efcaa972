//! Webhook signature verification.
//!
//! The `Stripe-Signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! The signed payload is `"{t}.{raw body}"`, HMAC-SHA256 keyed with the
//! endpoint secret. Any `v1` entry may match (secret rotation sends two).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::StripeError;
use super::types::Event;

/// Maximum age of a signed delivery, in seconds.
pub const TOLERANCE_SECS: i64 = 300;

/// Verify a delivery against the endpoint secret at time `now` (unix seconds).
///
/// # Errors
///
/// Returns `StripeError::InvalidSignature` if the header is malformed, the
/// timestamp is outside the tolerance, or no `v1` signature matches.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| StripeError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(StripeError::InvalidSignature(
            "no v1 signature".to_string(),
        ));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| StripeError::InvalidSignature("invalid timestamp".to_string()))?;
    if (now - ts).abs() > TOLERANCE_SECS {
        return Err(StripeError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let expected = sign(payload, timestamp, secret)?;

    if signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        Ok(())
    } else {
        Err(StripeError::InvalidSignature(
            "signature mismatch".to_string(),
        ))
    }
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
///
/// # Errors
///
/// Returns `StripeError::InvalidSignature` if the key is rejected.
pub fn sign(payload: &[u8], timestamp: &str, secret: &str) -> Result<String, StripeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| StripeError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Decode a verified payload into an event envelope.
///
/// # Errors
///
/// Returns `StripeError::Parse` if the body is not a Stripe event.
pub fn parse_event(payload: &[u8]) -> Result<Event, StripeError> {
    serde_json::from_slice(payload).map_err(|e| StripeError::Parse(e.to_string()))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
