//! `X-Cms-Signature` header values.
//!
//! Format: `v1,t=<unix seconds>,<hex hmac-sha256(secret, "<t>.<body>")>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::DeliveryError;

pub const SIGNATURE_HEADER: &str = "X-Cms-Signature";
pub const SIGNATURE_VERSION: &str = "v1";

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str) -> Result<HmacSha256, DeliveryError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::Encode(format!("signing key: {e}")))
}

pub fn hmac_hex(secret: &str, message: &[u8]) -> Result<String, DeliveryError> {
    let mut mac = mac(secret)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn signed_message(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut message = format!("{timestamp}.").into_bytes();
    message.extend_from_slice(body);
    message
}

pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, DeliveryError> {
    let digest = hmac_hex(secret, &signed_message(timestamp, body))?;
    Ok(format!("{SIGNATURE_VERSION},t={timestamp},{digest}"))
}

/// Check a header value against `body`. Comparison is constant time.
pub fn verify(secret: &str, header: &str, body: &[u8]) -> bool {
    let mut parts = header.splitn(3, ',');
    let (Some(version), Some(t), Some(digest)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if version != SIGNATURE_VERSION {
        return false;
    }
    let Some(timestamp) = t.strip_prefix("t=").and_then(|t| t.parse::<i64>().ok()) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };

    let Ok(mut mac) = mac(secret) else {
        return false;
    };
    mac.update(&signed_message(timestamp, body));
    mac.verify_slice(&expected).is_ok()
}
