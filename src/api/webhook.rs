//! Vendor webhook ingestion with HMAC-SHA256 signature verification
//!
//! Each vendor webhook carries an `X-RTCC-Signature` header: the hex
//! HMAC-SHA256 of the raw request body under the vendor's shared secret.
//! A missing or mismatched signature rejects with 401 and an audit entry.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC of the raw body.
pub const SIGNATURE_HEADER: &str = "x-rtcc-signature";

/// Compute the hex HMAC-SHA256 for a body under a shared secret.
///
/// HMAC accepts any key length, so construction cannot fail; the empty
/// string fallback is unreachable in practice.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a presented signature against the body. Constant-time compare
/// via the mac's own verification.
pub fn verify(secret: &str, body: &[u8], presented_hex: &str) -> bool {
    let Ok(presented) = hex::decode(presented_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&presented).is_ok()
}
