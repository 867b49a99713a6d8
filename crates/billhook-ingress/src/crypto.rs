//! Webhook payload signatures.
//!
//! The signature covers the raw request bytes, never a re-serialized
//! view of the parsed event — re-serialization can reorder keys or
//! change whitespace and silently invalidate the signature.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded HMAC-SHA256 signature of a payload.
#[must_use]
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a provided signature against the raw payload bytes.
///
/// All failure modes — missing header, empty secret, malformed hex,
/// wrong digest — collapse to `false`. Never panics, never allocates
/// an error; the caller only learns "reject".
#[must_use]
pub fn verify_signature(provided: Option<&str>, secret: &str, body: &[u8]) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    if secret.is_empty() {
        return false;
    }

    let computed = compute_signature(secret, body);
    constant_time_eq(provided.as_bytes(), computed.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret_12345";

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"event":"docslog","relatedtype":"estimate"}"#;
        let sig = compute_signature(SECRET, body);
        assert!(verify_signature(Some(&sig), SECRET, body));
    }

    #[test]
    fn test_signature_is_hex_encoded() {
        let sig = compute_signature(SECRET, b"payload");
        // SHA256 = 32 bytes = 64 hex chars
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let sig = compute_signature(SECRET, body);
        assert!(!verify_signature(Some(&sig), "other-secret", body));
    }

    #[test]
    fn test_single_byte_mutation_rejected() {
        let body = b"{\"amount\":100}".to_vec();
        let sig = compute_signature(SECRET, &body);

        for i in 0..body.len() {
            let mut mutated = body.clone();
            mutated[i] ^= 0x01;
            assert!(
                !verify_signature(Some(&sig), SECRET, &mutated),
                "mutation at byte {i} was accepted"
            );
        }
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(!verify_signature(None, SECRET, b"payload"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let sig = compute_signature("", b"payload");
        assert!(!verify_signature(Some(&sig), "", b"payload"));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        assert!(!verify_signature(Some("not-hex-at-all"), SECRET, b"payload"));
        assert!(!verify_signature(Some(""), SECRET, b"payload"));
    }
}
