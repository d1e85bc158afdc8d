//! Inbound webhook signature verification (§6 "Ingress (inbound)").
//!
//! The provider-hosted-inbox ingress path only ships a message id and
//! requires a follow-up fetch; its webhook call is authenticated with a
//! Svix-style signature: `HMAC-SHA256("{id}.{timestamp}.{raw_body}")`
//! under a `whsec_<base64>` secret, compared in constant time, tolerant of
//! a space-separated `v1,<sig>` list (multiple active secrets during
//! rotation). Grounded in `verify_svix_signature`
//! (`original_source/app/routers/resend_webhook.py`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a `svix-signature`-style header against `id.timestamp.body`.
/// `secret` is the raw `whsec_<base64>` string as configured; `header`
/// may contain several space-separated `v1,<sig>` entries.
pub fn verify_svix_signature(id: &str, timestamp: &str, raw_body: &[u8], header: &str, secret: &str) -> bool {
    let Some(key_bytes) = decode_whsec(secret) else {
        return false;
    };

    let signed_content = format!("{id}.{timestamp}.{}", String::from_utf8_lossy(raw_body));
    let Ok(mut mac) = HmacSha256::new_from_slice(&key_bytes) else {
        return false;
    };
    mac.update(signed_content.as_bytes());
    let expected = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, mac.finalize().into_bytes());

    header
        .split(' ')
        .filter_map(|entry| entry.split_once(','))
        .any(|(version, sig)| version == "v1" && constant_time_eq(sig.as_bytes(), expected.as_bytes()))
}

/// Simple HMAC-SHA256 verification for the inline-body ingress path, which
/// carries a single hex-encoded signature rather than the Svix envelope
/// (grounded in `verify_webhook_signature`,
/// `original_source/app/routers/webhook.py`).
pub fn verify_hex_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(signature.as_bytes(), expected.as_bytes())
}

fn decode_whsec(secret: &str) -> Option<Vec<u8>> {
    let encoded = secret.strip_prefix("whsec_").unwrap_or(secret);
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn whsec(raw_key: &[u8]) -> String {
        format!("whsec_{}", base64::engine::general_purpose::STANDARD.encode(raw_key))
    }

    #[test]
    fn svix_signature_round_trips() {
        let secret = whsec(b"0123456789abcdef");
        let id = "msg_1";
        let ts = "1700000000";
        let body = b"{\"hello\":\"world\"}";

        let key_bytes = decode_whsec(&secret).unwrap();
        let mut mac = HmacSha256::new_from_slice(&key_bytes).unwrap();
        mac.update(format!("{id}.{ts}.{}", String::from_utf8_lossy(body)).as_bytes());
        let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        let header = format!("v1,{sig}");
        assert!(verify_svix_signature(id, ts, body, &header, &secret));
    }

    #[test]
    fn svix_signature_rejects_tampered_body() {
        let secret = whsec(b"0123456789abcdef");
        let id = "msg_1";
        let ts = "1700000000";

        let key_bytes = decode_whsec(&secret).unwrap();
        let mut mac = HmacSha256::new_from_slice(&key_bytes).unwrap();
        mac.update(format!("{id}.{ts}.original").as_bytes());
        let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        let header = format!("v1,{sig}");

        assert!(!verify_svix_signature(id, ts, b"tampered", &header, &secret));
    }

    #[test]
    fn svix_signature_accepts_second_entry_in_rotation_list() {
        let secret = whsec(b"0123456789abcdef");
        let id = "msg_1";
        let ts = "1700000000";
        let body = b"payload";

        let key_bytes = decode_whsec(&secret).unwrap();
        let mut mac = HmacSha256::new_from_slice(&key_bytes).unwrap();
        mac.update(format!("{id}.{ts}.{}", String::from_utf8_lossy(body)).as_bytes());
        let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        let header = format!("v1,stalesignature== v1,{sig}");
        assert!(verify_svix_signature(id, ts, body, &header, &secret));
    }

    #[test]
    fn hex_signature_round_trips() {
        let secret = "supersecret";
        let payload = b"raw-request-body";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_hex_signature(payload, &sig, secret));
        assert!(!verify_hex_signature(payload, "deadbeef", secret));
    }
}
