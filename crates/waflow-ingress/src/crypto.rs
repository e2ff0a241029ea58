// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook body authentication and AES-256-GCM envelopes.
//!
//! The signature header is `X-Waflow-Signature: sha256=<hex>`, an HMAC-SHA256
//! of the raw request body. Encrypted bodies arrive as
//! `{"nonce": base64, "ciphertext": base64}` where the ciphertext carries the
//! 16-byte GCM tag.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use waflow_core::{Verification, WaflowError};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-waflow-signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Checks `header` against the HMAC of `body`. Comparison is constant time.
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> Verification {
    let Some(hex_sig) = header.and_then(|h| h.trim().strip_prefix(SIGNATURE_PREFIX)) else {
        return Verification::Failed;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return Verification::Failed;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return Verification::Failed;
    };
    mac.update(body);
    match mac.verify_slice(&expected) {
        Ok(()) => Verification::Verified,
        Err(_) => Verification::Failed,
    }
}

/// Header value signing `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, WaflowError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| WaflowError::Config("invalid signing secret".into()))?;
    mac.update(body);
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Parses the 64-hex-character encryption key.
pub fn parse_key(hex_key: &str) -> Result<[u8; 32], WaflowError> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|e| WaflowError::Config(format!("ingress.encryption_key is not hex: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        WaflowError::Config(format!(
            "ingress.encryption_key must be 32 bytes, got {}",
            b.len()
        ))
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    nonce: String,
    ciphertext: String,
}

/// Opens an encrypted envelope and returns the plaintext payload.
///
/// A body that is not an envelope is [`WaflowError::MalformedPayload`]; an
/// envelope that fails GCM authentication is [`WaflowError::Authentication`].
pub fn open_envelope(key: &[u8; 32], body: &[u8]) -> Result<Vec<u8>, WaflowError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| WaflowError::MalformedPayload(format!("expected encrypted envelope: {e}")))?;
    let nonce_bytes: [u8; 12] = STANDARD
        .decode(envelope.nonce.as_bytes())
        .ok()
        .and_then(|n| n.try_into().ok())
        .ok_or_else(|| WaflowError::MalformedPayload("envelope nonce must be 12 bytes".into()))?;
    let mut in_out = STANDARD
        .decode(envelope.ciphertext.as_bytes())
        .map_err(|e| WaflowError::MalformedPayload(format!("envelope ciphertext: {e}")))?;

    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| WaflowError::Config("failed to create AES-256-GCM key".into()))?;
    let plaintext = LessSafeKey::new(unbound)
        .open_in_place(Nonce::assume_unique_for_key(nonce_bytes), Aad::empty(), &mut in_out)
        .map_err(|_| WaflowError::Authentication("envelope failed to decrypt".into()))?;
    Ok(plaintext.to_vec())
}

/// Seals `plaintext` into an envelope under a fresh random nonce.
pub fn seal_envelope(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, WaflowError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| WaflowError::Config("failed to create AES-256-GCM key".into()))?;
    let mut nonce_bytes = [0u8; 12];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| WaflowError::Internal("failed to generate random nonce".into()))?;

    let mut in_out = plaintext.to_vec();
    LessSafeKey::new(unbound)
        .seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| WaflowError::Internal("AES-256-GCM encryption failed".into()))?;

    serde_json::to_vec(&Envelope {
        nonce: STANDARD.encode(nonce_bytes),
        ciphertext: STANDARD.encode(in_out),
    })
    .map_err(|e| WaflowError::Internal(format!("failed to encode envelope: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test";

    #[test]
    fn signature_verifies() {
        let body = br#"{"messages":[]}"#;
        let header = sign(SECRET, body).unwrap();
        assert!(header.starts_with("sha256="));
        assert_eq!(verify_signature(SECRET, body, Some(&header)), Verification::Verified);
    }

    #[test]
    fn tampered_or_missing_signature_fails() {
        let body = br#"{"messages":[]}"#;
        let header = sign(SECRET, body).unwrap();
        assert_eq!(
            verify_signature(SECRET, br#"{"messages":[1]}"#, Some(&header)),
            Verification::Failed
        );
        assert_eq!(verify_signature(b"other", body, Some(&header)), Verification::Failed);
        assert_eq!(verify_signature(SECRET, body, None), Verification::Failed);
        assert_eq!(
            verify_signature(SECRET, body, Some(header.trim_start_matches("sha256="))),
            Verification::Failed
        );
        assert_eq!(verify_signature(SECRET, body, Some("sha256=zz")), Verification::Failed);
    }

    #[test]
    fn envelope_opens_with_right_key_only() {
        let key = [7u8; 32];
        let sealed = seal_envelope(&key, b"{\"messages\":[]}").unwrap();
        assert_eq!(open_envelope(&key, &sealed).unwrap(), b"{\"messages\":[]}");

        let err = open_envelope(&[8u8; 32], &sealed).unwrap_err();
        assert!(matches!(err, WaflowError::Authentication(_)));
    }

    #[test]
    fn plain_json_is_not_an_envelope() {
        let err = open_envelope(&[7u8; 32], br#"{"messages":[]}"#).unwrap_err();
        assert!(matches!(err, WaflowError::MalformedPayload(_)));
    }

    #[test]
    fn key_parsing() {
        assert_eq!(parse_key(&"ab".repeat(32)).unwrap(), [0xab; 32]);
        assert!(parse_key("abcd").is_err());
        assert!(parse_key(&"zz".repeat(32)).is_err());
    }
}
