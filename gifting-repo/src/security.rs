//! Security utilities for API key hashing and gateway webhook signatures.
//!
//! Gateway callbacks carry a header of the form `t=<unix>,v1=<hex>[,v1=<hex>]`
//! where each `v1` is an HMAC-SHA256 over `"{t}.{raw body}"`.

use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the gateway signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Default accepted clock skew between the gateway and us.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Generates a fresh random API key (`sk_` + 32 alphanumerics).
pub fn generate_api_key() -> String {
    let raw: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("sk_{}", raw)
}

/// Computes the hex HMAC-SHA256 of `"{timestamp}.{body}"`.
pub fn sign_payload(timestamp: i64, body: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a complete signature header value for `body` signed at `timestamp`.
pub fn signature_header(timestamp: i64, body: &[u8], secret: &str) -> String {
    format!("t={},v1={}", timestamp, sign_payload(timestamp, body, secret))
}

/// Why a signature was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("signature header malformed")]
    Malformed,

    #[error("signature timestamp outside tolerance ({age_secs}s)")]
    Stale { age_secs: i64 },

    #[error("no signature matched")]
    Mismatch,
}

/// Parsed `t=…,v1=…` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| SignatureError::Malformed)?);
                }
                "v1" => signatures.push(value.to_string()),
                _ => {}
            }
        }

        match timestamp {
            Some(timestamp) if !signatures.is_empty() => Ok(Self {
                timestamp,
                signatures,
            }),
            _ => Err(SignatureError::Malformed),
        }
    }
}

/// Verifies a gateway signature header against the raw body.
///
/// Any of the `v1` values may match. Comparison is constant-time.
pub fn verify_signature(
    header: Option<&str>,
    body: &[u8],
    secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let parsed = SignatureHeader::parse(header)?;

    // `t=` is caller-controlled and may sit at either end of the i64 range.
    let age_secs = now_unix.saturating_sub(parsed.timestamp);
    if now_unix.abs_diff(parsed.timestamp) > tolerance_secs.unsigned_abs() {
        return Err(SignatureError::Stale { age_secs });
    }

    let expected = sign_payload(parsed.timestamp, body, secret);
    let matched = parsed
        .signatures
        .iter()
        .any(|candidate| bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
