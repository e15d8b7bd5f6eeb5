// crates/graph-gateway-core/src/signing.rs
// ============================================================================
// Module: Request Signing
// Description: HMAC-SHA-256 signing and verification for gateway payloads.
// Purpose: Authenticate upstream calls and inbound transport messages.
// Dependencies: hmac, sha2, subtle, serde_jcs
// ============================================================================

//! ## Overview
//! Signatures are lowercase hex HMAC-SHA-256 digests over
//! `timestamp + "." + payload`, or over the payload alone when no timestamp
//! participates. JSON bodies are serialized once with RFC 8785 (JCS) and the
//! exact signed bytes are the bytes placed on the wire; inbound verification
//! always runs over the raw received bytes, never a re-encoded body.
//!
//! Security posture: the secret never appears in `Debug` output, and
//! verification compares digests in constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use hmac::Hmac;
use hmac::Mac;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// HMAC-SHA-256 instance.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Secret
// ============================================================================

/// Shared signing secret. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(String);

impl SigningSecret {
    /// Wraps a secret, returning `None` for blank values.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() { None } else { Some(Self(value)) }
    }

    /// Returns the raw key bytes.
    fn key(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("SigningSecret(<redacted>)")
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while producing signatures.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The MAC rejected the key material.
    #[error("invalid signing key")]
    InvalidKey,
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Signed Body
// ============================================================================

/// Canonical body bytes together with their signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBody {
    /// Bytes to transmit verbatim.
    pub bytes: Vec<u8>,
    /// Hex signature over `timestamp.bytes`.
    pub signature: String,
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Builds the byte string covered by a signature.
#[must_use]
pub fn signing_payload(timestamp: Option<&str>, body: &[u8]) -> Vec<u8> {
    match timestamp {
        Some(timestamp) => {
            let mut payload = Vec::with_capacity(timestamp.len() + 1 + body.len());
            payload.extend_from_slice(timestamp.as_bytes());
            payload.push(b'.');
            payload.extend_from_slice(body);
            payload
        }
        None => body.to_vec(),
    }
}

/// Signs raw bytes, optionally bound to a timestamp.
///
/// # Errors
///
/// Returns [`SigningError::InvalidKey`] when the MAC cannot be keyed.
pub fn sign_payload(
    secret: &SigningSecret,
    timestamp: Option<&str>,
    body: &[u8],
) -> Result<String, SigningError> {
    let mut mac = HmacSha256::new_from_slice(secret.key()).map_err(|_| SigningError::InvalidKey)?;
    mac.update(&signing_payload(timestamp, body));
    Ok(hex_encode(&mac.finalize().into_bytes()))
}

/// Serializes a JSON body canonically and signs `timestamp.body`.
///
/// # Errors
///
/// Returns [`SigningError`] when canonicalization or keying fails.
pub fn sign_json<T: Serialize + ?Sized>(
    secret: &SigningSecret,
    timestamp: &str,
    body: &T,
) -> Result<SignedBody, SigningError> {
    let bytes = canonical_json_bytes(body)?;
    let signature = sign_payload(secret, Some(timestamp), &bytes)?;
    Ok(SignedBody {
        bytes,
        signature,
    })
}

/// Signs a read-style request over `timestamp.path`.
///
/// # Errors
///
/// Returns [`SigningError::InvalidKey`] when the MAC cannot be keyed.
pub fn sign_path(
    secret: &SigningSecret,
    timestamp: &str,
    path: &str,
) -> Result<String, SigningError> {
    sign_payload(secret, Some(timestamp), path.as_bytes())
}

/// Verifies a provided hex signature against the expected digest.
///
/// Returns `false` for any mismatch, including a length mismatch.
#[must_use]
pub fn verify_payload(
    secret: &SigningSecret,
    provided: &str,
    timestamp: Option<&str>,
    body: &[u8],
) -> bool {
    let Ok(expected) = sign_payload(secret, timestamp, body) else {
        return false;
    };
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    if expected.len() != provided.len() {
        return false;
    }
    expected.ct_eq(provided).into()
}

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`SigningError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SigningError> {
    serde_jcs::to_vec(value).map_err(|err| SigningError::Canonicalization(err.to_string()))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
