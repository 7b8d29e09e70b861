//! Payment wire structures for the paid-query flow.
//!
//! The shapes here are defined by external standards — EIP-3009
//! `transferWithAuthorization` carried over an x402-style header exchange —
//! and are reproduced exactly, not redesigned. The server issues a challenge
//! in a base64 `payment-required` header on a 402 response; the client
//! answers with a base64 `PAYMENT-SIGNATURE` header containing the signed
//! authorization.

pub mod eip712;

use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Protocol version tag carried in every payment payload.
pub const X402_VERSION: u8 = 2;

/// Authorizations become valid this many seconds in the past, tolerating
/// clock skew between client and verifier.
pub const VALID_AFTER_SKEW_SECS: i64 = 60;

/// Authorizations expire this many seconds after issuance.
pub const VALID_FOR_SECS: i64 = 900;

/// One payment option offered in a challenge. Asset metadata beyond the
/// amount is passed back to the server untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Challenge issued by the server on a 402 response. Consumed exactly once
/// by a successful paid retry, then discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentChallenge {
    #[serde(default)]
    pub accepts: Vec<PaymentOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Set instead of the fields above when the challenge header could not
    /// be decoded; kept so the failure is inspectable.
    #[serde(skip)]
    pub raw: Option<String>,
}

/// EIP-3009 transfer authorization, exactly as signed and submitted.
/// `value`, `validAfter`, and `validBefore` are decimal integer strings;
/// `nonce` is 32 random bytes, 0x-prefixed hex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferAuthorization {
    pub from: String,
    pub to: String,
    pub value: String,
    pub valid_after: String,
    pub valid_before: String,
    pub nonce: String,
}

impl TransferAuthorization {
    /// Build an authorization with the fixed validity window anchored at
    /// `now` (unix seconds) and a fresh random nonce.
    pub fn time_boxed(from: &str, to: &str, value: &str, now: i64) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            value: value.to_string(),
            valid_after: (now - VALID_AFTER_SKEW_SECS).to_string(),
            valid_before: (now + VALID_FOR_SECS).to_string(),
            nonce: generate_nonce(),
        }
    }
}

/// Authorization plus its signature, nested per the x402 payload layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationEnvelope {
    pub authorization: TransferAuthorization,
    pub signature: String,
}

/// The full payment proof submitted in the `PAYMENT-SIGNATURE` header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentPayload {
    #[serde(rename = "x402Version")]
    pub x402_version: u8,
    pub payload: AuthorizationEnvelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub accepted: PaymentOption,
}

/// Generate a fresh 32-byte random nonce, 0x-prefixed hex.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(2 + 64);
    out.push_str("0x");
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Decode a `payment-required` header into a challenge.
///
/// A header that fails base64 or JSON decoding still produces a challenge,
/// with only `raw` populated, so the caller can surface "payment required"
/// either way.
pub fn decode_challenge_header(header: &str) -> PaymentChallenge {
    let parsed = BASE64
        .decode(header)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<PaymentChallenge>(&bytes).ok());
    match parsed {
        Some(challenge) => challenge,
        None => PaymentChallenge {
            raw: Some(header.to_string()),
            ..PaymentChallenge::default()
        },
    }
}

/// Encode a payment payload for transport as a header value.
pub fn encode_payment_header(payload: &PaymentPayload) -> Result<String, serde_json::Error> {
    Ok(BASE64.encode(serde_json::to_vec(payload)?))
}

/// Decode a `PAYMENT-SIGNATURE` header back into a payload. Servers (and
/// tests) use this to inspect what a client submitted.
pub fn decode_payment_header(header: &str) -> Option<PaymentPayload> {
    let bytes = BASE64.decode(header).ok()?;
    serde_json::from_slice(&bytes).ok()
}
