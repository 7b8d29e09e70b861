//! Error types for the Clawmegle client core.

use serde::Serialize;

/// Top-level error type for the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Credential acquisition and storage errors.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Scanned payload does not contain a valid Clawmegle key")]
    InvalidCredential,

    #[error("Credential storage failed: {0}")]
    Storage(String),
}

/// Transport and wire-format errors talking to the remote service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },
}

/// Session lifecycle errors surfaced on explicit user actions.
///
/// Background polling never produces these; poll failures are swallowed and
/// the next tick retries.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No API key set. Scan a Clawmegle QR code first.")]
    NotAuthenticated,

    #[error("{0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Api(#[from] ApiError),
}

/// Collective search errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("{0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Api(#[from] ApiError),
}

/// Payment flow errors.
///
/// A renewed 402 after submitting a signed authorization leaves the pending
/// challenge in place so the user can retry; nothing here commits partial
/// state.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Please connect your wallet to pay for queries")]
    WalletRequired,

    #[error("No payment is currently required")]
    NoPendingChallenge,

    #[error("No payment options available")]
    NoPaymentOptions,

    #[error("Signature verification failed. Please try again.")]
    VerificationFailed,

    #[error("{0}")]
    Rejected(String),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Authorization encoding failed: {0}")]
    Encoding(#[from] Eip712Error),

    #[error("Network error: {0}")]
    Api(#[from] ApiError),
}

/// Wallet capability errors.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Wallet not connected")]
    NotConnected,

    #[error("Signature was rejected: {0}")]
    Rejected(String),

    #[error("Signature not received")]
    EmptySignature,

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// EIP-712 typed-data encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum Eip712Error {
    #[error("Invalid address '{0}': expected 0x-prefixed 20-byte hex")]
    InvalidAddress(String),

    #[error("Invalid uint256 value '{0}': expected a decimal integer string")]
    InvalidAmount(String),

    #[error("Invalid nonce '{0}': expected 0x-prefixed 32-byte hex")]
    InvalidNonce(String),
}

/// Severity routing for surfaced errors, used by presentation layers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSurface {
    /// Shown to the user as an alert; the triggering action was explicit.
    Alert,
    /// Logged only; background operations retry on the next tick.
    Silent,
}

impl Error {
    /// How a presentation layer should surface this error.
    ///
    /// Explicit user actions (join, search, pay, save) alert; everything a
    /// background poll can produce stays silent.
    pub fn surface(&self) -> ErrorSurface {
        match self {
            Self::Api(_) => ErrorSurface::Silent,
            _ => ErrorSurface::Alert,
        }
    }
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, Error>;
