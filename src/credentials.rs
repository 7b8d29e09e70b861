//! Credential persistence for the Clawmegle client.
//!
//! Holds the opaque bearer API key obtained from a scanned QR code, plus a
//! cached copy of the connected wallet's address. Both live in
//! `~/.clawmegle/credentials.json`; at most one API key is live at a time.

use std::path::PathBuf;
use std::sync::RwLock;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::clawmegle_dir;
use crate::error::CredentialError;

/// Every valid Clawmegle API key starts with this prefix.
pub const TOKEN_PREFIX: &str = "clawmegle_";

/// On-disk credential record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wallet_address: Option<String>,
}

/// Persistent store for the API key and cached wallet address.
///
/// Reads happen once at startup; writes are user-initiated (scan, connect,
/// logout) and serialized by the UI, so a plain `RwLock` suffices.
pub struct CredentialStore {
    path: PathBuf,
    api_key: RwLock<Option<SecretString>>,
    wallet_address: RwLock<Option<String>>,
}

impl CredentialStore {
    /// Open the store at the default location and load any persisted state.
    ///
    /// A missing or unreadable file degrades to "not authenticated"; startup
    /// never fails on storage problems.
    pub fn open() -> Self {
        Self::open_at(clawmegle_dir().join("credentials.json"))
    }

    /// Open the store backed by a specific file.
    pub fn open_at(path: PathBuf) -> Self {
        let persisted = std::fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str::<CredentialFile>(&data).ok())
            .unwrap_or_default();

        if persisted.api_key.is_some() {
            tracing::info!("Loaded API key from {}", path.display());
        }

        Self {
            path,
            api_key: RwLock::new(persisted.api_key.map(SecretString::from)),
            wallet_address: RwLock::new(persisted.wallet_address),
        }
    }

    /// The current API key, if one has been saved.
    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key.read().ok().and_then(|guard| guard.clone())
    }

    /// Whether a credential is present (decides the initial screen).
    pub fn is_authenticated(&self) -> bool {
        self.api_key().is_some()
    }

    /// Validate and persist a new API key.
    pub fn save(&self, token: &str) -> Result<(), CredentialError> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(CredentialError::InvalidCredential);
        }
        if let Ok(mut guard) = self.api_key.write() {
            *guard = Some(SecretString::from(token.to_string()));
        }
        self.persist()
    }

    /// Remove the persisted API key (logout). The cached wallet address is
    /// kept; wallet connection outlives chat identity.
    pub fn clear(&self) -> Result<(), CredentialError> {
        if let Ok(mut guard) = self.api_key.write() {
            *guard = None;
        }
        self.persist()
    }

    /// Cached wallet address, if one was connected before.
    pub fn wallet_address(&self) -> Option<String> {
        self.wallet_address
            .read()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Persist the connected wallet's address.
    pub fn save_wallet_address(&self, address: &str) -> Result<(), CredentialError> {
        if let Ok(mut guard) = self.wallet_address.write() {
            *guard = Some(address.to_string());
        }
        self.persist()
    }

    /// Forget the cached wallet address (wallet disconnect).
    pub fn clear_wallet_address(&self) -> Result<(), CredentialError> {
        if let Ok(mut guard) = self.wallet_address.write() {
            *guard = None;
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), CredentialError> {
        let record = CredentialFile {
            api_key: self
                .api_key
                .read()
                .ok()
                .and_then(|g| g.as_ref().map(|s| s.expose_secret().to_string())),
            wallet_address: self.wallet_address.read().ok().and_then(|g| g.clone()),
        };
        let data = serde_json::to_string_pretty(&record)
            .map_err(|e| CredentialError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CredentialError::Storage(e.to_string()))?;
        }
        std::fs::write(&self.path, data).map_err(|e| CredentialError::Storage(e.to_string()))
    }
}

/// Extract an API key from a scanned QR payload.
///
/// The payload is either the bare key or a URL-encoded form containing
/// `key=<token>`; the candidate is the substring after `key=` up to the next
/// `&` (or end of string), otherwise the whole payload. Anything not starting
/// with `clawmegle_` is rejected.
pub fn extract_from_scan(payload: &str) -> Result<String, CredentialError> {
    let candidate = match payload.split_once("key=") {
        Some((_, rest)) => rest.split('&').next().unwrap_or_default(),
        None => payload,
    };
    if candidate.starts_with(TOKEN_PREFIX) {
        Ok(candidate.to_string())
    } else {
        Err(CredentialError::InvalidCredential)
    }
}
