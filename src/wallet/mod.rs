//! Wallet capability seam.
//!
//! Production wallets live behind connect/sign SDKs the core never
//! reimplements; everything here is the narrow interface the payment flow
//! calls through. [`LocalWallet`] is a key-in-process signer for tests and
//! development runs — it is not custody software.

use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

use crate::error::WalletError;
use crate::payment::eip712::{TypedData, decode_hex, keccak, to_hex};

/// External wallet collaborator: address discovery, connect/disconnect, and
/// typed-data signing.
#[async_trait]
pub trait WalletCapability: Send + Sync {
    /// Address of the connected account, if any.
    fn address(&self) -> Option<String>;

    /// Establish a connection and return the account address.
    async fn connect(&self) -> Result<String, WalletError>;

    async fn disconnect(&self) -> Result<(), WalletError>;

    /// Sign an EIP-712 document, returning the 65-byte `r‖s‖v` signature as
    /// 0x-prefixed hex.
    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<String, WalletError>;
}

/// Placeholder wallet for sessions with nothing connected: no address, and
/// every signing attempt fails with [`WalletError::NotConnected`].
#[derive(Debug, Default)]
pub struct DisconnectedWallet;

#[async_trait]
impl WalletCapability for DisconnectedWallet {
    fn address(&self) -> Option<String> {
        None
    }

    async fn connect(&self) -> Result<String, WalletError> {
        Err(WalletError::NotConnected)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        Ok(())
    }

    async fn sign_typed_data(&self, _typed_data: &TypedData) -> Result<String, WalletError> {
        Err(WalletError::NotConnected)
    }
}

/// In-process secp256k1 signer for tests and `--dev-wallet` runs.
pub struct LocalWallet {
    signing_key: SigningKey,
    address: String,
}

impl LocalWallet {
    /// Build from a 0x-prefixed 32-byte private key.
    pub fn from_private_key_hex(private_key: &str) -> Result<Self, WalletError> {
        let bytes = decode_hex::<32>(private_key)
            .ok_or_else(|| WalletError::Signing("private key must be 32-byte hex".into()))?;
        let signing_key = SigningKey::from_bytes(&bytes.into())
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        let address = derive_address(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Generate a throwaway key.
    pub fn random() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let address = derive_address(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }
}

#[async_trait]
impl WalletCapability for LocalWallet {
    fn address(&self) -> Option<String> {
        Some(self.address.clone())
    }

    async fn connect(&self) -> Result<String, WalletError> {
        Ok(self.address.clone())
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        Ok(())
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<String, WalletError> {
        let digest = typed_data
            .signing_digest()
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| WalletError::Signing(e.to_string()))?;

        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = 27 + recovery_id.to_byte();
        Ok(to_hex(&bytes))
    }
}

/// Ethereum address of a public key: last 20 bytes of
/// `keccak256(uncompressed_pubkey[1..])`.
fn derive_address(verifying_key: &VerifyingKey) -> String {
    let point = verifying_key.to_encoded_point(false);
    let hash = keccak(&point.as_bytes()[1..]);
    to_hex(&hash[12..])
}

/// Recover the signer address from a 65-byte `r‖s‖v` signature over a
/// prehashed digest. Used by verifiers (and tests) to check submissions.
pub fn recover_address(digest: &[u8; 32], signature: &str) -> Option<String> {
    let bytes = decode_hex::<65>(signature)?;
    let recovery_id = RecoveryId::from_byte(bytes[64].checked_sub(27)?)?;
    let signature = Signature::from_slice(&bytes[..64]).ok()?;
    let verifying_key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id).ok()?;
    Some(derive_address(&verifying_key))
}
