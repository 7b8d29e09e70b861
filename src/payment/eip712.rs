//! EIP-712 typed data for `TransferWithAuthorization`.
//!
//! This is not a general typed-data engine; it encodes exactly the one
//! schema the paid-query flow signs, in both forms a wallet can want:
//! the JSON document for `eth_signTypedData_v4` providers, and the raw
//! 32-byte signing digest for key-holding signers.

use sha3::{Digest, Keccak256};

use crate::config::AssetConfig;
use crate::error::Eip712Error;
use crate::payment::TransferAuthorization;

const EIP712_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

const TRANSFER_WITH_AUTHORIZATION_TYPE: &str = "TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)";

/// EIP-712 domain of the payment asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: String,
}

impl From<&AssetConfig> for Eip712Domain {
    fn from(asset: &AssetConfig) -> Self {
        Self {
            name: asset.name.clone(),
            version: asset.version.clone(),
            chain_id: asset.chain_id,
            verifying_contract: asset.address.clone(),
        }
    }
}

/// A `TransferWithAuthorization` document ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedData {
    pub domain: Eip712Domain,
    pub message: TransferAuthorization,
}

impl TypedData {
    pub fn transfer_with_authorization(
        asset: &AssetConfig,
        authorization: &TransferAuthorization,
    ) -> Self {
        Self {
            domain: Eip712Domain::from(asset),
            message: authorization.clone(),
        }
    }

    /// The full `eth_signTypedData_v4` document.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "TransferWithAuthorization": [
                    { "name": "from", "type": "address" },
                    { "name": "to", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "validAfter", "type": "uint256" },
                    { "name": "validBefore", "type": "uint256" },
                    { "name": "nonce", "type": "bytes32" },
                ],
            },
            "primaryType": "TransferWithAuthorization",
            "domain": {
                "name": self.domain.name,
                "version": self.domain.version,
                "chainId": self.domain.chain_id,
                "verifyingContract": self.domain.verifying_contract,
            },
            "message": {
                "from": self.message.from,
                "to": self.message.to,
                "value": self.message.value,
                "validAfter": self.message.valid_after,
                "validBefore": self.message.valid_before,
                "nonce": self.message.nonce,
            },
        })
    }

    /// The 32-byte digest a key-holding signer signs:
    /// `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`.
    pub fn signing_digest(&self) -> Result<[u8; 32], Eip712Error> {
        let domain_separator = self.domain_separator()?;
        let struct_hash = self.struct_hash()?;

        let mut hasher = Keccak256::new();
        hasher.update([0x19, 0x01]);
        hasher.update(domain_separator);
        hasher.update(struct_hash);
        Ok(hasher.finalize().into())
    }

    fn domain_separator(&self) -> Result<[u8; 32], Eip712Error> {
        let mut hasher = Keccak256::new();
        hasher.update(keccak(EIP712_DOMAIN_TYPE.as_bytes()));
        hasher.update(keccak(self.domain.name.as_bytes()));
        hasher.update(keccak(self.domain.version.as_bytes()));
        hasher.update(encode_uint(&self.domain.chain_id.to_string())?);
        hasher.update(encode_address(&self.domain.verifying_contract)?);
        Ok(hasher.finalize().into())
    }

    fn struct_hash(&self) -> Result<[u8; 32], Eip712Error> {
        let message = &self.message;
        let mut hasher = Keccak256::new();
        hasher.update(transfer_type_hash());
        hasher.update(encode_address(&message.from)?);
        hasher.update(encode_address(&message.to)?);
        hasher.update(encode_uint(&message.value)?);
        hasher.update(encode_uint(&message.valid_after)?);
        hasher.update(encode_uint(&message.valid_before)?);
        hasher.update(decode_nonce(&message.nonce)?);
        Ok(hasher.finalize().into())
    }
}

fn transfer_type_hash() -> [u8; 32] {
    keccak(TRANSFER_WITH_AUTHORIZATION_TYPE.as_bytes())
}

pub(crate) fn keccak(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// ABI-encode an address: 12 zero bytes then the 20 address bytes.
fn encode_address(address: &str) -> Result<[u8; 32], Eip712Error> {
    let bytes = decode_hex::<20>(address)
        .ok_or_else(|| Eip712Error::InvalidAddress(address.to_string()))?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// ABI-encode a decimal integer string as a big-endian uint256 word.
fn encode_uint(value: &str) -> Result<[u8; 32], Eip712Error> {
    let parsed: u128 = value
        .trim()
        .parse()
        .map_err(|_| Eip712Error::InvalidAmount(value.to_string()))?;
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&parsed.to_be_bytes());
    Ok(word)
}

fn decode_nonce(nonce: &str) -> Result<[u8; 32], Eip712Error> {
    decode_hex::<32>(nonce).ok_or_else(|| Eip712Error::InvalidNonce(nonce.to_string()))
}

/// Decode a 0x-prefixed hex string into exactly `N` bytes.
pub(crate) fn decode_hex<const N: usize>(value: &str) -> Option<[u8; N]> {
    let hex = value.strip_prefix("0x").unwrap_or(value);
    if hex.len() != N * 2 {
        return None;
    }
    let mut out = [0u8; N];
    for (i, chunk) in hex.as_bytes().chunks_exact(2).enumerate() {
        let high = hex_nibble(chunk[0])?;
        let low = hex_nibble(chunk[1])?;
        out[i] = (high << 4) | low;
    }
    Some(out)
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Lowercase hex with a 0x prefix.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_asset() -> AssetConfig {
        AssetConfig {
            name: "USD Coin".into(),
            version: "2".into(),
            chain_id: 8453,
            address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".into(),
        }
    }

    fn test_authorization() -> TransferAuthorization {
        TransferAuthorization {
            from: "0x1111111111111111111111111111111111111111".into(),
            to: "0x2222222222222222222222222222222222222222".into(),
            value: "50000".into(),
            valid_after: "1699999940".into(),
            valid_before: "1700000900".into(),
            nonce: format!("0x{}", "ab".repeat(32)),
        }
    }

    #[test]
    fn keccak_matches_known_empty_input_vector() {
        assert_eq!(
            to_hex(&keccak(b"")),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn type_hash_matches_eip3009_constant() {
        assert_eq!(
            to_hex(&transfer_type_hash()),
            "0x7c7c6cdb67a18743f49ec6fa9b35f50d52ed05cbed4cc592e13b44501c1a2267"
        );
    }

    #[test]
    fn digest_is_deterministic_for_identical_inputs() {
        let typed = TypedData::transfer_with_authorization(&test_asset(), &test_authorization());
        let a = typed.signing_digest().expect("digest");
        let b = typed.signing_digest().expect("digest");
        assert_eq!(a, b);
    }

    #[test]
    fn digest_changes_with_the_nonce() {
        let asset = test_asset();
        let mut auth = test_authorization();
        let first = TypedData::transfer_with_authorization(&asset, &auth)
            .signing_digest()
            .expect("digest");
        auth.nonce = format!("0x{}", "cd".repeat(32));
        let second = TypedData::transfer_with_authorization(&asset, &auth)
            .signing_digest()
            .expect("digest");
        assert_ne!(first, second);
    }

    #[test]
    fn rejects_malformed_fields() {
        let asset = test_asset();
        let mut auth = test_authorization();
        auth.from = "0x123".into();
        assert!(matches!(
            TypedData::transfer_with_authorization(&asset, &auth).signing_digest(),
            Err(Eip712Error::InvalidAddress(_))
        ));

        let mut auth = test_authorization();
        auth.value = "fifty thousand".into();
        assert!(matches!(
            TypedData::transfer_with_authorization(&asset, &auth).signing_digest(),
            Err(Eip712Error::InvalidAmount(_))
        ));

        let mut auth = test_authorization();
        auth.nonce = "0x1234".into();
        assert!(matches!(
            TypedData::transfer_with_authorization(&asset, &auth).signing_digest(),
            Err(Eip712Error::InvalidNonce(_))
        ));
    }

    #[test]
    fn typed_data_json_matches_signer_document_shape() {
        let typed = TypedData::transfer_with_authorization(&test_asset(), &test_authorization());
        let doc = typed.to_json();

        assert_eq!(doc["primaryType"], "TransferWithAuthorization");
        assert_eq!(doc["domain"]["name"], "USD Coin");
        assert_eq!(doc["domain"]["chainId"], 8453);
        assert_eq!(doc["message"]["value"], "50000");
        assert_eq!(
            doc["types"]["TransferWithAuthorization"][5]["name"],
            "nonce"
        );
    }

    #[test]
    fn hex_decoding_requires_exact_width() {
        assert!(decode_hex::<20>("0x1111111111111111111111111111111111111111").is_some());
        assert!(decode_hex::<20>("0x11").is_none());
        assert!(decode_hex::<32>(&format!("0x{}", "zz".repeat(32))).is_none());
    }
}
