//! Signature-based ownership: recovers the signer of an EIP-191 `personal_sign`
//! message and compares it with the submitting wallet.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Errors raised by ownership checks.
#[derive(Debug, Error)]
pub enum OwnershipError {
    /// Signature is not 65 bytes of hex.
    #[error("invalid signature encoding: {0}")]
    Encoding(String),
    /// Signature does not recover to a public key.
    #[error("signature recovery failed: {0}")]
    Recovery(String),
    /// No RPC endpoint is known for this chain, or the chain is not EVM.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    /// The balance query failed.
    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Keccak-256 of the EIP-191 framed message.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Lower-case `0x` address of an uncompressed secp256k1 key.
pub fn address_of(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let digest: [u8; 32] = Keccak256::digest(&point.as_bytes()[1..]).into();
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Recovers the address that produced `signature_hex` over `message`.
pub fn recover_signer(message: &str, signature_hex: &str) -> Result<String, OwnershipError> {
    let trimmed = signature_hex.trim();
    let raw = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(raw).map_err(|err| OwnershipError::Encoding(err.to_string()))?;
    if bytes.len() != 65 {
        return Err(OwnershipError::Encoding(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }
    let v = match bytes[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        other => {
            return Err(OwnershipError::Encoding(format!(
                "invalid recovery byte {other}"
            )))
        }
    };
    let signature = Signature::from_slice(&bytes[..64])
        .map_err(|err| OwnershipError::Encoding(err.to_string()))?;
    let recid = RecoveryId::from_byte(v)
        .ok_or_else(|| OwnershipError::Encoding("invalid recovery id".to_string()))?;
    let prehash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&prehash, &signature, recid)
        .map_err(|err| OwnershipError::Recovery(err.to_string()))?;
    Ok(address_of(&key))
}

/// Whether `signature_hex` over `message` was produced by `wallet`.
///
/// Any decoding or recovery failure counts as "not verified" and is logged.
pub fn verify_wallet_signature(wallet: &str, message: &str, signature_hex: &str) -> bool {
    match recover_signer(message, signature_hex) {
        Ok(recovered) if recovered.eq_ignore_ascii_case(wallet.trim()) => {
            tracing::info!(wallet, "ownership signature verified");
            true
        }
        Ok(recovered) => {
            tracing::warn!(wallet, recovered = %recovered, "signature recovered to a different address");
            false
        }
        Err(err) => {
            tracing::error!(error = %err, "signature recovery failed");
            false
        }
    }
}
