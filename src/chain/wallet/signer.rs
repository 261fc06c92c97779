use secp256k1::{Message, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::chain::error::{ClientError, ClientResult};

/// secp256k1 signer for Cosmos SDK SIGN_MODE_DIRECT
pub struct TransactionSigner {
    secp: Secp256k1<secp256k1::All>,
}

impl TransactionSigner {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }

    /// Sign encoded `SignDoc` bytes.
    /// Returns the 64-byte compact (r || s) signature the SDK expects.
    pub fn sign_doc(&self, sign_doc_bytes: &[u8], private_key: &SecretKey) -> ClientResult<Vec<u8>> {
        let hash: [u8; 32] = Sha256::digest(sign_doc_bytes).into();
        self.sign_hash(&hash, private_key)
    }

    /// Sign a pre-computed SHA-256 digest.
    pub fn sign_hash(&self, hash: &[u8; 32], private_key: &SecretKey) -> ClientResult<Vec<u8>> {
        let message = Message::from_digest_slice(hash)
            .map_err(|e| ClientError::KeyDerivation(format!("invalid digest: {}", e)))?;

        // Low-S normalized by libsecp256k1, as the SDK ante handler requires
        let signature = self.secp.sign_ecdsa(&message, private_key);
        Ok(signature.serialize_compact().to_vec())
    }
}

impl Default for TransactionSigner {
    fn default() -> Self {
        Self::new()
    }
}
