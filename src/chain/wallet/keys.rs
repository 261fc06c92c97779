use std::fmt;

use bech32::{self, Hrp};
use bip32::{DerivationPath, XPrv};
use bip39::Mnemonic;
use rand::rngs::OsRng;
use rand::RngCore;
use ripemd::Ripemd160;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::chain::error::{ClientError, ClientResult};

const COSMOS_HD_PATH: &str = "m/44'/118'/0'/0/0";
const GENERATED_WORD_COUNT: usize = 24;
const ENTROPY_BYTES: usize = 32;

/// A single account derived from a recovery phrase.
///
/// Key material and the phrase live only in memory and are zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Wallet {
    #[zeroize(skip)]
    address: String,
    #[zeroize(skip)]
    address_prefix: String,
    recovery_phrase: String,
    private_key_bytes: [u8; 32],
    public_key_bytes: [u8; 33],
}

impl Wallet {
    /// Derive the first account of `phrase` under `prefix`.
    ///
    /// Whitespace is trimmed and collapsed before the checksum is verified.
    pub fn from_mnemonic(phrase: &str, prefix: &str) -> ClientResult<Self> {
        let normalized = normalize_phrase(phrase);
        let mnemonic = Mnemonic::parse(normalized.as_str())
            .map_err(|e| ClientError::InvalidMnemonic(e.to_string()))?;
        Self::from_parsed(&mnemonic, normalized, prefix)
    }

    /// Generate a fresh 24-word phrase from OS entropy and derive its first
    /// account.
    pub fn generate(prefix: &str) -> ClientResult<Self> {
        let mut entropy = [0u8; ENTROPY_BYTES];
        OsRng
            .try_fill_bytes(&mut entropy)
            .map_err(|e| ClientError::KeyDerivation(format!("entropy source failed: {}", e)))?;

        let mnemonic = Mnemonic::from_entropy(&entropy)
            .map_err(|e| ClientError::KeyDerivation(e.to_string()));
        entropy.zeroize();
        let mnemonic = mnemonic?;

        if mnemonic.word_count() != GENERATED_WORD_COUNT {
            return Err(ClientError::KeyDerivation(format!(
                "expected {} words, got {}",
                GENERATED_WORD_COUNT,
                mnemonic.word_count()
            )));
        }

        let phrase = mnemonic.to_string();
        Self::from_parsed(&mnemonic, phrase, prefix)
    }

    fn from_parsed(mnemonic: &Mnemonic, phrase: String, prefix: &str) -> ClientResult<Self> {
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let private_key = Zeroizing::new(derive_private_key(&seed[..], COSMOS_HD_PATH)?);

        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(&private_key[..])
            .map_err(|e| ClientError::KeyDerivation(e.to_string()))?;
        let public_key_bytes = PublicKey::from_secret_key(&secp, &secret_key).serialize();
        let address = account_address(&public_key_bytes, prefix)?;

        Ok(Self {
            address,
            address_prefix: prefix.to_string(),
            recovery_phrase: phrase,
            private_key_bytes: *private_key,
            public_key_bytes,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn address_prefix(&self) -> &str {
        &self.address_prefix
    }

    /// The recovery phrase, for showing once to the user after generation.
    pub fn recovery_phrase(&self) -> &str {
        &self.recovery_phrase
    }

    /// Compressed secp256k1 public key (33 bytes).
    pub fn public_key_compressed(&self) -> [u8; 33] {
        self.public_key_bytes
    }

    /// Signing key. Use it immediately; do not store the result.
    pub fn private_key(&self) -> ClientResult<SecretKey> {
        SecretKey::from_slice(&self.private_key_bytes)
            .map_err(|e| ClientError::KeyDerivation(format!("invalid private key: {}", e)))
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("address_prefix", &self.address_prefix)
            .finish_non_exhaustive()
    }
}

/// Owns the active wallet of a session. At most one key is held at a time.
#[derive(Debug)]
pub struct WalletKeyManager {
    prefix: String,
    active: Option<Wallet>,
}

impl WalletKeyManager {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            active: None,
        }
    }

    /// Discard the current key and generate a new wallet.
    pub fn generate(&mut self) -> ClientResult<&Wallet> {
        self.active = None;
        let wallet = Wallet::generate(&self.prefix)?;
        log::info!("Generated wallet {}", wallet.address());
        Ok(self.active.insert(wallet))
    }

    /// Discard the current key and import `phrase`. On failure no key is held.
    pub fn import_from_phrase(&mut self, phrase: &str) -> ClientResult<&Wallet> {
        self.active = None;
        let wallet = Wallet::from_mnemonic(phrase, &self.prefix)?;
        log::info!("Imported wallet {}", wallet.address());
        Ok(self.active.insert(wallet))
    }

    pub fn active(&self) -> Option<&Wallet> {
        self.active.as_ref()
    }

    /// Hand the active wallet over to a signing client.
    pub fn take(&mut self) -> Option<Wallet> {
        self.active.take()
    }

    /// Drop (and zeroize) the active key.
    pub fn disconnect(&mut self) {
        if let Some(wallet) = self.active.take() {
            log::info!("Disconnected wallet {}", wallet.address());
        }
    }
}

fn normalize_phrase(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn derive_private_key(seed: &[u8], path: &str) -> ClientResult<[u8; 32]> {
    let path: DerivationPath = path
        .parse()
        .map_err(|e| ClientError::KeyDerivation(format!("invalid HD path: {}", e)))?;
    let xprv = XPrv::derive_from_path(seed, &path)
        .map_err(|e| ClientError::KeyDerivation(format!("BIP32 derivation failed: {}", e)))?;
    Ok(xprv.to_bytes())
}

/// bech32(prefix, RIPEMD160(SHA256(pubkey)))
pub fn account_address(public_key_compressed: &[u8], prefix: &str) -> ClientResult<String> {
    let sha = Sha256::digest(public_key_compressed);
    let hash = Ripemd160::digest(sha);

    let hrp = Hrp::parse(prefix)
        .map_err(|e| ClientError::KeyDerivation(format!("invalid address prefix: {}", e)))?;
    bech32::encode::<bech32::Bech32>(hrp, &hash)
        .map_err(|e| ClientError::KeyDerivation(format!("bech32 encoding failed: {}", e)))
}
