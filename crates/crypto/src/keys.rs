use std::fmt;

use bip39::{Language, Mnemonic};
use ed25519_dalek::{SigningKey, VerifyingKey};
use ed25519_dalek_bip32::{ChildIndex, ExtendedSigningKey};
use piclaim_core::{Address, PI_DERIVATION_PATH};
use stellar_strkey::ed25519::PrivateKey as StrkeyPrivateKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid recovery phrase: {0}")]
    InvalidPhrase(String),
    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),
    #[error("Invalid secret seed")]
    InvalidSecret,
}

/// Signing keypair for one ledger account.
///
/// Lives in memory for the lifetime of the process and is never persisted.
/// `Debug` prints the public address only.
pub struct KeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.signing_key.to_bytes() == other.signing_key.to_bytes()
    }
}

impl Eq for KeyPair {}

impl KeyPair {
    /// Create from raw secret key bytes
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let address = Address::from_public_key(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// Create from an `S...` secret seed
    pub fn from_secret_seed(seed: &str) -> Result<Self, KeyError> {
        let secret = StrkeyPrivateKey::from_string(seed.trim()).map_err(|_| KeyError::InvalidSecret)?;
        Ok(Self::from_secret_bytes(&secret.0))
    }

    /// Public account address (`G...`)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Secret seed in StrKey form (`S...`)
    pub fn secret_seed(&self) -> String {
        StrkeyPrivateKey(self.signing_key.to_bytes()).to_string()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        *self.address.public_key()
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

/// Validate a recovery phrase against the English word list and its checksum.
pub fn validate_phrase(phrase: &str) -> Result<Mnemonic, KeyError> {
    let normalized = normalize_phrase(phrase);
    Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|e| KeyError::InvalidPhrase(e.to_string()))
}

/// Derive the account keypair for a recovery phrase.
///
/// phrase -> 64-byte seed (empty passphrase) -> SLIP-10 ed25519 along
/// `m/44'/314159'/0'` -> signing key. Deterministic and free of I/O.
pub fn derive_keypair(phrase: &str) -> Result<KeyPair, KeyError> {
    let mnemonic = validate_phrase(phrase)?;
    let seed = mnemonic.to_seed_normalized("");

    let mut key = ExtendedSigningKey::from_seed(&seed)
        .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;
    for index in PI_DERIVATION_PATH {
        key = key
            .derive_child(ChildIndex::Hardened(index))
            .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;
    }

    Ok(KeyPair::from_secret_bytes(&key.signing_key.to_bytes()))
}

/// Collapse runs of whitespace and lowercase the words
fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
