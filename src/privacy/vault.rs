//! At-rest encryption
//!
//! AES-256-GCM with a random 96-bit nonce per message. The key reference is
//! bound as associated data, so a payload sealed under one key ref never
//! opens under another even when both resolve to the same key.
//!
//! Envelope layout: `[version:1][nonce:12][ciphertext+tag]`.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use parking_lot::RwLock;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{AgentError, Result};

const ENVELOPE_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const KEY_STRETCH_ROUNDS: usize = 10_000;

/// 256-bit key, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; 32]);

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short public identifier (never the key itself)
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyMaterial({})", self.fingerprint())
    }
}

/// Key provider (TPM, OS keychain, passphrase...)
pub trait KeyStore: Send + Sync {
    /// Resolve a key reference to key material
    fn key(&self, key_ref: &str) -> Result<KeyMaterial>;
}

/// Keys derived from a user passphrase and a persisted salt
pub struct PassphraseKeyStore {
    passphrase: Zeroizing<Vec<u8>>,
    salt: [u8; 32],
    derived: RwLock<HashMap<String, KeyMaterial>>,
}

impl PassphraseKeyStore {
    /// New store with a fresh random salt
    pub fn new(passphrase: &str) -> Self {
        let mut salt = [0u8; 32];
        OsRng.fill_bytes(&mut salt);
        Self::with_salt(passphrase, salt)
    }

    /// Reopen with a previously persisted salt
    pub fn with_salt(passphrase: &str, salt: [u8; 32]) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.as_bytes().to_vec()),
            salt,
            derived: RwLock::new(HashMap::new()),
        }
    }

    pub fn salt(&self) -> [u8; 32] {
        self.salt
    }

    fn derive(&self, key_ref: &str) -> KeyMaterial {
        let mut hasher = Sha256::new();
        hasher.update(self.passphrase.as_slice());
        hasher.update(self.salt);
        hasher.update(key_ref.as_bytes());

        let mut result = hasher.finalize();
        for _ in 0..KEY_STRETCH_ROUNDS {
            let mut hasher = Sha256::new();
            hasher.update(result);
            hasher.update(self.salt);
            result = hasher.finalize();
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&result);
        KeyMaterial(key)
    }
}

impl KeyStore for PassphraseKeyStore {
    fn key(&self, key_ref: &str) -> Result<KeyMaterial> {
        if let Some(key) = self.derived.read().get(key_ref) {
            return Ok(key.clone());
        }
        let key = self.derive(key_ref);
        self.derived.write().insert(key_ref.to_string(), key.clone());
        Ok(key)
    }
}

/// Process-lifetime random keys, created on first use
#[derive(Default)]
pub struct EphemeralKeyStore {
    keys: RwLock<HashMap<String, KeyMaterial>>,
}

impl EphemeralKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a known key under a reference
    pub fn insert(&self, key_ref: &str, key: KeyMaterial) {
        self.keys.write().insert(key_ref.to_string(), key);
    }
}

impl KeyStore for EphemeralKeyStore {
    fn key(&self, key_ref: &str) -> Result<KeyMaterial> {
        if let Some(key) = self.keys.read().get(key_ref) {
            return Ok(key.clone());
        }
        let mut keys = self.keys.write();
        let key = keys
            .entry(key_ref.to_string())
            .or_insert_with(KeyMaterial::generate);
        Ok(key.clone())
    }
}

/// Encrypt `plaintext` under `key`, binding `key_ref` as associated data
pub fn seal(key: &KeyMaterial, key_ref: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| AgentError::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: key_ref.as_bytes(),
            },
        )
        .map_err(|e| AgentError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an envelope produced by [`seal`]
pub fn open(key: &KeyMaterial, key_ref: &str, envelope: &[u8]) -> Result<Vec<u8>> {
    if envelope.len() < 1 + NONCE_LEN {
        return Err(AgentError::DecryptionFailed("payload too short".to_string()));
    }
    if envelope[0] != ENVELOPE_VERSION {
        return Err(AgentError::DecryptionFailed(format!(
            "unsupported envelope version {}",
            envelope[0]
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| AgentError::DecryptionFailed(e.to_string()))?;
    let nonce = Nonce::from_slice(&envelope[1..1 + NONCE_LEN]);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &envelope[1 + NONCE_LEN..],
                aad: key_ref.as_bytes(),
            },
        )
        .map_err(|_| AgentError::DecryptionFailed("authentication tag mismatch".to_string()))
}
