//! AES-256-GCM sealing and opening.
//!
//! The authentication tag is the protocol's only integrity mechanism: any
//! bit flipped in a sealed record surfaces here as [`CryptoError::AuthFailed`]
//! and is fatal to the connection upstream.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{error::CryptoError, CryptoRngCore};

/// AES-256 key length in bytes.
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// GCM IV length in bytes.
pub const IV_LEN: usize = 12;

/// GCM authentication tag length in bytes (appended to every ciphertext).
pub const TAG_LEN: usize = 16;

/// An AES-256 key, zeroized on drop.
///
/// Keys are generated fresh per connection (handshake key, session key) or
/// derived by ECIES for a single wrap operation. They never leave the
/// process except ECIES-encrypted inside handshake records.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LEN]);

impl SymmetricKey {
    /// Generate a fresh random key.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        let mut bytes = [0u8; SYMMETRIC_KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Wrap a raw key blob of unchecked length.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidKeyLength` if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SYMMETRIC_KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: SYMMETRIC_KEY_LEN,
                actual: bytes.len(),
            });
        }

        let mut key = [0u8; SYMMETRIC_KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.0
    }
}

impl Clone for SymmetricKey {
    fn clone(&self) -> Self {
        Self(self.0)
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.write_str("SymmetricKey(..)")
    }
}

/// Encrypt `plaintext` under `key` with the given IV.
///
/// The returned ciphertext is `plaintext.len() + 16` bytes (tag appended).
#[must_use]
pub fn seal(key: &SymmetricKey, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    let Ok(cipher) = Aes256Gcm::new_from_slice(key.as_bytes()) else {
        unreachable!("AES-256 key is always 32 bytes");
    };

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(iv), plaintext) else {
        unreachable!("AES-GCM encryption cannot fail with valid inputs");
    };

    ciphertext
}

/// Decrypt and authenticate `ciphertext` under `key` with the given IV.
///
/// # Errors
///
/// - `CryptoError::AuthFailed` if the tag does not verify (wrong key, wrong
///   IV, truncated or tampered data).
pub fn open(key: &SymmetricKey, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let Ok(cipher) = Aes256Gcm::new_from_slice(key.as_bytes()) else {
        unreachable!("AES-256 key is always 32 bytes");
    };

    cipher.decrypt(Nonce::from_slice(iv), ciphertext).map_err(|_| CryptoError::AuthFailed)
}
