//! Static P-521 ECDH keypairs and their wire encodings.
//!
//! Public keys travel as raw uncompressed SEC1 points (133 bytes:
//! `0x04 ‖ X(66) ‖ Y(66)`). Private keys are exchanged with the store layer
//! as PKCS#8 DER, wrapped in [`Zeroizing`] so exports are scrubbed once
//! persisted.

use p521::{
    elliptic_curve::{
        pkcs8::{DecodePrivateKey, EncodePrivateKey},
        sec1::ToEncodedPoint,
    },
    PublicKey, SecretKey,
};
use zeroize::Zeroizing;

use crate::{error::CryptoError, CryptoRngCore};

/// Length of a raw uncompressed P-521 public key.
pub const RAW_PUBLIC_KEY_LEN: usize = 133;

/// A static P-521 keypair identifying one peer.
///
/// The secret half never appears in `Debug` output and only leaves the
/// process through [`export_private_key`].
#[derive(Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a fresh keypair.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        let secret = SecretKey::random(rng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Rebuild a keypair from its secret half.
    #[must_use]
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// The public half.
    #[must_use]
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// The secret half.
    #[must_use]
    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// The public half in raw uncompressed form.
    #[must_use]
    pub fn public_raw(&self) -> [u8; RAW_PUBLIC_KEY_LEN] {
        export_public_key(&self.public)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair").field("public", &hex::encode(self.public_raw())).finish()
    }
}

/// Export a public key as a raw uncompressed SEC1 point.
#[must_use]
pub fn export_public_key(key: &PublicKey) -> [u8; RAW_PUBLIC_KEY_LEN] {
    let point = key.to_encoded_point(false);
    let bytes = point.as_bytes();

    debug_assert_eq!(bytes.len(), RAW_PUBLIC_KEY_LEN);

    let mut raw = [0u8; RAW_PUBLIC_KEY_LEN];
    raw.copy_from_slice(bytes);
    raw
}

/// Import a public key from its raw uncompressed form.
///
/// # Errors
///
/// - `CryptoError::InvalidPublicKey` if the buffer is not 133 bytes or does
///   not decode to a point on the curve.
pub fn import_public_key(raw: &[u8]) -> Result<PublicKey, CryptoError> {
    if raw.len() != RAW_PUBLIC_KEY_LEN {
        return Err(CryptoError::InvalidPublicKey {
            reason: format!("expected {RAW_PUBLIC_KEY_LEN} bytes, got {}", raw.len()),
        });
    }

    PublicKey::from_sec1_bytes(raw)
        .map_err(|e| CryptoError::InvalidPublicKey { reason: e.to_string() })
}

/// Export a private key as PKCS#8 DER.
///
/// # Errors
///
/// - `CryptoError::InvalidPrivateKey` if DER encoding fails.
pub fn export_private_key(key: &SecretKey) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let document = key
        .to_pkcs8_der()
        .map_err(|e| CryptoError::InvalidPrivateKey { reason: e.to_string() })?;

    Ok(Zeroizing::new(document.as_bytes().to_vec()))
}

/// Import a private key from PKCS#8 DER.
///
/// # Errors
///
/// - `CryptoError::InvalidPrivateKey` if the document does not parse as a
///   P-521 private key.
pub fn import_private_key(der: &[u8]) -> Result<SecretKey, CryptoError> {
    SecretKey::from_pkcs8_der(der)
        .map_err(|e| CryptoError::InvalidPrivateKey { reason: e.to_string() })
}
