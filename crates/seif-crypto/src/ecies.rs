//! ECIES key wrapping over P-521.
//!
//! Used exclusively to carry freshly generated AES keys across the
//! handshake: the handshake key travels wrapped under the receiver's static
//! public key, the session key wrapped under the initiator's. The derived
//! wrapping key encrypts exactly one payload, so the all-zero IV is safe.

use p521::{
    ecdh::{diffie_hellman, EphemeralSecret, SharedSecret},
    PublicKey, SecretKey,
};

use crate::{
    aead::{open, seal, SymmetricKey, IV_LEN, SYMMETRIC_KEY_LEN, TAG_LEN},
    error::CryptoError,
    keys::{export_public_key, import_public_key, RAW_PUBLIC_KEY_LEN},
    CryptoRngCore,
};

/// Bytes an ECIES envelope adds on top of the plaintext:
/// the 133-byte ephemeral public key plus the 16-byte GCM tag.
pub const ECIES_OVERHEAD: usize = RAW_PUBLIC_KEY_LEN + TAG_LEN;

/// The wrapping key is one-shot, so a constant IV cannot repeat per key.
const ECIES_IV: [u8; IV_LEN] = [0u8; IV_LEN];

/// AES-256 key from the leading 256 bits of the shared-secret x-coordinate.
fn wrapping_key(shared: &SharedSecret) -> SymmetricKey {
    let raw = shared.raw_secret_bytes();

    let mut key = [0u8; SYMMETRIC_KEY_LEN];
    key.copy_from_slice(&raw[..SYMMETRIC_KEY_LEN]);
    SymmetricKey::from_bytes(key)
}

/// Encrypt `plaintext` so only the holder of `recipient`'s private key can
/// recover it.
///
/// Emits `ephemeral_public_raw(133) ‖ AES-256-GCM ciphertext`.
pub fn ecies_seal(
    rng: &mut impl CryptoRngCore,
    plaintext: &[u8],
    recipient: &PublicKey,
) -> Vec<u8> {
    let ephemeral = EphemeralSecret::random(rng);
    let ephemeral_public = ephemeral.public_key();

    let shared = ephemeral.diffie_hellman(recipient);
    let key = wrapping_key(&shared);

    let ciphertext = seal(&key, &ECIES_IV, plaintext);

    let mut envelope = Vec::with_capacity(RAW_PUBLIC_KEY_LEN + ciphertext.len());
    envelope.extend_from_slice(&export_public_key(&ephemeral_public));
    envelope.extend_from_slice(&ciphertext);
    envelope
}

/// Decrypt an ECIES envelope with our static private key.
///
/// # Errors
///
/// - `CryptoError::EciesTooShort` if the envelope cannot hold an ephemeral
///   key and a tag
/// - `CryptoError::InvalidPublicKey` if the embedded ephemeral key is not on
///   the curve
/// - `CryptoError::AuthFailed` if the ciphertext does not authenticate
///   (wrong recipient key or tampering)
pub fn ecies_open(envelope: &[u8], secret: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < ECIES_OVERHEAD {
        return Err(CryptoError::EciesTooShort { min: ECIES_OVERHEAD, actual: envelope.len() });
    }

    let (ephemeral_raw, ciphertext) = envelope.split_at(RAW_PUBLIC_KEY_LEN);
    let ephemeral_public = import_public_key(ephemeral_raw)?;

    let shared = diffie_hellman(secret.to_nonzero_scalar(), ephemeral_public.as_affine());
    let key = wrapping_key(&shared);

    open(&key, &ECIES_IV, ciphertext)
}
