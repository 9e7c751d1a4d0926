//! Error types for cryptographic operations.
//!
//! Deliberately coarse: a failed authentication tag carries no detail about
//! where the mismatch occurred, so callers cannot leak decryption oracles.

use thiserror::Error;

/// Errors produced by the primitives in this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AES-GCM authentication failed (wrong key, wrong IV, or tampered data).
    #[error("authentication failed")]
    AuthFailed,

    /// A public key was not a valid uncompressed P-521 point.
    #[error("invalid public key: {reason}")]
    InvalidPublicKey {
        /// What was wrong with the key material.
        reason: String,
    },

    /// A private key could not be parsed from its PKCS#8 encoding.
    #[error("invalid private key: {reason}")]
    InvalidPrivateKey {
        /// What was wrong with the key material.
        reason: String,
    },

    /// A symmetric key blob had the wrong length.
    #[error("invalid symmetric key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required key length in bytes.
        expected: usize,
        /// Length actually provided.
        actual: usize,
    },

    /// An ECIES buffer was too short to contain an ephemeral key and a tag.
    #[error("ECIES buffer too short: {actual} bytes, need at least {min}")]
    EciesTooShort {
        /// Minimum parseable length.
        min: usize,
        /// Length actually provided.
        actual: usize,
    },

    /// The IV counter reached its safe bound; the key must be retired.
    #[error("IV counter exhausted")]
    IvExhausted,
}
