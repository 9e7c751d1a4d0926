//! Per-record sealing context.
//!
//! A [`RecordCipher`] seals or opens one plaintext unit (the identifier or
//! a single blob) per call. In AES mode every call draws the next IV from
//! the connection's sequence, so call order is IV order; the builder and
//! reader are careful to seal and open units in the same order.

use seif_crypto::{open, seal, IvSequence, SymmetricKey, TAG_LEN};

use crate::errors::Result;

/// Sealing mode for one record.
pub enum RecordCipher<'a> {
    /// Identity transform; used for `Hello`, whose framing is cleartext.
    Clear,
    /// AES-256-GCM under a connection key, IVs drawn from the sequence.
    Aes {
        /// Handshake or session key.
        key: &'a SymmetricKey,
        /// The direction's IV sequence.
        ivs: &'a mut IvSequence,
    },
}

impl RecordCipher<'_> {
    /// Bytes added to each sealed unit (0 for cleartext, 16 for AES-GCM).
    #[must_use]
    pub fn overhead(&self) -> usize {
        match self {
            Self::Clear => 0,
            Self::Aes { .. } => TAG_LEN,
        }
    }

    /// Seal one unit.
    ///
    /// # Errors
    ///
    /// - `CodecError::Crypto(IvExhausted)` if the IV sequence is spent
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Clear => Ok(plaintext.to_vec()),
            Self::Aes { key, ivs } => {
                let iv = ivs.next()?;
                Ok(seal(key, &iv, plaintext))
            },
        }
    }

    /// Open one unit.
    ///
    /// # Errors
    ///
    /// - `CodecError::Crypto(AuthFailed)` if authentication fails
    /// - `CodecError::Crypto(IvExhausted)` if the IV sequence is spent
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Clear => Ok(ciphertext.to_vec()),
            Self::Aes { key, ivs } => {
                let iv = ivs.next()?;
                Ok(open(key, &iv, ciphertext)?)
            },
        }
    }
}
