//! Error types for the record codec.
//!
//! Everything here is fatal to the connection when it occurs on the parse
//! path; [`CodecError::IdentifierTooBig`] on the build path is the one
//! synchronous failure a caller may observe without tearing down.

use seif_crypto::CryptoError;
use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors produced while building or parsing records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The serialised identifier does not fit the 16-bit length prefix.
    #[error("record identifier too big: {size} bytes exceeds {max}")]
    IdentifierTooBig {
        /// Size the identifier reached.
        size: usize,
        /// Largest representable identifier.
        max: usize,
    },

    /// The identifier names a record type this implementation does not know.
    #[error("unknown record type {found:?}")]
    UnknownRecordType {
        /// The type string found on the wire.
        found: String,
    },

    /// The identifier was not the JSON object the protocol requires.
    #[error("malformed record identifier: {reason}")]
    MalformedIdentifier {
        /// Parse failure detail.
        reason: String,
    },

    /// A blob could not be serialised or did not parse as its declared kind.
    #[error("malformed blob {id:?}: {reason}")]
    MalformedBlob {
        /// Field id of the offending blob.
        id: String,
        /// Failure detail.
        reason: String,
    },

    /// A cryptographic failure (authentication, IV exhaustion).
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
