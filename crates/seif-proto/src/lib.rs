//! Seif Record Codec
//!
//! Framing layer for the Seif session protocol. A *record* is the unit of
//! transmission: a two-byte big-endian length prefix, one identifier blob,
//! and zero or more payload blobs.
//!
//! ```text
//! uint16 identifier_length   (plaintext, even for encrypted records)
//! bytes  identifier          (JSON; ciphertext unless the record is Hello)
//! bytes  blob_1 .. blob_N    (each independently sealed; wire length =
//!                             plaintext length + 16 when encrypted)
//! ```
//!
//! The identifier is a JSON object naming the record type and describing
//! each following blob (`{id, type, length}` with the *plaintext* length).
//! Message payloads are ordered maps of JSON values and raw buffers; the
//! descriptor list preserves insertion order so the peer rebuilds the
//! message with identical field order.
//!
//! # Invariants
//!
//! - Seal Order: the identifier is sealed first, then blobs in descriptor
//!   order. Both sides draw IVs from a shared monotonic sequence, so the
//!   seal order IS the IV assignment order and must never change.
//! - Identifier Bound: a serialised identifier must fit the 16-bit length
//!   prefix. 65535 bytes builds; 65536 fails with
//!   [`CodecError::IdentifierTooBig`].
//!
//! # Security
//!
//! The codec performs no authentication of its own; it delegates to
//! AES-256-GCM via [`RecordCipher`]. Any tampering with sealed bytes
//! surfaces as an authentication failure while parsing, which callers treat
//! as fatal to the connection.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod builder;
mod cipher;
mod errors;
mod identifier;
mod message;
mod reader;

pub use builder::build_record;
pub use cipher::RecordCipher;
pub use errors::{CodecError, Result};
pub use identifier::{
    BlobDescriptor, BlobKind, RecordIdentifier, RecordType, MAX_IDENTIFIER_LEN,
};
pub use message::{FieldValue, Message};
pub use reader::RecordReader;
