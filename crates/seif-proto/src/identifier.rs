//! Record identifier: the JSON object that types a record and describes its
//! blobs.
//!
//! On the wire an identifier looks like:
//!
//! ```json
//! {"type":"Send","blobs":[{"id":"k","type":"JSON","length":3}]}
//! ```
//!
//! `length` is always the plaintext length; the wire length of a sealed blob
//! is `length + 16`. The `version` field appears only on `Hello`.

use serde::{Deserialize, Serialize};

use crate::errors::{CodecError, Result};

/// Largest serialised identifier representable by the 16-bit length prefix.
pub const MAX_IDENTIFIER_LEN: usize = u16::MAX as usize;

/// The six record types of protocol version 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Handshake opener, initiator to receiver, cleartext framing.
    Hello,
    /// Handshake closer, receiver to initiator, sealed under the handshake
    /// key.
    AuthHello,
    /// Application message that requests an acknowledgement.
    Send,
    /// Fire-and-forget application message.
    StatusSend,
    /// Acknowledgement of the oldest outstanding `Send`.
    Acknowledge,
    /// Instruction to the initiator to reconnect elsewhere.
    Redirect,
}

impl RecordType {
    /// The wire string of this type.
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Hello => "Hello",
            Self::AuthHello => "AuthHello",
            Self::Send => "Send",
            Self::StatusSend => "StatusSend",
            Self::Acknowledge => "Acknowledge",
            Self::Redirect => "Redirect",
        }
    }

    /// Parse a wire string. `None` for unknown types.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "Hello" => Some(Self::Hello),
            "AuthHello" => Some(Self::AuthHello),
            "Send" => Some(Self::Send),
            "StatusSend" => Some(Self::StatusSend),
            "Acknowledge" => Some(Self::Acknowledge),
            "Redirect" => Some(Self::Redirect),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Whether a blob carries JSON or raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobKind {
    /// UTF-8 JSON; the peer parses it back into a value.
    #[serde(rename = "JSON")]
    Json,
    /// Opaque bytes, delivered verbatim.
    #[serde(rename = "Buffer")]
    Buffer,
}

/// Description of one payload blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    /// Field id the blob maps back to.
    pub id: String,
    /// JSON or Buffer.
    #[serde(rename = "type")]
    pub kind: BlobKind,
    /// Plaintext length in bytes.
    pub length: u64,
}

/// Parsed form of a record identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordIdentifier {
    /// The record type.
    pub record_type: RecordType,
    /// Protocol version; present only on `Hello`.
    pub version: Option<u8>,
    /// Blob descriptors in wire order.
    pub blobs: Vec<BlobDescriptor>,
}

/// Serde image of the identifier with the type still a free string, so
/// unknown types can be reported distinctly from JSON damage.
#[derive(Serialize, Deserialize)]
struct WireIdentifier {
    #[serde(rename = "type")]
    record_type: String,
    blobs: Vec<BlobDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u8>,
}

impl RecordIdentifier {
    /// Create an identifier with no blobs.
    #[must_use]
    pub fn new(record_type: RecordType) -> Self {
        Self { record_type, version: None, blobs: Vec::new() }
    }

    /// Serialise to minimal UTF-8 JSON.
    #[must_use]
    pub fn to_json(&self) -> Vec<u8> {
        let wire = WireIdentifier {
            record_type: self.record_type.as_wire().to_string(),
            blobs: self.blobs.clone(),
            version: self.version,
        };

        let Ok(bytes) = serde_json::to_vec(&wire) else {
            unreachable!("identifier serialisation cannot fail: all fields are plain data");
        };
        bytes
    }

    /// Parse an identifier from its JSON form.
    ///
    /// # Errors
    ///
    /// - `CodecError::MalformedIdentifier` if the bytes are not the expected
    ///   JSON shape
    /// - `CodecError::UnknownRecordType` if the type string is not one of
    ///   the six known types
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let wire: WireIdentifier = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::MalformedIdentifier { reason: e.to_string() })?;

        let record_type = RecordType::from_wire(&wire.record_type)
            .ok_or(CodecError::UnknownRecordType { found: wire.record_type })?;

        Ok(Self { record_type, version: wire.version, blobs: wire.blobs })
    }
}
