//! Record construction.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    cipher::RecordCipher,
    errors::{CodecError, Result},
    identifier::{BlobDescriptor, BlobKind, RecordIdentifier, RecordType, MAX_IDENTIFIER_LEN},
    message::{FieldValue, Message},
};

/// Build one wire record from a message.
///
/// Each message field becomes one blob: JSON values are serialised to
/// minimal UTF-8, buffers travel verbatim. Descriptors are appended to the
/// identifier in insertion order, the identifier is sealed first, then each
/// blob in order, and the units are concatenated behind the two-byte length
/// prefix.
///
/// # Errors
///
/// - `CodecError::IdentifierTooBig` if the serialised (or sealed)
///   identifier exceeds 65535 bytes; the cipher state may have advanced by
///   one IV, which is harmless
/// - `CodecError::MalformedBlob` if a JSON field fails to serialise
/// - `CodecError::Crypto(IvExhausted)` if the IV sequence is spent
pub fn build_record(
    record_type: RecordType,
    version: Option<u8>,
    message: &Message,
    cipher: &mut RecordCipher<'_>,
) -> Result<Bytes> {
    let mut identifier = RecordIdentifier::new(record_type);
    identifier.version = version;

    let mut plain_blobs: Vec<Vec<u8>> = Vec::with_capacity(message.len());

    for (id, value) in message.iter() {
        let (kind, bytes) = match value {
            FieldValue::Json(value) => {
                let bytes = serde_json::to_vec(value).map_err(|e| CodecError::MalformedBlob {
                    id: id.to_string(),
                    reason: e.to_string(),
                })?;
                (BlobKind::Json, bytes)
            },
            FieldValue::Buffer(buffer) => (BlobKind::Buffer, buffer.to_vec()),
        };

        identifier.blobs.push(BlobDescriptor {
            id: id.to_string(),
            kind,
            length: bytes.len() as u64,
        });
        plain_blobs.push(bytes);
    }

    let identifier_json = identifier.to_json();
    if identifier_json.len() > MAX_IDENTIFIER_LEN {
        return Err(CodecError::IdentifierTooBig {
            size: identifier_json.len(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    // The identifier consumes the first IV of the record.
    let sealed_identifier = cipher.seal(&identifier_json)?;
    if sealed_identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(CodecError::IdentifierTooBig {
            size: sealed_identifier.len(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    let overhead = cipher.overhead();
    let blob_wire_len: usize = plain_blobs.iter().map(|b| b.len() + overhead).sum();

    let mut wire = BytesMut::with_capacity(2 + sealed_identifier.len() + blob_wire_len);
    wire.put_u16(sealed_identifier.len() as u16);
    wire.put_slice(&sealed_identifier);

    for blob in &plain_blobs {
        wire.put_slice(&cipher.seal(blob)?);
    }

    Ok(wire.freeze())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rand::rngs::OsRng;
    use seif_crypto::{IvSequence, SymmetricKey, TAG_LEN};
    use serde_json::json;

    use super::*;

    #[test]
    fn cleartext_record_layout() {
        let message = Message::new().with("n", json!(5));
        let wire =
            build_record(RecordType::Hello, Some(0), &message, &mut RecordCipher::Clear).unwrap();

        let identifier_len = u16::from_be_bytes([wire[0], wire[1]]) as usize;
        let identifier =
            RecordIdentifier::from_json(&wire[2..2 + identifier_len]).unwrap();

        assert_eq!(identifier.record_type, RecordType::Hello);
        assert_eq!(identifier.version, Some(0));
        assert_eq!(identifier.blobs.len(), 1);
        assert_eq!(identifier.blobs[0].length, 1); // "5"
        assert_eq!(&wire[2 + identifier_len..], b"5");
    }

    #[test]
    fn sealed_blob_wire_length_includes_tag() {
        let key = SymmetricKey::generate(&mut OsRng);
        let mut ivs = IvSequence::new(0);
        let mut cipher = RecordCipher::Aes { key: &key, ivs: &mut ivs };

        let message = Message::new().with("buf", Bytes::from_static(&[1, 2, 3]));
        let wire = build_record(RecordType::Send, None, &message, &mut cipher).unwrap();

        let identifier_len = u16::from_be_bytes([wire[0], wire[1]]) as usize;
        assert_eq!(wire.len(), 2 + identifier_len + 3 + TAG_LEN);
    }

    #[test]
    fn identifier_at_limit_builds() {
        // Pad the identifier to exactly 65535 bytes via a long field id.
        let message = padded_message(MAX_IDENTIFIER_LEN);
        let wire =
            build_record(RecordType::StatusSend, None, &message, &mut RecordCipher::Clear)
                .unwrap();

        let identifier_len = u16::from_be_bytes([wire[0], wire[1]]) as usize;
        assert_eq!(identifier_len, MAX_IDENTIFIER_LEN);
    }

    #[test]
    fn identifier_past_limit_fails() {
        let message = padded_message(MAX_IDENTIFIER_LEN + 1);
        let result =
            build_record(RecordType::StatusSend, None, &message, &mut RecordCipher::Clear);

        assert!(matches!(result, Err(CodecError::IdentifierTooBig { size, .. }) if size == MAX_IDENTIFIER_LEN + 1));
    }

    #[test]
    fn zero_length_blob_builds() {
        let key = SymmetricKey::generate(&mut OsRng);
        let mut ivs = IvSequence::new(0);
        let mut cipher = RecordCipher::Aes { key: &key, ivs: &mut ivs };

        let message = Message::new().with("empty", Bytes::new());
        let wire = build_record(RecordType::Send, None, &message, &mut cipher).unwrap();

        let identifier_len = u16::from_be_bytes([wire[0], wire[1]]) as usize;
        assert_eq!(wire.len(), 2 + identifier_len + TAG_LEN);
    }

    /// A message whose serialised StatusSend identifier is exactly
    /// `target` bytes long.
    fn padded_message(target: usize) -> Message {
        let skeleton = build_len(0);
        let message = Message::new().with("x".repeat(target - skeleton), Bytes::new());
        message
    }

    /// Serialised identifier length for a single zero-length Buffer blob
    /// whose id is `pad` bytes long.
    fn build_len(pad: usize) -> usize {
        let mut identifier = RecordIdentifier::new(RecordType::StatusSend);
        identifier.blobs.push(BlobDescriptor {
            id: "x".repeat(pad),
            kind: BlobKind::Buffer,
            length: 0,
        });
        identifier.to_json().len()
    }
}
