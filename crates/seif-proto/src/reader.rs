//! Incremental record parsing.
//!
//! Transports deliver opaque chunks with no framing guarantees, so the
//! reader accumulates bytes in an unbounded buffer and advances a small
//! state machine: length prefix, identifier, then one blob at a time. A
//! record whose bytes have not fully arrived parks the reader mid-state;
//! decrypted partial progress (the identifier, completed blobs) is retained
//! so no unit is ever decrypted twice.

use bytes::{Buf, Bytes, BytesMut};

use crate::{
    cipher::RecordCipher,
    errors::{CodecError, Result},
    identifier::{BlobKind, RecordIdentifier},
    message::{FieldValue, Message},
};

/// Parser state between calls.
enum ReadState {
    /// Waiting for the two-byte length prefix.
    Length,
    /// Waiting for the identifier's wire bytes.
    Identifier {
        /// Wire length of the (possibly sealed) identifier.
        wire_len: usize,
    },
    /// Waiting for blob `next`'s wire bytes.
    Blobs {
        identifier: RecordIdentifier,
        fields: Vec<(String, FieldValue)>,
        next: usize,
    },
}

/// Incremental reader over a connection's incoming byte stream.
///
/// Call [`RecordReader::extend`] with each transport chunk, then drain
/// completed records with [`RecordReader::next_record`] until it returns
/// `None`.
pub struct RecordReader {
    buf: BytesMut,
    state: ReadState,
}

impl RecordReader {
    /// Create a reader with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: BytesMut::new(), state: ReadState::Length }
    }

    /// Append a transport chunk to the in-buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet consumed by a completed parse step.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Try to parse one complete record.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Errors are fatal: the
    /// reader makes no attempt to resynchronise a damaged stream.
    ///
    /// # Errors
    ///
    /// - `CodecError::Crypto(AuthFailed)` if a sealed unit fails to
    ///   authenticate
    /// - `CodecError::MalformedIdentifier` / `CodecError::UnknownRecordType`
    ///   for identifier damage
    /// - `CodecError::MalformedBlob` if a JSON blob does not parse or a blob
    ///   length overflows
    pub fn next_record(
        &mut self,
        cipher: &mut RecordCipher<'_>,
    ) -> Result<Option<(RecordIdentifier, Message)>> {
        loop {
            // A record completes once every declared blob has been collected.
            let complete = matches!(
                &self.state,
                ReadState::Blobs { identifier, next, .. } if *next == identifier.blobs.len()
            );
            if complete {
                let ReadState::Blobs { identifier, fields, .. } =
                    std::mem::replace(&mut self.state, ReadState::Length)
                else {
                    unreachable!("completion checked above");
                };

                let message = fields.into_iter().collect();
                return Ok(Some((identifier, message)));
            }

            match &mut self.state {
                ReadState::Length => {
                    if self.buf.len() < 2 {
                        return Ok(None);
                    }

                    let wire_len = self.buf.get_u16() as usize;
                    self.state = ReadState::Identifier { wire_len };
                },

                ReadState::Identifier { wire_len } => {
                    if self.buf.len() < *wire_len {
                        return Ok(None);
                    }

                    let sealed = self.buf.split_to(*wire_len);
                    let plain = cipher.open(&sealed)?;
                    let identifier = RecordIdentifier::from_json(&plain)?;

                    self.state = ReadState::Blobs {
                        fields: Vec::with_capacity(identifier.blobs.len()),
                        identifier,
                        next: 0,
                    };
                },

                ReadState::Blobs { identifier, fields, next } => {
                    let descriptor = &identifier.blobs[*next];
                    let wire_len = blob_wire_len(descriptor.length, cipher.overhead())
                        .ok_or_else(|| CodecError::MalformedBlob {
                            id: descriptor.id.clone(),
                            reason: "blob length overflows".to_string(),
                        })?;

                    if self.buf.len() < wire_len {
                        return Ok(None);
                    }

                    let sealed = self.buf.split_to(wire_len);
                    let plain = cipher.open(&sealed)?;

                    let value = match descriptor.kind {
                        BlobKind::Json => {
                            let value = serde_json::from_slice(&plain).map_err(|e| {
                                CodecError::MalformedBlob {
                                    id: descriptor.id.clone(),
                                    reason: e.to_string(),
                                }
                            })?;
                            FieldValue::Json(value)
                        },
                        BlobKind::Buffer => FieldValue::Buffer(Bytes::from(plain)),
                    };

                    fields.push((descriptor.id.clone(), value));
                    *next += 1;
                },
            }
        }
    }
}

impl Default for RecordReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire length of a blob, `None` on usize overflow of an adversarial
/// declared length.
fn blob_wire_len(plain_len: u64, overhead: usize) -> Option<usize> {
    usize::try_from(plain_len).ok()?.checked_add(overhead)
}
