//! Handshake record construction and validation.
//!
//! Two records establish a session. `Hello` travels with cleartext framing:
//! its sensitive parts are ciphertexts embedded as buffers — the handshake
//! key wrapped for the receiver's static key, and the hello payload sealed
//! under that handshake key. `AuthHello` answers under the handshake key and
//! carries the session key wrapped for the initiator.
//!
//! These helpers are pure; the [`crate::Session`] owns all state and calls
//! into them with explicit key and IV-sequence references.

use bytes::Bytes;
use seif_crypto::{
    ecies_open, ecies_seal, export_public_key, import_public_key, open, seal, IvSequence,
    PublicKey, SecretKey, SymmetricKey,
};
use seif_proto::{build_record, Message, RecordCipher, RecordType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    env::{EnvRng, Environment},
    error::SessionError,
};

/// Field carrying the ECIES-wrapped handshake key in `Hello`.
pub(crate) const FIELD_HANDSHAKE_KEY: &str = "handshakeKey";

/// Field carrying the sealed hello payload in `Hello`.
pub(crate) const FIELD_HELLO_DATA: &str = "helloData";

/// Cleartext connection metadata field in `Hello`.
pub(crate) const FIELD_CONNECTION_INFO: &str = "connectionInfo";

/// Field carrying the ECIES-wrapped session key in `AuthHello`.
pub(crate) const FIELD_SESSION_KEY: &str = "sessionKey";

/// Payload sealed under the handshake key inside `Hello`.
#[derive(Serialize, Deserialize)]
struct HelloData {
    /// Initiator's raw public key, hex encoded.
    #[serde(rename = "initiatorPublicKey")]
    initiator_public_key: String,
    /// Caller-supplied hello value, surfaced to the receiver on open.
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

/// What a receiver learns from a valid `Hello`.
pub(crate) struct HelloIntro {
    pub handshake_key: SymmetricKey,
    pub peer_public: PublicKey,
    pub hello_value: Option<Value>,
    pub connection_info: Option<Value>,
}

fn handshake_failed(reason: impl std::fmt::Display) -> SessionError {
    SessionError::HandshakeFailed { reason: reason.to_string() }
}

/// Build the `Hello` record (initiator side).
///
/// Consumes one IV from `enc_ivs` for the hello payload; the record framing
/// itself is cleartext.
pub(crate) fn build_hello<E: Environment>(
    env: &E,
    initiator_public: &PublicKey,
    receiver_public: &PublicKey,
    handshake_key: &SymmetricKey,
    enc_ivs: &mut IvSequence,
    hello_value: Option<&Value>,
    connection_info: Option<&Value>,
) -> Result<Bytes, SessionError> {
    let hello_data = HelloData {
        initiator_public_key: hex::encode(export_public_key(initiator_public)),
        value: hello_value.cloned(),
    };
    let Ok(hello_data_plain) = serde_json::to_vec(&hello_data) else {
        unreachable!("hello data is plain serialisable data");
    };

    let iv = enc_ivs.next().map_err(|_| SessionError::IvExhausted)?;
    let hello_data_sealed = seal(handshake_key, &iv, &hello_data_plain);

    let wrapped_key =
        ecies_seal(&mut EnvRng::new(env), handshake_key.as_bytes(), receiver_public);

    let mut message = Message::new()
        .with(FIELD_HANDSHAKE_KEY, wrapped_key)
        .with(FIELD_HELLO_DATA, hello_data_sealed);
    if let Some(info) = connection_info {
        message.insert(FIELD_CONNECTION_INFO, info.clone());
    }

    build_record(RecordType::Hello, Some(0), &message, &mut RecordCipher::Clear)
        .map_err(|e| SessionError::from_codec(e, false))
}

/// Validate a parsed `Hello` message (receiver side).
///
/// Consumes one IV from `dec_ivs` for the hello payload.
pub(crate) fn open_hello(
    our_secret: &SecretKey,
    dec_ivs: &mut IvSequence,
    message: &Message,
) -> Result<HelloIntro, SessionError> {
    let wrapped_key = message
        .get_buffer(FIELD_HANDSHAKE_KEY)
        .ok_or_else(|| handshake_failed("Hello is missing handshakeKey"))?;

    let key_bytes = ecies_open(wrapped_key, our_secret).map_err(handshake_failed)?;
    let handshake_key = SymmetricKey::from_slice(&key_bytes).map_err(handshake_failed)?;

    let hello_data_sealed = message
        .get_buffer(FIELD_HELLO_DATA)
        .ok_or_else(|| handshake_failed("Hello is missing helloData"))?;

    let iv = dec_ivs.next().map_err(|_| SessionError::IvExhausted)?;
    let hello_data_plain =
        open(&handshake_key, &iv, hello_data_sealed).map_err(handshake_failed)?;

    let hello_data: HelloData =
        serde_json::from_slice(&hello_data_plain).map_err(handshake_failed)?;

    let peer_raw = hex::decode(&hello_data.initiator_public_key).map_err(handshake_failed)?;
    let peer_public = import_public_key(&peer_raw).map_err(handshake_failed)?;

    Ok(HelloIntro {
        handshake_key,
        peer_public,
        hello_value: hello_data.value,
        connection_info: message.get_json(FIELD_CONNECTION_INFO).cloned(),
    })
}

/// Build the `AuthHello` record (receiver side), sealed under the handshake
/// key.
pub(crate) fn build_auth_hello<E: Environment>(
    env: &E,
    session_key: &SymmetricKey,
    initiator_public: &PublicKey,
    handshake_key: &SymmetricKey,
    enc_ivs: &mut IvSequence,
) -> Result<Bytes, SessionError> {
    let wrapped_key =
        ecies_seal(&mut EnvRng::new(env), session_key.as_bytes(), initiator_public);

    let message = Message::new().with(FIELD_SESSION_KEY, wrapped_key);

    let mut cipher = RecordCipher::Aes { key: handshake_key, ivs: enc_ivs };
    build_record(RecordType::AuthHello, None, &message, &mut cipher)
        .map_err(|e| SessionError::from_codec(e, false))
}

/// Recover the session key from a parsed `AuthHello` message (initiator
/// side).
pub(crate) fn open_auth_hello(
    our_secret: &SecretKey,
    message: &Message,
) -> Result<SymmetricKey, SessionError> {
    let wrapped_key = message
        .get_buffer(FIELD_SESSION_KEY)
        .ok_or_else(|| handshake_failed("AuthHello is missing sessionKey"))?;

    let key_bytes = ecies_open(wrapped_key, our_secret).map_err(handshake_failed)?;
    SymmetricKey::from_slice(&key_bytes).map_err(handshake_failed)
}
