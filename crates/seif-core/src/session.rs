//! Per-connection session state machine.
//!
//! A [`Session`] owns everything one connection needs: role, phase, the
//! handshake and session keys, both IV sequences, the incremental record
//! reader, and the count of sends awaiting acknowledgement. It performs no
//! I/O. Callers feed it transport bytes and application intents and execute
//! the [`Action`]s it returns; executing them in order preserves every
//! ordering guarantee the protocol makes.
//!
//! Records sealed by this session draw IVs from `enc_ivs`, records from the
//! peer consume `dec_ivs`. The initiator seals under fixed field 0 and
//! opens under 1; the receiver is mirrored. Both sequences persist across
//! the handshake-key to session-key transition, which keeps (key, IV) pairs
//! unique without coordination.

use bytes::Bytes;
use seif_crypto::{
    export_public_key, import_public_key, IvSequence, Keypair, PublicKey, SymmetricKey,
};
use seif_proto::{
    build_record, Message, RecordCipher, RecordIdentifier, RecordReader, RecordType,
};
use serde_json::Value;

use crate::{
    env::{EnvRng, Environment},
    error::SessionError,
    handshake,
};

/// The protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u8 = 0;

/// Fixed field tagging records sealed by the connection's initiator.
const FIXED_INITIATOR: u8 = 0;

/// Fixed field tagging records sealed by the connection's receiver.
const FIXED_RECEIVER: u8 = 1;

/// Redirect payload field ids.
const FIELD_ADDRESS: &str = "address";
const FIELD_PUBLIC_KEY: &str = "publicKey";
const FIELD_PERMANENT: &str = "permanent";
const FIELD_REDIRECT_CONTEXT: &str = "redirectContext";

/// Which end of the connection this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The dialing peer; sends `Hello`, follows redirects.
    Initiator,
    /// The listening peer; answers with `AuthHello`, may redirect.
    Receiver,
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Receiver waiting for the initiator's `Hello`.
    AwaitingHello,
    /// Initiator waiting for the receiver's `AuthHello`.
    AwaitingAuthHello,
    /// Handshake complete; application records flow.
    Open,
    /// Terminal. No event produces further actions.
    Closed,
}

/// What the handshake established, surfaced when a session opens.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerIntro {
    /// The peer's raw 133-byte public key.
    pub peer_public_key: Vec<u8>,
    /// Hello value announced by the initiator (receiver side only).
    pub hello_value: Option<Value>,
    /// Cleartext connection info from the `Hello` (receiver side only).
    pub connection_info: Option<Value>,
}

/// A redirect target: where the initiator should reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectNotice {
    /// Transport address of the new peer.
    pub address: String,
    /// Raw 133-byte public key of the new peer.
    pub public_key: Vec<u8>,
    /// Whether the caller should durably update its peer directory.
    pub permanent: bool,
    /// Context forwarded as the new connection's `connectionInfo`.
    pub context: Option<Value>,
}

/// Work a session hands back to its driver.
///
/// Actions must be executed in order: `Transmit` bytes commit to the wire
/// in the order produced, and acknowledgement resolution is FIFO.
#[derive(Debug, PartialEq)]
pub enum Action {
    /// Write these bytes to the transport.
    Transmit(Bytes),
    /// The handshake completed; notify the caller the connection is open.
    Open(PeerIntro),
    /// Deliver an application message to the caller.
    Deliver(Message),
    /// Resolve the oldest outstanding send.
    AckConfirmed,
    /// The peer redirected us: tear this connection down and reconnect.
    FollowRedirect(RedirectNotice),
}

/// The per-connection protocol engine.
///
/// See the [module docs](self) for the driving contract.
pub struct Session<E: Environment> {
    env: E,
    role: Role,
    phase: Phase,
    keypair: Keypair,
    peer_public: Option<PublicKey>,
    handshake_key: Option<SymmetricKey>,
    session_key: Option<SymmetricKey>,
    enc_ivs: IvSequence,
    dec_ivs: IvSequence,
    reader: RecordReader,
    outstanding_sends: u64,
}

impl<E: Environment> Session<E> {
    /// Create an initiator session and its opening `Hello`.
    ///
    /// The returned actions carry the `Hello` bytes; the session is left in
    /// [`Phase::AwaitingAuthHello`].
    ///
    /// # Errors
    ///
    /// - `SessionError::IvExhausted` cannot realistically occur here but is
    ///   propagated from the sealing path
    pub fn initiate(
        env: E,
        keypair: Keypair,
        receiver_public: PublicKey,
        hello_value: Option<&Value>,
        connection_info: Option<&Value>,
    ) -> Result<(Self, Vec<Action>), SessionError> {
        let mut enc_ivs = IvSequence::new(FIXED_INITIATOR);
        let handshake_key = SymmetricKey::generate(&mut EnvRng::new(&env));

        let hello = handshake::build_hello(
            &env,
            keypair.public(),
            &receiver_public,
            &handshake_key,
            &mut enc_ivs,
            hello_value,
            connection_info,
        )?;

        let session = Self {
            env,
            role: Role::Initiator,
            phase: Phase::AwaitingAuthHello,
            keypair,
            peer_public: Some(receiver_public),
            handshake_key: Some(handshake_key),
            session_key: None,
            enc_ivs,
            dec_ivs: IvSequence::new(FIXED_RECEIVER),
            reader: RecordReader::new(),
            outstanding_sends: 0,
        };

        Ok((session, vec![Action::Transmit(hello)]))
    }

    /// Create a receiver session, waiting for a `Hello`.
    pub fn accept(env: E, keypair: Keypair) -> Self {
        Self {
            env,
            role: Role::Receiver,
            phase: Phase::AwaitingHello,
            keypair,
            peer_public: None,
            handshake_key: None,
            session_key: None,
            enc_ivs: IvSequence::new(FIXED_RECEIVER),
            dec_ivs: IvSequence::new(FIXED_INITIATOR),
            reader: RecordReader::new(),
            outstanding_sends: 0,
        }
    }

    /// This session's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The peer's raw public key, once known.
    #[must_use]
    pub fn peer_public_key(&self) -> Option<Vec<u8>> {
        self.peer_public.as_ref().map(|key| export_public_key(key).to_vec())
    }

    /// Sends awaiting acknowledgement.
    #[must_use]
    pub fn outstanding_sends(&self) -> u64 {
        self.outstanding_sends
    }

    /// Reduce both IV counter bounds.
    ///
    /// Support hook for exercising [`SessionError::IvExhausted`] without
    /// 2^53 records; production sessions keep the default bound.
    pub fn limit_ivs(&mut self, limit: u64) {
        self.enc_ivs.set_limit(limit);
        self.dec_ivs.set_limit(limit);
    }

    /// Feed a chunk of transport bytes and drain every completed record.
    ///
    /// Returns the actions for all records completed by this chunk, in wire
    /// order. A closed session swallows chunks silently.
    ///
    /// # Errors
    ///
    /// Any error is fatal and leaves the session [`Phase::Closed`]; the
    /// driver routes it to teardown. See [`SessionError`] for the kinds.
    pub fn handle_bytes(&mut self, chunk: &[u8]) -> Result<Vec<Action>, SessionError> {
        if self.phase == Phase::Closed {
            return Ok(Vec::new());
        }

        self.reader.extend(chunk);

        let mut actions = Vec::new();
        while self.phase != Phase::Closed {
            let open = self.phase == Phase::Open;

            // Key selection is per record: the phase can only change at a
            // record boundary, so buffered records behind a phase change are
            // opened under the newly adopted key.
            let parsed = {
                let key = match self.phase {
                    Phase::AwaitingHello => None,
                    Phase::AwaitingAuthHello => self.handshake_key.as_ref(),
                    Phase::Open => self.session_key.as_ref(),
                    Phase::Closed => unreachable!("loop guard"),
                };

                let mut cipher = match key {
                    None => RecordCipher::Clear,
                    Some(key) => RecordCipher::Aes { key, ivs: &mut self.dec_ivs },
                };

                self.reader.next_record(&mut cipher)
            };

            let (identifier, message) = match parsed {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => return Err(self.fail(SessionError::from_codec(e, open))),
            };

            match self.dispatch(identifier, message) {
                Ok(mut produced) => actions.append(&mut produced),
                Err(e) => return Err(self.fail(e)),
            }
        }

        Ok(actions)
    }

    /// Seal and queue an application message that expects acknowledgement.
    ///
    /// The driver pairs the transmit with a waiter; the matching
    /// [`Action::AckConfirmed`] resolves waiters FIFO.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` if the session is not open (survivable)
    /// - `SessionError::IdentifierTooBig` for oversized messages (survivable)
    /// - `SessionError::IvExhausted` (fatal)
    pub fn send(&mut self, message: &Message) -> Result<Vec<Action>, SessionError> {
        let record = self.seal_record("send", RecordType::Send, message)?;
        self.outstanding_sends += 1;
        Ok(vec![Action::Transmit(record)])
    }

    /// Seal and queue a fire-and-forget application message.
    ///
    /// # Errors
    ///
    /// As [`Session::send`].
    pub fn status_send(&mut self, message: &Message) -> Result<Vec<Action>, SessionError> {
        let record = self.seal_record("status_send", RecordType::StatusSend, message)?;
        Ok(vec![Action::Transmit(record)])
    }

    /// Seal a `Redirect` instructing the initiator to reconnect elsewhere.
    ///
    /// Receiver role only. The receiving session stays open; the peer is
    /// expected to drop the transport once it has processed the redirect.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidState` at an initiator, or before open
    /// - `SessionError::InvalidRedirect` if the target key is not a valid
    ///   P-521 point
    pub fn redirect(&mut self, notice: &RedirectNotice) -> Result<Vec<Action>, SessionError> {
        if self.role != Role::Receiver {
            return Err(SessionError::InvalidState { operation: "redirect", phase: self.phase });
        }

        import_public_key(&notice.public_key)
            .map_err(|e| SessionError::InvalidRedirect { reason: e.to_string() })?;

        let mut message = Message::new()
            .with(FIELD_ADDRESS, Value::from(notice.address.clone()))
            .with(FIELD_PUBLIC_KEY, Value::from(hex::encode(&notice.public_key)))
            .with(FIELD_PERMANENT, Value::from(notice.permanent));
        if let Some(context) = &notice.context {
            message.insert(FIELD_REDIRECT_CONTEXT, context.clone());
        }

        let record = self.seal_record("redirect", RecordType::Redirect, &message)?;
        Ok(vec![Action::Transmit(record)])
    }

    /// Enter the terminal phase. Idempotent; subsequent events are inert.
    pub fn close(&mut self) {
        self.phase = Phase::Closed;
    }

    /// Mark the session failed, closing it when the error is fatal.
    fn fail(&mut self, error: SessionError) -> SessionError {
        if error.is_fatal() {
            self.phase = Phase::Closed;
        }
        error
    }

    /// Seal one outbound record under the session key.
    fn seal_record(
        &mut self,
        operation: &'static str,
        record_type: RecordType,
        message: &Message,
    ) -> Result<Bytes, SessionError> {
        if self.phase != Phase::Open {
            return Err(SessionError::InvalidState { operation, phase: self.phase });
        }

        let result = {
            let Some(key) = self.session_key.as_ref() else {
                unreachable!("open session always holds a session key");
            };

            let mut cipher = RecordCipher::Aes { key, ivs: &mut self.enc_ivs };
            build_record(record_type, None, message, &mut cipher)
        };

        result.map_err(|e| {
            let e = SessionError::from_codec(e, true);
            self.fail(e)
        })
    }

    /// Route one parsed record by (phase, type).
    fn dispatch(
        &mut self,
        identifier: RecordIdentifier,
        message: Message,
    ) -> Result<Vec<Action>, SessionError> {
        match (self.phase, identifier.record_type) {
            (Phase::AwaitingHello, RecordType::Hello) => self.handle_hello(&identifier, &message),

            (Phase::AwaitingAuthHello, RecordType::AuthHello) => self.handle_auth_hello(&message),

            (Phase::Open, RecordType::StatusSend) => Ok(vec![Action::Deliver(message)]),

            (Phase::Open, RecordType::Send) => {
                // The acknowledgement is queued before delivery so it cannot
                // be reordered behind anything the handler itself sends.
                let ack = self.seal_record("acknowledge", RecordType::Acknowledge, &Message::new())?;
                Ok(vec![Action::Transmit(ack), Action::Deliver(message)])
            },

            (Phase::Open, RecordType::Acknowledge) => {
                if self.outstanding_sends == 0 {
                    return Err(SessionError::UnexpectedAcknowledgement);
                }
                self.outstanding_sends -= 1;
                Ok(vec![Action::AckConfirmed])
            },

            (Phase::Open, RecordType::Redirect) => self.handle_redirect(&message),

            (phase, record_type) => Err(SessionError::UnexpectedRecord { record_type, phase }),
        }
    }

    /// Receiver side: validate the `Hello`, answer with `AuthHello`, open.
    fn handle_hello(
        &mut self,
        identifier: &RecordIdentifier,
        message: &Message,
    ) -> Result<Vec<Action>, SessionError> {
        match identifier.version {
            Some(PROTOCOL_VERSION) => {},
            Some(version) => return Err(SessionError::UnsupportedVersion(version)),
            None => {
                return Err(SessionError::HandshakeFailed {
                    reason: "Hello is missing its version".to_string(),
                });
            },
        }

        let intro = handshake::open_hello(self.keypair.secret(), &mut self.dec_ivs, message)?;

        let session_key = SymmetricKey::generate(&mut EnvRng::new(&self.env));
        let auth_hello = handshake::build_auth_hello(
            &self.env,
            &session_key,
            &intro.peer_public,
            &intro.handshake_key,
            &mut self.enc_ivs,
        )?;

        let peer_public_key = export_public_key(&intro.peer_public).to_vec();

        self.peer_public = Some(intro.peer_public);
        self.session_key = Some(session_key);
        // The handshake key is done for good; dropping it zeroizes it.
        self.handshake_key = None;
        self.phase = Phase::Open;

        Ok(vec![
            Action::Transmit(auth_hello),
            Action::Open(PeerIntro {
                peer_public_key,
                hello_value: intro.hello_value,
                connection_info: intro.connection_info,
            }),
        ])
    }

    /// Initiator side: adopt the session key from the `AuthHello`, open.
    fn handle_auth_hello(&mut self, message: &Message) -> Result<Vec<Action>, SessionError> {
        let session_key = handshake::open_auth_hello(self.keypair.secret(), message)?;

        self.session_key = Some(session_key);
        self.handshake_key = None;
        self.phase = Phase::Open;

        let Some(peer_public) = self.peer_public.as_ref() else {
            unreachable!("an initiator knows its peer from construction");
        };

        Ok(vec![Action::Open(PeerIntro {
            peer_public_key: export_public_key(peer_public).to_vec(),
            hello_value: None,
            connection_info: None,
        })])
    }

    /// Initiator side: accept a `Redirect` and close.
    ///
    /// Redirects are not negotiated; a receiver that is sent one treats it
    /// as a protocol violation instead.
    fn handle_redirect(&mut self, message: &Message) -> Result<Vec<Action>, SessionError> {
        if self.role == Role::Receiver {
            return Err(SessionError::UnexpectedRecord {
                record_type: RecordType::Redirect,
                phase: self.phase,
            });
        }

        let malformed = |reason: String| SessionError::MalformedRecord { reason };

        let address = message
            .get_json(FIELD_ADDRESS)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("Redirect is missing its address".to_string()))?
            .to_string();

        let key_hex = message
            .get_json(FIELD_PUBLIC_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("Redirect is missing its publicKey".to_string()))?;
        let public_key = hex::decode(key_hex)
            .map_err(|e| malformed(format!("Redirect publicKey is not hex: {e}")))?;
        import_public_key(&public_key)
            .map_err(|e| malformed(format!("Redirect publicKey is invalid: {e}")))?;

        let permanent = message
            .get_json(FIELD_PERMANENT)
            .and_then(Value::as_bool)
            .ok_or_else(|| malformed("Redirect is missing its permanent flag".to_string()))?;

        let context = message.get_json(FIELD_REDIRECT_CONTEXT).cloned();

        self.phase = Phase::Closed;

        Ok(vec![Action::FollowRedirect(RedirectNotice {
            address,
            public_key,
            permanent,
            context,
        })])
    }
}

#[cfg(test)]
mod tests {
    use seif_proto::{BlobKind, CodecError};
    use serde_json::json;

    use super::*;
    use crate::env::OsEnvironment;

    fn keypair() -> Keypair {
        Keypair::generate(&mut EnvRng::new(&OsEnvironment))
    }

    /// Bytes of every Transmit action, concatenated in order.
    fn wire_bytes(actions: &[Action]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for action in actions {
            if let Action::Transmit(chunk) = action {
                bytes.extend_from_slice(chunk);
            }
        }
        bytes
    }

    fn open_intro(actions: &[Action]) -> Option<&PeerIntro> {
        actions.iter().find_map(|action| match action {
            Action::Open(intro) => Some(intro),
            _ => None,
        })
    }

    /// Drive a full handshake, returning both open sessions.
    fn open_pair() -> (Session<OsEnvironment>, Session<OsEnvironment>) {
        let initiator_keys = keypair();
        let receiver_keys = keypair();

        let (mut initiator, hello_actions) = Session::initiate(
            OsEnvironment,
            initiator_keys,
            receiver_keys.public().clone(),
            Some(&json!({"client": "test"})),
            None,
        )
        .unwrap();

        let mut receiver = Session::accept(OsEnvironment, receiver_keys);

        let receiver_actions = receiver.handle_bytes(&wire_bytes(&hello_actions)).unwrap();
        let initiator_actions = initiator.handle_bytes(&wire_bytes(&receiver_actions)).unwrap();

        assert_eq!(receiver.phase(), Phase::Open);
        assert_eq!(initiator.phase(), Phase::Open);
        assert!(open_intro(&initiator_actions).is_some());

        (initiator, receiver)
    }

    #[test]
    fn handshake_opens_both_sides() {
        let initiator_keys = keypair();
        let receiver_keys = keypair();
        let initiator_raw = initiator_keys.public_raw().to_vec();
        let receiver_raw = receiver_keys.public_raw().to_vec();

        let (mut initiator, hello_actions) = Session::initiate(
            OsEnvironment,
            initiator_keys,
            receiver_keys.public().clone(),
            Some(&json!("greetings")),
            Some(&json!({"via": "test"})),
        )
        .unwrap();

        assert_eq!(initiator.phase(), Phase::AwaitingAuthHello);

        let mut receiver = Session::accept(OsEnvironment, receiver_keys);
        let receiver_actions = receiver.handle_bytes(&wire_bytes(&hello_actions)).unwrap();

        let receiver_intro = open_intro(&receiver_actions).expect("receiver opens");
        assert_eq!(receiver_intro.peer_public_key, initiator_raw);
        assert_eq!(receiver_intro.hello_value, Some(json!("greetings")));
        assert_eq!(receiver_intro.connection_info, Some(json!({"via": "test"})));

        let initiator_actions = initiator.handle_bytes(&wire_bytes(&receiver_actions)).unwrap();
        let initiator_intro = open_intro(&initiator_actions).expect("initiator opens");
        assert_eq!(initiator_intro.peer_public_key, receiver_raw);

        assert_eq!(initiator.phase(), Phase::Open);
        assert_eq!(receiver.phase(), Phase::Open);
    }

    #[test]
    fn status_send_delivers_without_ack() {
        let (mut initiator, mut receiver) = open_pair();

        let message = Message::new().with("n", json!(0));
        let actions = initiator.status_send(&message).unwrap();

        let receiver_actions = receiver.handle_bytes(&wire_bytes(&actions)).unwrap();
        assert_eq!(receiver_actions.len(), 1);
        assert!(matches!(&receiver_actions[0], Action::Deliver(delivered) if *delivered == message));

        // The reply flows the other way just as well.
        let reply = Message::new().with("n", json!(1));
        let reply_actions = receiver.status_send(&reply).unwrap();
        let initiator_actions = initiator.handle_bytes(&wire_bytes(&reply_actions)).unwrap();
        assert!(matches!(&initiator_actions[0], Action::Deliver(delivered) if *delivered == reply));
    }

    #[test]
    fn send_is_acknowledged_fifo() {
        let (mut initiator, mut receiver) = open_pair();

        let first = Message::new().with("k", json!("v"));
        let second = Message::new().with("k2", json!("v2"));

        let mut outbound = Vec::new();
        outbound.extend_from_slice(&wire_bytes(&initiator.send(&first).unwrap()));
        outbound.extend_from_slice(&wire_bytes(&initiator.send(&second).unwrap()));
        assert_eq!(initiator.outstanding_sends(), 2);

        let receiver_actions = receiver.handle_bytes(&outbound).unwrap();

        // Each Send produced exactly one Acknowledge and one delivery, acks
        // ahead of their deliveries.
        let kinds: Vec<&str> = receiver_actions
            .iter()
            .map(|a| match a {
                Action::Transmit(_) => "transmit",
                Action::Deliver(_) => "deliver",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, ["transmit", "deliver", "transmit", "deliver"]);

        let initiator_actions = initiator.handle_bytes(&wire_bytes(&receiver_actions)).unwrap();
        let confirmations = initiator_actions
            .iter()
            .filter(|a| matches!(a, Action::AckConfirmed))
            .count();
        assert_eq!(confirmations, 2);
        assert_eq!(initiator.outstanding_sends(), 0);
    }

    #[test]
    fn binary_payload_survives() {
        let (mut initiator, mut receiver) = open_pair();

        let message = Message::new()
            .with("buf", bytes::Bytes::from_static(&[3, 4, 5]))
            .with("n", json!(7));

        let actions = initiator.send(&message).unwrap();
        let receiver_actions = receiver.handle_bytes(&wire_bytes(&actions)).unwrap();

        let delivered = receiver_actions
            .iter()
            .find_map(|a| match a {
                Action::Deliver(m) => Some(m),
                _ => None,
            })
            .expect("message delivered");

        assert_eq!(delivered.get_buffer("buf").map(|b| b.as_ref()), Some(&[3u8, 4, 5][..]));
        assert_eq!(delivered.get_json("n"), Some(&json!(7)));
    }

    #[test]
    fn unexpected_acknowledge_is_fatal() {
        let (mut initiator, mut receiver) = open_pair();

        // A hand-rolled Acknowledge with nothing outstanding on the other
        // side.
        let rogue_ack = receiver
            .seal_record("acknowledge", RecordType::Acknowledge, &Message::new())
            .unwrap();

        let result = initiator.handle_bytes(&rogue_ack);
        assert_eq!(result, Err(SessionError::UnexpectedAcknowledgement));
        assert_eq!(initiator.phase(), Phase::Closed);
    }

    #[test]
    fn redirect_reaches_initiator_and_closes_it() {
        let (mut initiator, mut receiver) = open_pair();

        let target = keypair();
        let notice = RedirectNotice {
            address: "peer-c".to_string(),
            public_key: target.public_raw().to_vec(),
            permanent: true,
            context: Some(json!({"why": "moved"})),
        };

        let actions = receiver.redirect(&notice).unwrap();
        assert_eq!(receiver.phase(), Phase::Open);

        let initiator_actions = initiator.handle_bytes(&wire_bytes(&actions)).unwrap();
        assert_eq!(initiator_actions.len(), 1);
        match &initiator_actions[0] {
            Action::FollowRedirect(followed) => assert_eq!(followed, &notice),
            other => panic!("expected FollowRedirect, got {other:?}"),
        }

        assert_eq!(initiator.phase(), Phase::Closed);
        assert!(initiator.handle_bytes(b"trailing noise").unwrap().is_empty());
    }

    #[test]
    fn redirect_from_initiator_is_a_violation() {
        let (mut initiator, mut receiver) = open_pair();

        // The public API refuses outright.
        let notice = RedirectNotice {
            address: "x".to_string(),
            public_key: keypair().public_raw().to_vec(),
            permanent: false,
            context: None,
        };
        assert!(matches!(
            initiator.redirect(&notice),
            Err(SessionError::InvalidState { operation: "redirect", .. })
        ));

        // A Redirect record arriving at a receiver is fatal.
        let mut message = Message::new()
            .with(FIELD_ADDRESS, Value::from("x"))
            .with(FIELD_PUBLIC_KEY, Value::from(hex::encode(notice.public_key)))
            .with(FIELD_PERMANENT, Value::from(false));
        message.insert(FIELD_REDIRECT_CONTEXT, json!(null));

        let rogue = initiator.seal_record("redirect", RecordType::Redirect, &message).unwrap();
        let result = receiver.handle_bytes(&rogue);
        assert_eq!(
            result,
            Err(SessionError::UnexpectedRecord {
                record_type: RecordType::Redirect,
                phase: Phase::Open,
            })
        );
        assert_eq!(receiver.phase(), Phase::Closed);
    }

    #[test]
    fn wrong_receiver_key_never_opens() {
        let initiator_keys = keypair();
        let expected_receiver = keypair();
        let actual_receiver = keypair();

        let (initiator, hello_actions) = Session::initiate(
            OsEnvironment,
            initiator_keys,
            expected_receiver.public().clone(),
            None,
            None,
        )
        .unwrap();

        // The listening peer holds a different private key than the one the
        // initiator encrypted the handshake key for.
        let mut receiver = Session::accept(OsEnvironment, actual_receiver);
        let result = receiver.handle_bytes(&wire_bytes(&hello_actions));

        assert!(matches!(result, Err(SessionError::HandshakeFailed { .. })));
        assert_eq!(receiver.phase(), Phase::Closed);
        assert_eq!(initiator.phase(), Phase::AwaitingAuthHello);
    }

    #[test]
    fn hello_with_wrong_version_is_rejected() {
        let receiver_keys = keypair();
        let mut receiver = Session::accept(OsEnvironment, receiver_keys);

        let message = Message::new().with("handshakeKey", bytes::Bytes::from_static(b"junk"));
        let wire = build_record(
            RecordType::Hello,
            Some(1),
            &message,
            &mut RecordCipher::Clear,
        )
        .unwrap();

        let result = receiver.handle_bytes(&wire);
        assert_eq!(result, Err(SessionError::UnsupportedVersion(1)));
        assert_eq!(receiver.phase(), Phase::Closed);
    }

    #[test]
    fn tampered_record_after_open_is_auth_failure() {
        let (mut initiator, mut receiver) = open_pair();

        let actions = initiator.send(&Message::new().with("k", json!("v"))).unwrap();
        let mut wire = wire_bytes(&actions);
        wire[2] ^= 0x01;

        let result = receiver.handle_bytes(&wire);
        assert_eq!(result, Err(SessionError::AuthFailed));
        assert_eq!(receiver.phase(), Phase::Closed);
    }

    #[test]
    fn unknown_record_type_is_fatal() {
        let (initiator, mut receiver) = open_pair();

        // Seal a record claiming an unknown type, using the initiator's own
        // sealing state so it authenticates.
        let key = initiator.session_key.clone().expect("open");
        let mut ivs = initiator.enc_ivs.clone();
        let mut cipher = RecordCipher::Aes { key: &key, ivs: &mut ivs };

        let identifier_json = br#"{"type":"Gossip","blobs":[]}"#;
        let sealed = cipher.seal(identifier_json).unwrap();

        let mut wire = Vec::new();
        wire.extend_from_slice(&(sealed.len() as u16).to_be_bytes());
        wire.extend_from_slice(&sealed);

        let result = receiver.handle_bytes(&wire);
        assert_eq!(result, Err(SessionError::UnknownRecordType { found: "Gossip".to_string() }));
    }

    #[test]
    fn iv_exhaustion_closes_the_session() {
        let (mut initiator, _receiver) = open_pair();

        // Cap low enough that the next few sends run the counter out. Each
        // Send costs two IVs (identifier + one blob).
        let already = 5; // IVs the handshake consumed are irrelevant; cap from now
        initiator.limit_ivs(already);

        let message = Message::new().with("n", json!(1));
        let mut last = Ok(Vec::new());
        for _ in 0..4 {
            last = initiator.send(&message);
            if last.is_err() {
                break;
            }
        }

        assert_eq!(last.unwrap_err(), SessionError::IvExhausted);
        assert_eq!(initiator.phase(), Phase::Closed);
    }

    #[test]
    fn oversized_identifier_fails_without_closing() {
        let (mut initiator, _receiver) = open_pair();

        let message = Message::new().with("x".repeat(70_000), json!(1));
        let result = initiator.send(&message);

        assert!(matches!(result, Err(SessionError::IdentifierTooBig { .. })));
        assert_eq!(initiator.phase(), Phase::Open);
        assert_eq!(initiator.outstanding_sends(), 0);

        // The session still works.
        let actions = initiator.send(&Message::new().with("ok", json!(true))).unwrap();
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn closed_session_is_inert() {
        let (mut initiator, _receiver) = open_pair();

        initiator.close();
        assert_eq!(initiator.phase(), Phase::Closed);

        assert!(initiator.handle_bytes(b"anything").unwrap().is_empty());
        assert!(matches!(
            initiator.send(&Message::new()),
            Err(SessionError::InvalidState { operation: "send", .. })
        ));

        // close is idempotent.
        initiator.close();
        assert_eq!(initiator.phase(), Phase::Closed);
    }

    #[test]
    fn records_split_across_chunks_are_reassembled() {
        let (mut initiator, mut receiver) = open_pair();

        let message = Message::new().with("n", json!(42));
        let wire = wire_bytes(&initiator.status_send(&message).unwrap());

        let (head, tail) = wire.split_at(wire.len() / 2);
        assert!(receiver.handle_bytes(head).unwrap().is_empty());

        let actions = receiver.handle_bytes(tail).unwrap();
        assert!(matches!(&actions[0], Action::Deliver(delivered) if *delivered == message));
    }

    #[test]
    fn blob_kinds_recorded_in_identifier() {
        // Guards the identifier contract: JSON fields are typed JSON and
        // buffers Buffer, in insertion order.
        let message = Message::new()
            .with("a", json!({"deep": [1, 2]}))
            .with("b", bytes::Bytes::from_static(b"raw"));

        let wire =
            build_record(RecordType::Send, None, &message, &mut RecordCipher::Clear).unwrap();
        let identifier_len = u16::from_be_bytes([wire[0], wire[1]]) as usize;
        let identifier = RecordIdentifier::from_json(&wire[2..2 + identifier_len]).unwrap();

        assert_eq!(identifier.blobs[0].kind, BlobKind::Json);
        assert_eq!(identifier.blobs[1].kind, BlobKind::Buffer);
    }

    #[test]
    fn codec_errors_map_to_unknown_type() {
        let err = CodecError::UnknownRecordType { found: "Nope".to_string() };
        assert_eq!(
            SessionError::from_codec(err, true),
            SessionError::UnknownRecordType { found: "Nope".to_string() }
        );
    }
}
