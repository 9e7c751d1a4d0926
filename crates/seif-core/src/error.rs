//! Error and close-reason types for the session core.
//!
//! Every failure a session can suffer is a [`SessionError`]; every way a
//! session can end is a [`CloseReason`]. Drivers route errors through their
//! teardown path exactly once, so each variant here reaches the caller's
//! `on_close` at most once.

use seif_crypto::CryptoError;
use seif_proto::{CodecError, RecordType};
use thiserror::Error;

use crate::session::Phase;

/// Fatal (and one synchronous) failures of a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The transport reported a failure.
    #[error("transport failed: {reason}")]
    TransportFailed {
        /// Reason reported by the transport.
        reason: String,
    },

    /// A cryptographic or structural failure before the session opened.
    #[error("handshake failed: {reason}")]
    HandshakeFailed {
        /// Failure detail.
        reason: String,
    },

    /// The peer's Hello carried a version other than 0.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// A record failed AES-GCM authentication after the session opened.
    #[error("record authentication failed")]
    AuthFailed,

    /// The peer sent a record type this implementation does not know.
    #[error("unknown record type {found:?}")]
    UnknownRecordType {
        /// The type string found on the wire.
        found: String,
    },

    /// The peer sent a record that is illegal for the current phase or role.
    #[error("unexpected {record_type} record in phase {phase:?}")]
    UnexpectedRecord {
        /// The offending record type.
        record_type: RecordType,
        /// Phase the session was in.
        phase: Phase,
    },

    /// An Acknowledge arrived with no outstanding Send to match it.
    #[error("unexpected acknowledgement: no outstanding send")]
    UnexpectedAcknowledgement,

    /// A record parsed but its payload was not the shape its type requires.
    #[error("malformed record: {reason}")]
    MalformedRecord {
        /// Failure detail.
        reason: String,
    },

    /// An operation was invoked in a phase or role that forbids it.
    #[error("cannot {operation} in phase {phase:?}")]
    InvalidState {
        /// The operation attempted.
        operation: &'static str,
        /// Phase the session was in.
        phase: Phase,
    },

    /// A redirect target could not be used.
    #[error("invalid redirect target: {reason}")]
    InvalidRedirect {
        /// What was wrong with the target.
        reason: String,
    },

    /// The serialised record identifier exceeded 65535 bytes.
    ///
    /// Unlike the other variants this is a synchronous build failure: the
    /// offending send fails but the session survives.
    #[error("record identifier too big: {size} bytes")]
    IdentifierTooBig {
        /// Size the identifier reached.
        size: usize,
    },

    /// The IV counter reached its safe bound.
    #[error("IV counter exhausted")]
    IvExhausted,
}

impl SessionError {
    /// Whether this error leaves the session usable.
    ///
    /// [`SessionError::IdentifierTooBig`] rejects a single oversized send
    /// without poisoning connection state, and the local-misuse variants
    /// ([`SessionError::InvalidState`], [`SessionError::InvalidRedirect`])
    /// fail only the offending call. Everything else tears the session down.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::IdentifierTooBig { .. } | Self::InvalidState { .. } | Self::InvalidRedirect { .. }
        )
    }

    /// Fold a codec error into a session error, given whether the session
    /// had completed its handshake when the error occurred.
    pub(crate) fn from_codec(err: CodecError, open: bool) -> Self {
        match err {
            CodecError::IdentifierTooBig { size, .. } => Self::IdentifierTooBig { size },
            CodecError::UnknownRecordType { found } => Self::UnknownRecordType { found },
            CodecError::Crypto(CryptoError::IvExhausted) => Self::IvExhausted,
            CodecError::Crypto(CryptoError::AuthFailed) if open => Self::AuthFailed,
            CodecError::MalformedIdentifier { reason } | CodecError::MalformedBlob { reason, .. }
                if open =>
            {
                Self::MalformedRecord { reason }
            },
            // Anything else before the handshake completes is a handshake
            // failure, including authentication errors.
            other => Self::HandshakeFailed { reason: other.to_string() },
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The local caller closed the connection.
    Local {
        /// Caller-supplied reason, if any.
        reason: Option<String>,
    },

    /// The peer closed the transport in an orderly fashion.
    Remote,

    /// The peer redirected this connection elsewhere.
    Redirected,

    /// The session failed.
    Failed(SessionError),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { reason: Some(reason) } => write!(f, "closed locally: {reason}"),
            Self::Local { reason: None } => f.write_str("closed locally"),
            Self::Remote => f.write_str("closed by peer"),
            Self::Redirected => f.write_str("redirected"),
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split() {
        assert!(!SessionError::IdentifierTooBig { size: 70_000 }.is_fatal());
        assert!(!SessionError::InvalidState { operation: "send", phase: Phase::Closed }.is_fatal());
        assert!(!SessionError::InvalidRedirect { reason: "bad key".to_string() }.is_fatal());

        assert!(SessionError::AuthFailed.is_fatal());
        assert!(SessionError::IvExhausted.is_fatal());
        assert!(SessionError::UnexpectedAcknowledgement.is_fatal());
        assert!(SessionError::UnsupportedVersion(3).is_fatal());
    }

    #[test]
    fn auth_failure_maps_by_phase() {
        let err = CodecError::Crypto(CryptoError::AuthFailed);
        assert_eq!(SessionError::from_codec(err.clone(), true), SessionError::AuthFailed);
        assert!(matches!(
            SessionError::from_codec(err, false),
            SessionError::HandshakeFailed { .. }
        ));
    }

    #[test]
    fn close_reason_display() {
        assert_eq!(CloseReason::Redirected.to_string(), "redirected");
        assert_eq!(
            CloseReason::Local { reason: Some("done".to_string()) }.to_string(),
            "closed locally: done"
        );
    }
}
