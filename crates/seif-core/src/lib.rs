//! Seif Protocol Core
//!
//! Pure, sans-IO implementation of the Seif session protocol version 0: the
//! two-record authenticated handshake and the per-connection state machine
//! that frames, seals, and dispatches application records.
//!
//! # Architecture
//!
//! The core follows the action pattern: callers feed events into a
//! [`Session`] (transport bytes, application sends, local close) and execute
//! the returned [`Action`]s (transmit bytes, deliver a message, resolve an
//! acknowledgement, follow a redirect). The session performs no I/O and
//! draws randomness only through the [`env::Environment`] abstraction, so
//! every protocol path is reproducible in tests with seeded entropy.
//!
//! # State Machine
//!
//! ```text
//! initiator:                         receiver:
//!   (created) ── send Hello            (created)
//!       │                                  │
//! [AwaitingAuthHello]                [AwaitingHello]
//!       │ recv AuthHello                   │ recv Hello, send AuthHello
//!       ▼                                  ▼
//!     [Open]                             [Open]
//!       │ Send / StatusSend / Acknowledge / Redirect
//!       ▼                                  ▼
//!    [Closed]                           [Closed]
//! ```
//!
//! `Closed` is terminal: a closed session returns no further actions for
//! any event. Concurrency is the caller's concern; a session expects to be
//! driven from a single task, the way `seif-session` drives it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
mod error;
mod handshake;
mod session;

pub use error::{CloseReason, SessionError};
pub use session::{
    Action, PeerIntro, Phase, RedirectNotice, Role, Session, PROTOCOL_VERSION,
};
