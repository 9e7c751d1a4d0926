//! Connection handles exposed to callers.
//!
//! A [`Peer`] is a cheap clonable handle onto a connection's command
//! channel. Commands are enqueued without blocking, so handles are safe to
//! use from inside event callbacks; the connection task applies them in
//! order between transport events.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use seif_core::{CloseReason, RedirectNotice, Role, SessionError};
use seif_proto::Message;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::EngineError;

/// Commands a handle enqueues onto its connection task.
pub(crate) enum Command {
    /// Send with acknowledgement tracking.
    Send {
        /// The message to transmit.
        message: Message,
        /// Resolves on the matching acknowledgement or teardown.
        ticket: oneshot::Sender<Result<(), CloseReason>>,
    },
    /// Fire-and-forget send.
    StatusSend {
        /// The message to transmit.
        message: Message,
    },
    /// Redirect the connected initiator elsewhere (receiver role).
    Redirect {
        /// Where to send the peer.
        notice: RedirectNotice,
    },
    /// Close the connection locally.
    Close {
        /// Optional reason; surfaced to waiters, not to callbacks.
        reason: Option<String>,
    },
}

/// Teardown reason used when a command cannot reach its session task.
fn session_gone() -> CloseReason {
    CloseReason::Failed(SessionError::TransportFailed {
        reason: "session task is gone".to_string(),
    })
}

/// Handle onto one live connection.
#[derive(Clone)]
pub struct Peer {
    role: Role,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer").field("role", &self.role).finish_non_exhaustive()
    }
}

impl Peer {
    pub(crate) fn new(role: Role, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { role, commands }
    }

    /// Which end of the connection this handle belongs to.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Send a message, returning a ticket that resolves when the peer
    /// acknowledges it.
    ///
    /// Acknowledgement means the peer's engine processed the record; it
    /// does not prove the peer's application acted on it. Tickets reject
    /// with the teardown reason if the connection ends first.
    pub fn send(&self, message: Message) -> SendTicket {
        let (ticket, receipt) = oneshot::channel();

        if self.commands.send(Command::Send { message, ticket }).is_err() {
            // Receiver dropped; the ticket resolves as closed via the
            // dropped sender path.
        }

        SendTicket(receipt)
    }

    /// Send a message with no delivery feedback.
    pub fn status_send(&self, message: Message) {
        let _ = self.commands.send(Command::StatusSend { message });
    }

    /// Close this connection. Idempotent; later commands are inert.
    pub fn close(&self, reason: Option<String>) {
        let _ = self.commands.send(Command::Close { reason });
    }

    /// Redirect the connected initiator to another peer.
    ///
    /// Receiver role only: redirection is one-way, from a listening peer to
    /// the peer that dialed it.
    ///
    /// # Errors
    ///
    /// - `EngineError::RedirectNotAllowed` on an initiator-side handle
    pub fn redirect(
        &self,
        address: impl Into<String>,
        public_key: Vec<u8>,
        permanent: bool,
        context: Option<Value>,
    ) -> Result<(), EngineError> {
        if self.role != Role::Receiver {
            return Err(EngineError::RedirectNotAllowed);
        }

        let notice =
            RedirectNotice { address: address.into(), public_key, permanent, context };
        let _ = self.commands.send(Command::Redirect { notice });
        Ok(())
    }
}

/// Future resolving when a [`Peer::send`] is acknowledged.
///
/// Rejects with the connection's teardown reason if it ends before the
/// acknowledgement arrives.
pub struct SendTicket(oneshot::Receiver<Result<(), CloseReason>>);

impl Future for SendTicket {
    type Output = Result<(), CloseReason>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => Err(session_gone()),
        })
    }
}
