//! The per-connection task.
//!
//! [`run_session`] owns one [`Session`] and one [`TransportLink`], selects
//! between caller commands and transport events, and executes the session's
//! actions in order. All of the engine's ordering guarantees reduce to this
//! loop being the only thing that touches the session:
//!
//! - outgoing records are awaited onto the transport before the next event
//!   is processed, so the wire order is the submission order
//! - acknowledgement tickets are appended when a `Send` is sealed and
//!   resolved front-first on each `AckConfirmed`, so resolution is FIFO
//! - no callback fires after the loop returns; teardown notification is the
//!   caller's (supervisor's) single responsibility

use std::collections::VecDeque;

use seif_core::{
    env::Environment, Action, CloseReason, PeerIntro, RedirectNotice, Session, SessionError,
};
use seif_proto::Message;
use tokio::sync::{mpsc, oneshot};

use crate::{
    handle::{Command, Peer},
    transport::{TransportEvent, TransportLink},
};

/// Internal event sink; bridges to [`crate::ClientEvents`] or
/// [`crate::ServerEvents`] above the driver.
pub(crate) trait Events {
    /// The handshake completed.
    fn open(&mut self, peer: &Peer, intro: &PeerIntro);
    /// An application message arrived.
    fn message(&mut self, peer: &Peer, message: Message);
}

/// How a connection task ended.
pub(crate) enum SessionEnd {
    /// The caller closed locally (or every handle was dropped).
    Local {
        /// Caller-supplied reason.
        reason: Option<String>,
    },
    /// The peer closed the transport in an orderly fashion.
    Remote,
    /// The session failed.
    Failed(SessionError),
    /// The peer redirected us; the supervisor reconnects.
    Redirect(RedirectNotice),
}

impl SessionEnd {
    /// The close reason pending tickets are rejected with.
    fn close_reason(&self) -> CloseReason {
        match self {
            Self::Local { reason } => CloseReason::Local { reason: reason.clone() },
            Self::Remote => CloseReason::Remote,
            Self::Failed(error) => CloseReason::Failed(error.clone()),
            Self::Redirect(_) => CloseReason::Redirected,
        }
    }
}

/// Control flow of executing one batch of actions.
enum Flow {
    Continue,
    End(SessionEnd),
}

type AckTicket = oneshot::Sender<Result<(), CloseReason>>;

/// Drive one session until it ends.
///
/// `initial_actions` carries work produced at construction (the
/// initiator's `Hello`). On return the session is closed, every pending
/// ticket has been rejected with the teardown reason, and the link is
/// dropped (which closes the transport if the peer has not already).
pub(crate) async fn run_session<E, H>(
    mut session: Session<E>,
    initial_actions: Vec<Action>,
    mut link: TransportLink,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mut H,
    peer: &Peer,
) -> SessionEnd
where
    E: Environment,
    H: Events,
{
    let mut pending_acks: VecDeque<AckTicket> = VecDeque::new();

    let mut end = match execute(initial_actions, &link, events, peer, &mut pending_acks).await {
        Flow::End(end) => Some(end),
        Flow::Continue => None,
    };

    while end.is_none() {
        tokio::select! {
            command = commands.recv() => {
                end = handle_command(
                    command,
                    &mut session,
                    &link,
                    events,
                    peer,
                    &mut pending_acks,
                ).await;
            },

            event = link.rx.recv() => {
                end = handle_transport(
                    event,
                    &mut session,
                    &link,
                    events,
                    peer,
                    &mut pending_acks,
                ).await;
            },
        }
    }

    let Some(end) = end else { unreachable!("loop exits only with an end") };

    // A peer that walks away mid-handshake failed to authenticate; surface
    // that as a handshake failure rather than an orderly close.
    let end = match end {
        SessionEnd::Remote if session.phase() != seif_core::Phase::Open => {
            SessionEnd::Failed(SessionError::HandshakeFailed {
                reason: "transport closed during handshake".to_string(),
            })
        },
        other => other,
    };

    session.close();

    let reason = end.close_reason();
    for ticket in pending_acks.drain(..) {
        let _ = ticket.send(Err(reason.clone()));
    }

    tracing::debug!(%reason, "session ended");

    // Dropping the link closes the transport; if the transport is already
    // gone this is a no-op.
    drop(link);

    end
}

/// Apply one caller command. `Some` ends the session.
async fn handle_command<E: Environment, H: Events>(
    command: Option<Command>,
    session: &mut Session<E>,
    link: &TransportLink,
    events: &mut H,
    peer: &Peer,
    pending_acks: &mut VecDeque<AckTicket>,
) -> Option<SessionEnd> {
    match command {
        Some(Command::Send { message, ticket }) => match session.send(&message) {
            Ok(actions) => {
                pending_acks.push_back(ticket);
                flow_end(execute(actions, link, events, peer, pending_acks).await)
            },
            Err(error) => {
                let fatal = error.is_fatal();
                let _ = ticket.send(Err(CloseReason::Failed(error.clone())));
                fatal.then_some(SessionEnd::Failed(error))
            },
        },

        Some(Command::StatusSend { message }) => match session.status_send(&message) {
            Ok(actions) => flow_end(execute(actions, link, events, peer, pending_acks).await),
            Err(error) if error.is_fatal() => Some(SessionEnd::Failed(error)),
            Err(error) => {
                tracing::debug!(%error, "status_send dropped");
                None
            },
        },

        Some(Command::Redirect { notice }) => match session.redirect(&notice) {
            Ok(actions) => flow_end(execute(actions, link, events, peer, pending_acks).await),
            Err(error) if error.is_fatal() => Some(SessionEnd::Failed(error)),
            Err(error) => {
                tracing::warn!(%error, "redirect dropped");
                None
            },
        },

        Some(Command::Close { reason }) => Some(SessionEnd::Local { reason }),

        // Every handle was dropped; nothing can reach this session again.
        None => Some(SessionEnd::Local { reason: None }),
    }
}

/// Apply one transport event. `Some` ends the session.
async fn handle_transport<E: Environment, H: Events>(
    event: Option<TransportEvent>,
    session: &mut Session<E>,
    link: &TransportLink,
    events: &mut H,
    peer: &Peer,
    pending_acks: &mut VecDeque<AckTicket>,
) -> Option<SessionEnd> {
    match event {
        Some(TransportEvent::Data(bytes)) => match session.handle_bytes(&bytes) {
            Ok(actions) => flow_end(execute(actions, link, events, peer, pending_acks).await),
            Err(error) => Some(SessionEnd::Failed(error)),
        },

        Some(TransportEvent::Closed(Some(reason))) => {
            Some(SessionEnd::Failed(SessionError::TransportFailed { reason }))
        },

        Some(TransportEvent::Closed(None)) | None => Some(SessionEnd::Remote),
    }
}

fn flow_end(flow: Flow) -> Option<SessionEnd> {
    match flow {
        Flow::Continue => None,
        Flow::End(end) => Some(end),
    }
}

/// Execute one batch of actions in order.
async fn execute<H: Events>(
    actions: Vec<Action>,
    link: &TransportLink,
    events: &mut H,
    peer: &Peer,
    pending_acks: &mut VecDeque<AckTicket>,
) -> Flow {
    for action in actions {
        match action {
            Action::Transmit(bytes) => {
                if link.tx.send(bytes).await.is_err() {
                    return Flow::End(SessionEnd::Failed(SessionError::TransportFailed {
                        reason: "transport writer is gone".to_string(),
                    }));
                }
            },

            Action::Open(intro) => events.open(peer, &intro),

            Action::Deliver(message) => events.message(peer, message),

            Action::AckConfirmed => {
                // The state machine only confirms acks it counted, so a
                // ticket is always present.
                if let Some(ticket) = pending_acks.pop_front() {
                    let _ = ticket.send(Ok(()));
                }
            },

            Action::FollowRedirect(notice) => return Flow::End(SessionEnd::Redirect(notice)),
        }
    }

    Flow::Continue
}
