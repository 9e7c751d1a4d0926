//! Dialing: the initiator-side façade and its redirect supervisor.

use seif_core::{env::OsEnvironment, CloseReason, Role, Session, SessionError};
use seif_crypto::{import_public_key, Keypair};
use seif_proto::Message;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    driver::{run_session, Events, SessionEnd},
    events::{ClientEvents, CloseEvent},
    handle::{Command, Peer},
    transport::Connector,
};

/// Configuration for [`connect`].
pub struct ConnectConfig<C: Connector> {
    /// Our static keypair.
    pub keypair: Keypair,
    /// Transport used to dial (and re-dial on redirect).
    pub connector: C,
    /// Opaque address, forwarded to the transport.
    pub address: String,
    /// The peer identity we expect: its raw 133-byte public key.
    pub remote_public_key: Vec<u8>,
    /// Value surfaced to the peer's `on_open`.
    pub hello_value: Option<Value>,
    /// Cleartext connection metadata; visible on the wire.
    pub connection_info: Option<Value>,
    /// Reduced IV counter bound, for exhaustion testing. `None` keeps the
    /// production bound.
    pub iv_limit: Option<u64>,
}

/// Handle returned by [`connect`].
///
/// Dropping the handle does not close the connection; call
/// [`ConnectionHandle::close`].
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Close the connection.
    ///
    /// Works at any point in the lifecycle: invoked before the handshake
    /// completes it cancels the pending connection, and the engine
    /// suppresses all further callbacks either way.
    pub fn close(&self, reason: Option<String>) {
        let _ = self.commands.send(Command::Close { reason });
    }

    /// Wait for the connection (including any redirect successors) to end.
    pub async fn finished(self) {
        let _ = self.task.await;
    }
}

/// Dial a peer and drive a session against it.
///
/// Returns immediately; connection progress is reported through `events`
/// (`on_open` once the handshake completes, `on_close` on failure). Must be
/// called within a tokio runtime.
pub fn connect<C, H>(config: ConnectConfig<C>, events: H) -> ConnectionHandle
where
    C: Connector,
    H: ClientEvents,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let peer = Peer::new(Role::Initiator, command_tx.clone());

    let task = tokio::spawn(supervise(config, events, command_rx, peer));

    ConnectionHandle { commands: command_tx, task }
}

/// Bridge [`ClientEvents`] into the driver's event sink.
struct ClientBridge<'a, H: ClientEvents>(&'a mut H);

impl<H: ClientEvents> Events for ClientBridge<'_, H> {
    fn open(&mut self, peer: &Peer, _intro: &seif_core::PeerIntro) {
        self.0.on_open(peer);
    }

    fn message(&mut self, peer: &Peer, message: Message) {
        self.0.on_message(peer, message);
    }
}

/// Run the connection, following redirects until the session ends for any
/// other reason.
async fn supervise<C, H>(
    config: ConnectConfig<C>,
    mut events: H,
    mut commands: mpsc::UnboundedReceiver<Command>,
    peer: Peer,
) where
    C: Connector,
    H: ClientEvents,
{
    let ConnectConfig {
        keypair,
        connector,
        mut address,
        mut remote_public_key,
        hello_value,
        mut connection_info,
        iv_limit,
    } = config;

    loop {
        let Some(link) = dial(&connector, &address, &mut commands, &mut events).await else {
            return;
        };

        let receiver_public = match import_public_key(&remote_public_key) {
            Ok(key) => key,
            Err(error) => {
                events.on_close(CloseEvent {
                    reason: CloseReason::Failed(SessionError::HandshakeFailed {
                        reason: error.to_string(),
                    }),
                    redirect: None,
                });
                return;
            },
        };

        let initiated = Session::initiate(
            OsEnvironment,
            keypair.clone(),
            receiver_public,
            hello_value.as_ref(),
            connection_info.as_ref(),
        );
        let (mut session, initial_actions) = match initiated {
            Ok(initiated) => initiated,
            Err(error) => {
                events.on_close(CloseEvent {
                    reason: CloseReason::Failed(error),
                    redirect: None,
                });
                return;
            },
        };
        if let Some(limit) = iv_limit {
            session.limit_ivs(limit);
        }

        let end = {
            let mut bridge = ClientBridge(&mut events);
            run_session(session, initial_actions, link, &mut commands, &mut bridge, &peer).await
        };

        match end {
            SessionEnd::Redirect(notice) => {
                tracing::info!(address = %notice.address, permanent = notice.permanent, "following redirect");

                events.on_close(CloseEvent {
                    reason: CloseReason::Redirected,
                    redirect: Some(notice.clone()),
                });

                // Re-initiate against the new peer; its context becomes the
                // new connection's cleartext connection info.
                address = notice.address;
                remote_public_key = notice.public_key;
                connection_info = notice.context;
            },

            // Locally requested: the caller asked for silence.
            SessionEnd::Local { .. } => return,

            SessionEnd::Remote => {
                events.on_close(CloseEvent { reason: CloseReason::Remote, redirect: None });
                return;
            },

            SessionEnd::Failed(error) => {
                events.on_close(CloseEvent {
                    reason: CloseReason::Failed(error),
                    redirect: None,
                });
                return;
            },
        }
    }
}

/// Dial the transport while staying responsive to cancellation.
///
/// Returns `None` if the caller closed while the dial was in flight (no
/// callbacks fire) or if the dial failed (`on_close` has fired).
async fn dial<C: Connector, H: ClientEvents>(
    connector: &C,
    address: &str,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mut H,
) -> Option<crate::transport::TransportLink> {
    let connect_fut = connector.connect(address);
    tokio::pin!(connect_fut);

    let result = loop {
        tokio::select! {
            result = &mut connect_fut => break result,

            command = commands.recv() => match command {
                Some(Command::Close { .. }) | None => return None,
                Some(Command::Send { ticket, .. }) => {
                    let _ = ticket.send(Err(CloseReason::Local { reason: None }));
                },
                Some(_) => {},
            },
        }
    };

    match result {
        Ok(link) => Some(link),
        Err(error) => {
            events.on_close(CloseEvent {
                reason: CloseReason::Failed(SessionError::TransportFailed {
                    reason: error.to_string(),
                }),
                redirect: None,
            });
            None
        },
    }
}
