//! Listening: the receiver-side façade.

use std::sync::{Arc, Mutex};

use seif_core::{env::OsEnvironment, CloseReason, Role, Session};
use seif_crypto::Keypair;
use seif_proto::Message;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    driver::{run_session, Events, SessionEnd},
    error::EngineError,
    events::ServerEvents,
    handle::{Command, Peer},
    transport::{Acceptor, TransportLink},
};

/// Configuration for [`listen`].
pub struct ListenConfig<A: Acceptor> {
    /// Our static keypair.
    pub keypair: Keypair,
    /// Transport used to accept connections.
    pub acceptor: A,
    /// Opaque address, forwarded to the transport.
    pub address: String,
    /// Reduced IV counter bound, for exhaustion testing. `None` keeps the
    /// production bound.
    pub iv_limit: Option<u64>,
}

/// Handle returned by [`listen`].
pub struct ListenerHandle {
    sessions: Arc<Mutex<Vec<mpsc::UnboundedSender<Command>>>>,
    accept_task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop accepting and close every live connection.
    ///
    /// Connections close as locally requested, so their handlers see no
    /// further callbacks.
    pub fn stop(&self, reason: Option<String>) {
        self.accept_task.abort();

        let sessions = self.sessions.lock().expect("session registry poisoned");
        for session in sessions.iter() {
            let _ = session.send(Command::Close { reason: reason.clone() });
        }
    }
}

/// Bridge [`ServerEvents`] into the driver's event sink.
struct ServerBridge<'a, H: ServerEvents>(&'a mut H);

impl<H: ServerEvents> Events for ServerBridge<'_, H> {
    fn open(&mut self, peer: &Peer, intro: &seif_core::PeerIntro) {
        self.0.on_open(peer, intro);
    }

    fn message(&mut self, peer: &Peer, message: Message) {
        self.0.on_message(peer, message);
    }
}

/// Bind an address and serve one receiver session per accepted connection.
///
/// The handler is cloned for each connection. Returns once the address is
/// bound; accepted connections are driven on their own tasks.
///
/// # Errors
///
/// - `EngineError::Transport` if binding fails
pub async fn listen<A, H>(config: ListenConfig<A>, events: H) -> Result<ListenerHandle, EngineError>
where
    A: Acceptor,
    H: ServerEvents,
{
    let ListenConfig { keypair, acceptor, address, iv_limit } = config;

    let mut inbound = acceptor.bind(&address).await?;
    tracing::info!(%address, "listening");

    let sessions: Arc<Mutex<Vec<mpsc::UnboundedSender<Command>>>> = Arc::default();
    let registry = sessions.clone();

    let accept_task = tokio::spawn(async move {
        while let Some(link) = inbound.connections.recv().await {
            let handler = events.clone();
            let keypair = keypair.clone();

            let (command_tx, command_rx) = mpsc::unbounded_channel();
            registry.lock().expect("session registry poisoned").push(command_tx.clone());

            tokio::spawn(serve_connection(keypair, iv_limit, link, command_tx, command_rx, handler));
        }
    });

    Ok(ListenerHandle { sessions, accept_task })
}

/// Drive one accepted connection to completion.
async fn serve_connection<H: ServerEvents>(
    keypair: Keypair,
    iv_limit: Option<u64>,
    link: TransportLink,
    command_tx: mpsc::UnboundedSender<Command>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    mut handler: H,
) {
    let peer = Peer::new(Role::Receiver, command_tx);

    let mut session = Session::accept(OsEnvironment, keypair);
    if let Some(limit) = iv_limit {
        session.limit_ivs(limit);
    }

    let end = {
        let mut bridge = ServerBridge(&mut handler);
        run_session(session, Vec::new(), link, &mut command_rx, &mut bridge, &peer).await
    };

    match end {
        // Locally requested (peer.close or listener stop): silent.
        SessionEnd::Local { .. } => {},

        SessionEnd::Remote => handler.on_close(CloseReason::Remote),

        SessionEnd::Failed(error) => handler.on_close(CloseReason::Failed(error)),

        // The state machine rejects inbound redirects at a receiver, so the
        // driver can never observe one here.
        SessionEnd::Redirect(_) => unreachable!("receiver sessions never follow redirects"),
    }
}
