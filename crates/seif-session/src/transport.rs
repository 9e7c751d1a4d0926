//! Transport abstraction and implementations.
//!
//! The engine consumes any reliable, ordered byte stream. A connection is a
//! [`TransportLink`]: an outbound channel of byte chunks and an inbound
//! channel of [`TransportEvent`]s. Chunk boundaries carry no meaning — the
//! record reader reassembles records however the bytes arrive.
//!
//! Two implementations ship here: [`MemNet`], an in-process network for
//! tests and simulation, and a TCP transport behind the `tcp` feature.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

#[cfg(feature = "tcp")]
pub use self::tcp::{TcpAcceptor, TcpConnector};

/// Channel depth for transport links; enough to decouple bursts without
/// letting one stalled peer buffer unboundedly.
const LINK_DEPTH: usize = 32;

/// Transport setup failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Dialing the address failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Binding the address failed.
    #[error("bind failed: {0}")]
    Bind(String),
}

/// One event on the inbound half of a link.
#[derive(Debug)]
pub enum TransportEvent {
    /// An opaque chunk of stream bytes.
    Data(Bytes),
    /// The stream ended. `None` is an orderly close; `Some` is a failure
    /// reason.
    Closed(Option<String>),
}

/// A live transport connection.
///
/// Dropping the link is the close operation: the outbound half shuts the
/// stream down and the peer observes an orderly close.
pub struct TransportLink {
    /// Outbound bytes. Sends fail once the stream is gone.
    pub tx: mpsc::Sender<Bytes>,
    /// Inbound events, ending with a single `Closed`.
    pub rx: mpsc::Receiver<TransportEvent>,
}

/// Accepted connections of a bound listener.
///
/// Dropping this stops accepting.
pub struct Inbound {
    /// The stream of incoming links.
    pub connections: mpsc::Receiver<TransportLink>,
}

/// Dials addresses into [`TransportLink`]s.
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `address`.
    fn connect(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<TransportLink, TransportError>> + Send;
}

/// Binds addresses and accepts [`TransportLink`]s.
pub trait Acceptor: Send + Sync + 'static {
    /// Bind `address` and start accepting.
    fn bind(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Inbound, TransportError>> + Send;
}

/// In-process transport: a named registry of listeners connected by
/// channel-backed duplex links.
///
/// Clones share the registry, so one `MemNet` models one network. Used by
/// the test suites and useful for simulating peers inside one process.
#[derive(Clone, Default)]
pub struct MemNet {
    listeners: Arc<Mutex<HashMap<String, mpsc::Sender<TransportLink>>>>,
}

impl MemNet {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a connected pair of links.
    ///
    /// Spawns one pump task per direction; each pump forwards chunks until
    /// its writer hangs up, then delivers the orderly `Closed`.
    fn link_pair() -> (TransportLink, TransportLink) {
        let (left_tx, left_rx) = mpsc::channel::<Bytes>(LINK_DEPTH);
        let (right_tx, right_rx) = mpsc::channel::<Bytes>(LINK_DEPTH);
        let (left_event_tx, left_event_rx) = mpsc::channel::<TransportEvent>(LINK_DEPTH);
        let (right_event_tx, right_event_rx) = mpsc::channel::<TransportEvent>(LINK_DEPTH);

        tokio::spawn(pump(left_rx, right_event_tx));
        tokio::spawn(pump(right_rx, left_event_tx));

        (
            TransportLink { tx: left_tx, rx: left_event_rx },
            TransportLink { tx: right_tx, rx: right_event_rx },
        )
    }
}

/// Forward chunks from a link's writer to its peer's reader.
async fn pump(mut from: mpsc::Receiver<Bytes>, to: mpsc::Sender<TransportEvent>) {
    while let Some(bytes) = from.recv().await {
        if to.send(TransportEvent::Data(bytes)).await.is_err() {
            return;
        }
    }

    let _ = to.send(TransportEvent::Closed(None)).await;
}

impl Connector for MemNet {
    fn connect(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<TransportLink, TransportError>> + Send {
        let listener = self.listeners.lock().expect("listener registry poisoned").get(address).cloned();
        let address = address.to_string();

        async move {
            let Some(listener) = listener else {
                return Err(TransportError::Connect(format!("no listener at {address:?}")));
            };

            let (local, remote) = Self::link_pair();
            listener
                .send(remote)
                .await
                .map_err(|_| TransportError::Connect(format!("listener at {address:?} stopped")))?;

            Ok(local)
        }
    }
}

impl Acceptor for MemNet {
    fn bind(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Inbound, TransportError>> + Send {
        let listeners = self.listeners.clone();
        let address = address.to_string();

        async move {
            let (tx, rx) = mpsc::channel(LINK_DEPTH);

            let mut registry = listeners.lock().expect("listener registry poisoned");
            if registry.contains_key(&address) {
                return Err(TransportError::Bind(format!("{address:?} is already bound")));
            }
            registry.insert(address, tx);

            Ok(Inbound { connections: rx })
        }
    }
}

#[cfg(feature = "tcp")]
mod tcp {
    //! TCP transport on tokio.
    //!
    //! One reader and one writer task per connection bridge the socket to
    //! the channel-based [`TransportLink`]. Dropping the link's sender shuts
    //! the write half down, which the peer observes as an orderly close.

    use bytes::Bytes;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::mpsc,
    };

    use super::{Acceptor, Connector, Inbound, TransportError, TransportEvent, TransportLink, LINK_DEPTH};

    /// Read size per socket read.
    const READ_CHUNK: usize = 8 * 1024;

    /// Dials TCP connections.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct TcpConnector;

    /// Accepts TCP connections.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct TcpAcceptor;

    /// Bridge a connected socket into a [`TransportLink`].
    fn spawn_stream_link(stream: TcpStream) -> TransportLink {
        let (mut read_half, mut write_half) = stream.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(LINK_DEPTH);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(LINK_DEPTH);

        tokio::spawn(async move {
            while let Some(bytes) = out_rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            let _ = write_half.shutdown().await;
        });

        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        let _ = event_tx.send(TransportEvent::Closed(None)).await;
                        return;
                    },
                    Ok(n) => {
                        let chunk = Bytes::copy_from_slice(&buf[..n]);
                        if event_tx.send(TransportEvent::Data(chunk)).await.is_err() {
                            return;
                        }
                    },
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Closed(Some(e.to_string()))).await;
                        return;
                    },
                }
            }
        });

        TransportLink { tx: out_tx, rx: event_rx }
    }

    impl Connector for TcpConnector {
        fn connect(
            &self,
            address: &str,
        ) -> impl std::future::Future<Output = Result<TransportLink, TransportError>> + Send
        {
            let address = address.to_string();
            async move {
                let stream = TcpStream::connect(&address)
                    .await
                    .map_err(|e| TransportError::Connect(e.to_string()))?;
                stream.set_nodelay(true).map_err(|e| TransportError::Connect(e.to_string()))?;
                Ok(spawn_stream_link(stream))
            }
        }
    }

    impl Acceptor for TcpAcceptor {
        fn bind(
            &self,
            address: &str,
        ) -> impl std::future::Future<Output = Result<Inbound, TransportError>> + Send {
            let address = address.to_string();
            async move {
                let listener = TcpListener::bind(&address)
                    .await
                    .map_err(|e| TransportError::Bind(e.to_string()))?;

                let (tx, rx) = mpsc::channel(LINK_DEPTH);
                tokio::spawn(async move {
                    loop {
                        match listener.accept().await {
                            Ok((stream, _)) => {
                                if tx.send(spawn_stream_link(stream)).await.is_err() {
                                    return;
                                }
                            },
                            Err(e) => {
                                tracing::warn!(error = %e, "TCP accept failed; listener stopping");
                                return;
                            },
                        }
                    }
                });

                Ok(Inbound { connections: rx })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mem_net_round_trip() {
        let net = MemNet::new();
        let mut inbound = net.bind("host-a").await.unwrap();

        let mut dialer = net.connect("host-a").await.unwrap();
        let mut accepted = inbound.connections.recv().await.unwrap();

        dialer.tx.send(Bytes::from_static(b"ping")).await.unwrap();
        match accepted.rx.recv().await.unwrap() {
            TransportEvent::Data(bytes) => assert_eq!(&bytes[..], b"ping"),
            other => panic!("expected data, got {other:?}"),
        }

        accepted.tx.send(Bytes::from_static(b"pong")).await.unwrap();
        match dialer.rx.recv().await.unwrap() {
            TransportEvent::Data(bytes) => assert_eq!(&bytes[..], b"pong"),
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropping_a_link_closes_the_peer() {
        let net = MemNet::new();
        let mut inbound = net.bind("host-b").await.unwrap();

        let dialer = net.connect("host-b").await.unwrap();
        let mut accepted = inbound.connections.recv().await.unwrap();

        drop(dialer);

        match accepted.rx.recv().await.unwrap() {
            TransportEvent::Closed(None) => {},
            other => panic!("expected orderly close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_without_listener_fails() {
        let net = MemNet::new();
        let result = net.connect("nowhere").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn double_bind_fails() {
        let net = MemNet::new();
        let _first = net.bind("host-c").await.unwrap();
        let result = net.bind("host-c").await;
        assert!(matches!(result, Err(TransportError::Bind(_))));
    }
}
