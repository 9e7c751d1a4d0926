//! Seif Session Engine
//!
//! Tokio driver for the Seif protocol. The pure state machine lives in
//! [`seif_core`]; this crate owns everything that touches the world: the
//! transport and store abstractions, the per-connection task that feeds a
//! [`seif_core::Session`] and executes its actions, and the
//! [`connect`]/[`listen`] façade.
//!
//! # Architecture
//!
//! One task per connection. The task selects between caller commands
//! (send, status send, redirect, close) and transport events (bytes,
//! closure), feeds both into the session, and executes the returned actions
//! in order. Because every transmit is awaited onto the transport before
//! the next event is processed, outgoing records commit to the wire in
//! submission order and acknowledgements resolve their waiters FIFO.
//!
//! Redirects are supervised above the connection task: when the peer
//! redirects an initiator, the old session is torn down (`on_close` with
//! the redirect notice fires first), then a fresh connection is dialed to
//! the new address with the redirect context as its `connection_info`.
//!
//! # Components
//!
//! - [`transport`]: byte-stream transport traits plus in-memory
//!   ([`transport::MemNet`]) and TCP (feature `tcp`) implementations
//! - [`store`]: keypair and acquaintance persistence
//! - [`Peer`]: handle exposed to callbacks for sending and closing
//! - [`connect`] / [`listen`]: the engine façade
//! - [`connect_to_peer`]: petname resolution through a [`store::Store`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod connect;
mod directory;
mod driver;
mod error;
mod events;
mod handle;
mod listen;
pub mod store;
pub mod transport;

pub use connect::{connect, ConnectConfig, ConnectionHandle};
pub use directory::connect_to_peer;
pub use error::EngineError;
pub use events::{ClientEvents, CloseEvent, ServerEvents};
pub use handle::{Peer, SendTicket};
pub use listen::{listen, ListenConfig, ListenerHandle};

// The protocol vocabulary callers interact with.
pub use seif_core::{CloseReason, PeerIntro, RedirectNotice, Role, SessionError};
pub use seif_crypto::Keypair;
pub use seif_proto::{FieldValue, Message};
