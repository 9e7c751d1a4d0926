//! Caller-facing event traits.
//!
//! The engine invokes these from the connection task. Handlers should stay
//! brief; anything long-running belongs on a task of its own. No handler is
//! ever invoked after its connection's teardown callback, and none at all
//! after the caller's own `close`.

use seif_core::{CloseReason, PeerIntro, RedirectNotice};
use seif_proto::Message;

use crate::handle::Peer;

/// What an initiator learns when its connection ends.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseEvent {
    /// Why the connection ended.
    pub reason: CloseReason,
    /// Where the peer redirected us, when `reason` is
    /// [`CloseReason::Redirected`]. The engine reconnects on its own; this
    /// exists so callers can update their peer directory (for permanent
    /// redirects) or surface the move.
    pub redirect: Option<RedirectNotice>,
}

/// Callbacks for a dialing (initiator) connection.
pub trait ClientEvents: Send + 'static {
    /// The handshake completed; `peer` accepts traffic from now on.
    fn on_open(&mut self, peer: &Peer);

    /// An application message arrived.
    fn on_message(&mut self, peer: &Peer, message: Message);

    /// The connection ended. Fires at most once per connection, and not at
    /// all when the caller closed locally. During a redirect it fires for
    /// the old connection before `on_open` fires on the new one.
    fn on_close(&mut self, event: CloseEvent);
}

/// Callbacks for a listening (receiver) endpoint.
///
/// One listener serves many connections, so the handler is cloned per
/// accepted transport connection; implementations share state via `Arc` the
/// way storage backends do.
pub trait ServerEvents: Clone + Send + 'static {
    /// A peer completed its handshake. `intro` carries the peer's public
    /// key and the hello value and connection info from its `Hello`.
    fn on_open(&mut self, peer: &Peer, intro: &PeerIntro);

    /// An application message arrived.
    fn on_message(&mut self, peer: &Peer, message: Message);

    /// The connection ended. Not invoked for locally requested closes.
    fn on_close(&mut self, reason: CloseReason);
}
