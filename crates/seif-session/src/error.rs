//! Engine-level errors.
//!
//! Session-protocol failures surface through `on_close` as
//! [`seif_core::CloseReason`]; the errors here cover the setup paths that
//! fail before a session exists.

use thiserror::Error;

use crate::{store::StoreError, transport::TransportError};

/// Failures of the engine façade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The transport could not be set up.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store holds no keypair for this identity.
    #[error("no keypair in store")]
    MissingKeypair,

    /// No acquaintance is recorded under the given petname.
    #[error("unknown peer {petname:?}")]
    UnknownPeer {
        /// The petname that failed to resolve.
        petname: String,
    },

    /// Redirect was invoked on an initiator-side handle.
    #[error("redirect is only available to listening peers")]
    RedirectNotAllowed,
}
