//! Petname resolution: the thin façade between the store and the engine.

use serde_json::Value;

use crate::{
    connect::{connect, ConnectConfig, ConnectionHandle},
    error::EngineError,
    events::ClientEvents,
    store::Store,
    transport::Connector,
};

/// Resolve a petname through the store and dial the peer it names.
///
/// Reads the caller's keypair and the acquaintance record, then hands off
/// to [`connect`]. Redirects are followed as usual; a permanent redirect is
/// surfaced through `on_close` so the caller can rewrite the acquaintance.
///
/// # Errors
///
/// - `EngineError::MissingKeypair` if the store holds no keypair
/// - `EngineError::UnknownPeer` if the petname resolves to nothing
/// - `EngineError::Store` on backend failure
pub async fn connect_to_peer<S, C, H>(
    store: &S,
    connector: C,
    petname: &str,
    hello_value: Option<Value>,
    events: H,
) -> Result<ConnectionHandle, EngineError>
where
    S: Store,
    C: Connector,
    H: ClientEvents,
{
    let keypair = store.read_keypair().await?.ok_or(EngineError::MissingKeypair)?;

    let acquaintance = store
        .read_acquaintance(petname)
        .await?
        .ok_or_else(|| EngineError::UnknownPeer { petname: petname.to_string() })?;

    Ok(connect(
        ConnectConfig {
            keypair,
            connector,
            address: acquaintance.address,
            remote_public_key: acquaintance.public_key,
            hello_value,
            connection_info: None,
            iv_limit: None,
        },
        events,
    ))
}
