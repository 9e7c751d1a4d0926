//! Keypair and acquaintance persistence.
//!
//! The engine itself never writes the store; it reads it through the
//! [`connect_to_peer`](crate::connect_to_peer) façade and leaves updates
//! (first-run keypair generation, permanent-redirect rebinding) to the
//! caller, who owns the policy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use seif_crypto::Keypair;
use thiserror::Error;

/// A petname bound to a peer's address and public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquaintance {
    /// Locally chosen name for the peer.
    pub petname: String,
    /// Transport address of the peer.
    pub address: String,
    /// The peer's raw 133-byte public key.
    pub public_key: Vec<u8>,
}

/// Storage backend failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed to read or write.
    #[error("store backend failure: {reason}")]
    Backend {
        /// Failure detail.
        reason: String,
    },
}

/// Async persistence for one identity's keypair and peer directory.
///
/// Implementations are shared across tasks; clones (typically `Arc`-backed)
/// must observe each other's writes.
pub trait Store: Send + Sync + 'static {
    /// The stored keypair, if one exists.
    fn read_keypair(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<Keypair>, StoreError>> + Send;

    /// Persist the keypair, replacing any existing one.
    fn write_keypair(
        &self,
        keypair: Keypair,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Look up an acquaintance by petname.
    fn read_acquaintance(
        &self,
        petname: &str,
    ) -> impl std::future::Future<Output = Result<Option<Acquaintance>, StoreError>> + Send;

    /// Insert or replace an acquaintance, keyed by petname.
    fn add_acquaintance(
        &self,
        acquaintance: Acquaintance,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Remove an acquaintance. Removing an unknown petname is a no-op.
    fn remove_acquaintance(
        &self,
        petname: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// In-memory store for tests and ephemeral identities.
///
/// Clones share state through an `Arc<Mutex<..>>`, so a clone handed to a
/// task observes writes made elsewhere.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    keypair: Option<Keypair>,
    acquaintances: HashMap<String, Acquaintance>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn read_keypair(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<Keypair>, StoreError>> + Send {
        let keypair = self.inner.lock().expect("store poisoned").keypair.clone();
        async move { Ok(keypair) }
    }

    fn write_keypair(
        &self,
        keypair: Keypair,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send {
        self.inner.lock().expect("store poisoned").keypair = Some(keypair);
        async { Ok(()) }
    }

    fn read_acquaintance(
        &self,
        petname: &str,
    ) -> impl std::future::Future<Output = Result<Option<Acquaintance>, StoreError>> + Send {
        let acquaintance =
            self.inner.lock().expect("store poisoned").acquaintances.get(petname).cloned();
        async move { Ok(acquaintance) }
    }

    fn add_acquaintance(
        &self,
        acquaintance: Acquaintance,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send {
        self.inner
            .lock()
            .expect("store poisoned")
            .acquaintances
            .insert(acquaintance.petname.clone(), acquaintance);
        async { Ok(()) }
    }

    fn remove_acquaintance(
        &self,
        petname: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send {
        self.inner.lock().expect("store poisoned").acquaintances.remove(petname);
        async { Ok(()) }
    }
}
