//! Seif Cryptographic Primitives
//!
//! Cryptographic building blocks for the Seif session protocol. Everything in
//! this crate is synchronous and deterministic given a caller-provided RNG,
//! which keeps the protocol state machines pure and testable with seeded
//! randomness.
//!
//! # Key Lifecycle
//!
//! Each connection passes through two symmetric keys derived from the peers'
//! static P-521 keypairs:
//!
//! ```text
//! Static P-521 keypairs (both peers)
//!        │
//!        ▼
//! ECIES  → Handshake Key (one-shot, wraps the Hello payload)
//!        │
//!        ▼
//! ECIES  → Session Key (all post-handshake records)
//!        │
//!        ▼
//! AES-256-GCM + IvSequence → Ciphertext records
//! ```
//!
//! The handshake key is discarded (zeroized) the moment the session key is
//! adopted. Symmetric keys are never reused across connections.
//!
//! # Security
//!
//! IV Uniqueness:
//! - Each direction of a connection owns an [`IvSequence`] with a disjoint
//!   fixed field (0 = initiator-originated, 1 = receiver-originated)
//! - A monotonic 64-bit counter completes the 96-bit IV; the sequence refuses
//!   to run past its safe bound rather than wrap
//! - ECIES uses an all-zero IV, which is safe because the derived wrapping key
//!   is used for exactly one encryption
//!
//! Authenticity:
//! - AES-256-GCM rejects any tampered record with [`CryptoError::AuthFailed`];
//!   this is the sole integrity check in the protocol
//!
//! Key Hygiene:
//! - [`SymmetricKey`] zeroizes on drop; private-key exports are wrapped in
//!   [`zeroize::Zeroizing`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod aead;
mod ecies;
mod error;
mod iv;
mod keys;

pub use aead::{open, seal, SymmetricKey, IV_LEN, SYMMETRIC_KEY_LEN, TAG_LEN};
pub use ecies::{ecies_open, ecies_seal, ECIES_OVERHEAD};
pub use error::CryptoError;
pub use iv::{IvSequence, IV_SAFE_LIMIT};
pub use keys::{
    export_private_key, export_public_key, import_private_key, import_public_key, Keypair,
    RAW_PUBLIC_KEY_LEN,
};

// Re-exported so downstream crates spell key and RNG types the same way.
pub use p521::elliptic_curve::rand_core;
pub use p521::elliptic_curve::rand_core::CryptoRngCore;
pub use p521::{PublicKey, SecretKey};
