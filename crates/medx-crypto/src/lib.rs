//! # medx-crypto: Signing Capability
//!
//! Cryptography is a capability the engine uses, not something it designs:
//!
//! - **Ed25519** key pairs, signatures and verification over
//!   `CanonicalBytes` ([`ed25519`]).
//! - **Signing service** collaborator ([`signer::SigningService`]): produces
//!   a signature over a message for a derivation path. The emergency resolver
//!   uses it to authenticate `(patient, hospital, situation)` assertions.
//!   [`signer::DerivedKeySigner`] is the in-process implementation.
//!
//! ## Crate Policy
//!
//! - Depends only on `medx-core` internally.
//! - Tests use real Ed25519, never mocked signatures.
//! - Secret material is never serialized or printed.

pub mod ed25519;
pub mod error;
pub mod signer;

pub use ed25519::{signatures_match, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use error::CryptoError;
pub use signer::{DerivationPath, DerivedKeySigner, SigningService};
