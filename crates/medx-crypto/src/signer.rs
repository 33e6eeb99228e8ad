//! # Signing Service
//!
//! The distributed signing collaborator: given a message and a derivation
//! path, it returns a verifiable signature. Callers treat any failure as an
//! authentication failure.
//!
//! [`DerivedKeySigner`] derives one Ed25519 key per path from a master seed:
//!
//! ```text
//! child_seed = SHA-256("medx/derive/v1" || master_seed || len(c0) || c0 || len(c1) || c1 ...)
//! ```
//!
//! Each hospital therefore gets its own key, and the hospital's credential is
//! exactly the signature this service would produce for its request.

use async_trait::async_trait;
use medx_core::{CanonicalBytes, HospitalId};
use sha2::{Digest, Sha256};

use crate::ed25519::{decode_hex_into, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::error::CryptoError;

const DERIVE_DOMAIN_TAG: &[u8] = b"medx/derive/v1";

/// Ordered key-derivation path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath(Vec<String>);

impl DerivationPath {
    /// Path from explicit components.
    pub fn new(components: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(components.into_iter().map(Into::into).collect())
    }

    /// The path used to authenticate a hospital: its identifier alone.
    pub fn for_hospital(hospital: &HospitalId) -> Self {
        Self(vec![hospital.as_str().to_string()])
    }

    /// Path components.
    pub fn components(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m/{}", self.0.join("/"))
    }
}

/// Produces signatures over canonical messages for a derivation path.
#[async_trait]
pub trait SigningService: Send + Sync {
    /// Sign `message` with the key at `path`.
    async fn sign(
        &self,
        message: &CanonicalBytes,
        path: &DerivationPath,
    ) -> Result<Ed25519Signature, CryptoError>;

    /// The public key at `path`, for third-party verification.
    async fn public_key(&self, path: &DerivationPath) -> Result<Ed25519PublicKey, CryptoError>;
}

/// In-process signing service deriving per-path keys from a master seed.
pub struct DerivedKeySigner {
    master_seed: [u8; 32],
}

impl DerivedKeySigner {
    /// Use an explicit master seed.
    pub fn new(master_seed: [u8; 32]) -> Self {
        Self { master_seed }
    }

    /// Parse a 64-character hex master seed.
    pub fn from_hex_seed(hex: &str) -> Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        decode_hex_into(hex, &mut seed).map_err(CryptoError::KeyError)?;
        Ok(Self::new(seed))
    }

    /// Random master seed. Signatures will not survive a restart.
    pub fn ephemeral() -> Self {
        use rand::RngCore;
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::new(seed)
    }

    fn derive(&self, path: &DerivationPath) -> Ed25519KeyPair {
        let mut hasher = Sha256::new();
        hasher.update(DERIVE_DOMAIN_TAG);
        hasher.update(self.master_seed);
        for component in path.components() {
            hasher.update((component.len() as u32).to_be_bytes());
            hasher.update(component.as_bytes());
        }
        let mut child = [0u8; 32];
        child.copy_from_slice(&hasher.finalize());
        Ed25519KeyPair::from_seed(&child)
    }

    /// Synchronous signing, for issuing credentials outside an async context.
    pub fn sign_blocking(&self, message: &CanonicalBytes, path: &DerivationPath) -> Ed25519Signature {
        self.derive(path).sign(message)
    }
}

impl std::fmt::Debug for DerivedKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKeySigner(<seed redacted>)")
    }
}

#[async_trait]
impl SigningService for DerivedKeySigner {
    async fn sign(
        &self,
        message: &CanonicalBytes,
        path: &DerivationPath,
    ) -> Result<Ed25519Signature, CryptoError> {
        if path.components().is_empty() {
            return Err(CryptoError::KeyError("empty derivation path".into()));
        }
        Ok(self.sign_blocking(message, path))
    }

    async fn public_key(&self, path: &DerivationPath) -> Result<Ed25519PublicKey, CryptoError> {
        Ok(self.derive(path).public_key())
    }
}
