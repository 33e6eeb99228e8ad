//! # PHI Blob Store
//!
//! Encrypted directive content lives outside the directive store. The store
//! keeps only a content hash and the [`BlobRef`] returned by `put`.

use async_trait::async_trait;
use dashmap::DashMap;
use medx_core::BlobRef;
use thiserror::Error;

/// Errors from the blob collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobError {
    /// No blob under this reference.
    #[error("blob {reference} not found")]
    NotFound {
        reference: String,
    },

    /// The collaborator could not be reached or refused the request.
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Off-chain encrypted content storage.
#[async_trait]
pub trait PhiBlobStore: Send + Sync {
    /// Store content, returning an opaque reference.
    async fn put(&self, content: &[u8]) -> Result<BlobRef, BlobError>;

    /// Fetch content by reference.
    async fn get(&self, reference: &BlobRef) -> Result<Vec<u8>, BlobError>;

    /// Remove content. Deleting a missing reference is not an error.
    async fn delete(&self, reference: &BlobRef) -> Result<(), BlobError>;
}

/// Process-local blob store for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<BlobRef, Vec<u8>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn contains(&self, reference: &BlobRef) -> bool {
        self.blobs.contains_key(reference)
    }
}

#[async_trait]
impl PhiBlobStore for InMemoryBlobStore {
    async fn put(&self, content: &[u8]) -> Result<BlobRef, BlobError> {
        let reference = BlobRef::new(format!("blob:{}", uuid::Uuid::new_v4()))
            .map_err(|e| BlobError::Unavailable(e.to_string()))?;
        self.blobs.insert(reference.clone(), content.to_vec());
        Ok(reference)
    }

    async fn get(&self, reference: &BlobRef) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .get(reference)
            .map(|b| b.value().clone())
            .ok_or_else(|| BlobError::NotFound {
                reference: reference.to_string(),
            })
    }

    async fn delete(&self, reference: &BlobRef) -> Result<(), BlobError> {
        self.blobs.remove(reference);
        Ok(())
    }
}
