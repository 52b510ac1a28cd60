//! `CacheArtifact` and the `CacheStore` trait.

use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// One serialized guide, as published by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheArtifact {
    bytes: Bytes,
    generated_at: DateTime<Utc>,
}

impl CacheArtifact {
    /// Wraps serialized bytes generated at `generated_at`.
    #[must_use]
    pub const fn new(bytes: Bytes, generated_at: DateTime<Utc>) -> Self {
        Self {
            bytes,
            generated_at,
        }
    }

    /// Serialized document. Cloning is a reference-count bump.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// When the artifact was produced.
    #[must_use]
    pub const fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false` for artifacts accepted by a store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Holds the currently published artifact.
///
/// `read` never blocks on `write`: it returns the last published snapshot,
/// which stays valid for as long as the caller holds it.
#[allow(clippy::module_name_repetitions)]
pub trait CacheStore: Send + Sync + Debug {
    /// Publishes `bytes` as the new artifact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyArtifact`] for zero-length input and
    /// [`StoreError::WriteFailure`] if persisting fails. In both cases the
    /// previously published artifact is still returned by [`Self::read`].
    fn write(&self, bytes: Bytes) -> Result<Arc<CacheArtifact>, StoreError>;

    /// Returns the published artifact, or `None` before the first write.
    fn read(&self) -> Option<Arc<CacheArtifact>>;
}
