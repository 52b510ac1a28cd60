//! In-memory `CacheStore`.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use chrono::Utc;

use crate::artifact::{CacheArtifact, CacheStore};
use crate::error::StoreError;

/// Non-durable [`CacheStore`]; the artifact is lost on drop.
#[derive(Debug, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct MemoryCacheStore {
    published: ArcSwapOption<CacheArtifact>,
}

impl MemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `artifact`.
    #[must_use]
    pub fn with_artifact(artifact: CacheArtifact) -> Self {
        Self {
            published: ArcSwapOption::from_pointee(artifact),
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn write(&self, bytes: Bytes) -> Result<Arc<CacheArtifact>, StoreError> {
        if bytes.is_empty() {
            return Err(StoreError::EmptyArtifact);
        }
        let artifact = Arc::new(CacheArtifact::new(bytes, Utc::now()));
        self.published.store(Some(Arc::clone(&artifact)));
        tracing::debug!(bytes = artifact.len(), "Artifact published in memory");
        Ok(artifact)
    }

    fn read(&self) -> Option<Arc<CacheArtifact>> {
        self.published.load_full()
    }
}
