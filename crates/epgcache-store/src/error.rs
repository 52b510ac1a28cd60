use std::path::PathBuf;

/// Failure to publish or load an artifact.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum StoreError {
    /// A zero-length artifact was offered for publishing.
    #[error("refusing to publish an empty artifact")]
    EmptyArtifact,
    /// The artifact could not be persisted.
    #[error("failed to write artifact to {}", path.display())]
    WriteFailure {
        /// Canonical artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A persisted artifact exists but could not be loaded.
    #[error("failed to load artifact from {}", path.display())]
    Load {
        /// Canonical artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn load(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Load {
            path: path.into(),
            source,
        }
    }
}
