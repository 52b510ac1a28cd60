//! Cache store for the serialized guide artifact.
//!
//! A [`CacheStore`] holds at most one published [`CacheArtifact`]. Readers
//! get an immutable `Arc` snapshot without taking a lock; writers replace the
//! snapshot wholesale, and a failed write leaves the previous one in place.

/// Published artifact snapshot.
pub mod artifact;
/// Store error types.
pub mod error;
/// Durable file-backed store.
pub mod file;
/// In-memory store.
pub mod memory;

pub use artifact::{CacheArtifact, CacheStore};
pub use error::StoreError;
pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;
