//! XMLTV document model for epgcache.
//!
//! Converts programme records fetched from the upstream guide into an
//! ordered, per-channel [`XmltvDocument`] and serializes it to XMLTV.

/// Serialized XMLTV document.
pub mod document;
/// Channel and programme records.
pub mod model;
/// Record validation, grouping and ordering.
pub mod transform;

pub use document::{ChannelListing, XmltvDocument, XmltvError, format_xmltv_time};
pub use model::{ChannelDescriptor, ProgrammeRecord};
pub use transform::{TransformError, TransformReport, transform};
