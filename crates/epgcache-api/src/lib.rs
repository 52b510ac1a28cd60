//! Upstream guide client library for epgcache.
//!
//! Defines the [`GuideSource`] abstraction the refresh cycle fetches from,
//! and its implementation for the Red Bee exposure API.

mod error;
mod source;

/// Red Bee exposure API client.
pub mod redbee;

pub use error::UpstreamError;
#[allow(clippy::module_name_repetitions)]
pub use source::{ChannelSet, FetchWindow, Guide, GuideSource, LocalGuideSource};
