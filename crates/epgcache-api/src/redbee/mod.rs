//! Red Bee exposure API client module.
//!
//! Walks the channel listing component, resolves each channel's EPG
//! generator component and converts its assets into programme records.

mod client;
mod types;
mod util;

#[allow(clippy::module_name_repetitions)]
pub use client::{DEFAULT_BASE_URL, RedbeeClient, RedbeeClientBuilder};
#[allow(clippy::module_name_repetitions)]
pub use types::{RedbeeAsset, RedbeeChannel};
pub use util::{parse_asset_time, split_episode_title, to_programme_record};
