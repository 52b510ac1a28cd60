//! `AppConfig` struct and TOML loading.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use epgcache_api::ChannelSet;
use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Channel selection settings.
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Upstream listing coordinates.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Fetch window relative to the refresh time.
    #[serde(default)]
    pub window: WindowConfig,
}

/// Channel selection configuration.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ChannelsConfig {
    /// Selected channel slugs. Empty selects every listed channel.
    #[serde(default)]
    pub selected: Vec<String>,
}

/// Upstream listing coordinates. Unset fields use the client defaults.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Customer path segment.
    pub customer: Option<String>,
    /// Business unit path segment.
    pub business_unit: Option<String>,
    /// Channel listing component id.
    pub listing_component: Option<String>,
}

/// Fetch window. Unset sides are open.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WindowConfig {
    /// Hours before the refresh time to keep.
    pub past_hours: Option<u32>,
    /// Hours after the refresh time to keep.
    pub future_hours: Option<u32>,
}

impl AppConfig {
    /// Loads config from a TOML file. Returns default if file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Channel set to fetch.
    #[must_use]
    pub fn channel_set(&self) -> ChannelSet {
        if self.channels.selected.is_empty() {
            ChannelSet::all()
        } else {
            ChannelSet::only(self.channels.selected.iter().cloned())
        }
    }
}

impl WindowConfig {
    /// Window extents as `(past, future)`.
    #[must_use]
    pub fn extents(&self) -> (Option<TimeDelta>, Option<TimeDelta>) {
        let hours = |h: u32| TimeDelta::hours(i64::from(h));
        (self.past_hours.map(hours), self.future_hours.map(hours))
    }
}
