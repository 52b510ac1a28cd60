//! Red Bee exposure API response types.

use serde::de::Error;
use serde::{Deserialize, Deserializer};

/// Deserializes a JSON string or number as a `String`.
///
/// Component ids are strings in current responses, but older ones used numbers.
pub fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Channel listing component.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingResponse {
    /// Listed channels, in display order.
    #[serde(default)]
    pub channels: Vec<ListingEntry>,
}

/// One entry of the listing component.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingEntry {
    /// The channel itself.
    pub channel: RedbeeChannel,
}

/// A channel as described by the listing.
#[derive(Debug, Clone, Deserialize)]
#[allow(clippy::module_name_repetitions)]
pub struct RedbeeChannel {
    /// URL slugs; the first one identifies the channel.
    #[serde(default)]
    pub slugs: Vec<String>,
    /// Display title.
    pub title: String,
    /// Channel logos.
    #[serde(default)]
    pub images: Vec<RedbeeImage>,
    /// Link to the channel's component page.
    #[serde(default)]
    pub action: Option<ChannelAction>,
}

/// Navigation target of a listed channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelAction {
    /// API path of the channel component.
    #[serde(rename = "internalUrl")]
    pub internal_url: String,
}

/// An image reference.
#[derive(Debug, Clone, Deserialize)]
pub struct RedbeeImage {
    /// Absolute image URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// Channel component page.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentResponse {
    /// Component id.
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    /// Child components.
    #[serde(default)]
    pub components: Vec<ComponentRef>,
}

/// A child component reference.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentRef {
    /// Child component id.
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    /// API path of the child component.
    #[serde(rename = "internalUrl", default)]
    pub internal_url: Option<String>,
}

impl ComponentResponse {
    /// Returns the path of the `generator-epg-{id}` child component.
    #[must_use]
    pub fn epg_url(&self) -> Option<&str> {
        let wanted = format!("generator-epg-{}", self.id);
        self.components
            .iter()
            .find(|c| c.id == wanted)
            .and_then(|c| c.internal_url.as_deref())
    }
}

/// EPG generator component.
#[derive(Debug, Clone, Deserialize)]
pub struct EpgResponse {
    /// Scheduled assets.
    #[serde(default)]
    pub assets: Vec<RedbeeAsset>,
}

/// A scheduled programme as delivered upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::module_name_repetitions)]
pub struct RedbeeAsset {
    /// Raw title, possibly prefixed with `S<n> E<n>`.
    pub title: String,
    /// Synopsis.
    #[serde(default)]
    pub description: Option<String>,
    /// ISO-8601 start time (e.g. `"2024-05-01T06:00:00Z"`).
    pub start_time: String,
    /// ISO-8601 end time.
    pub end_time: String,
    /// Programme artwork.
    #[serde(default)]
    pub images: Vec<RedbeeImage>,
}
