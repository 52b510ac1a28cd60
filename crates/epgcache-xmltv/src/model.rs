//! Channel and programme records shared by the fetch and transform stages.

use chrono::{DateTime, Utc};

/// A channel as listed by the upstream guide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    /// Stable channel identifier (upstream slug), used as the XMLTV channel id.
    pub id: String,
    /// Human-readable channel name.
    pub display_name: String,
    /// Channel logo URL.
    pub icon: Option<String>,
}

impl ChannelDescriptor {
    /// Creates a descriptor without an icon.
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            icon: None,
        }
    }
}

/// A single broadcast slot on one channel.
///
/// Records are built once from the upstream payload and never modified
/// afterwards. A record whose `start` is not before its `end` is still
/// representable so that the transformer can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgrammeRecord {
    /// Channel the programme airs on (joins to [`ChannelDescriptor::id`]).
    pub channel_id: String,
    /// Programme title, without any season/episode prefix.
    pub title: String,
    /// Programme description (may be empty).
    pub description: String,
    /// Broadcast start (UTC).
    pub start: DateTime<Utc>,
    /// Broadcast end (UTC).
    pub end: DateTime<Utc>,
    /// Season number, when the upstream title carried one.
    pub season: Option<u32>,
    /// Episode number, when the upstream title carried one.
    pub episode: Option<u32>,
    /// Programme artwork URL.
    pub icon: Option<String>,
}

impl ProgrammeRecord {
    /// Returns `true` if the programme starts strictly before it ends.
    #[must_use]
    pub fn has_valid_span(&self) -> bool {
        self.start < self.end
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeZone;

    use super::*;

    fn record(start_hour: u32, end_hour: u32) -> ProgrammeRecord {
        ProgrammeRecord {
            channel_id: String::from("nova"),
            title: String::from("News"),
            description: String::new(),
            start: Utc.with_ymd_and_hms(2024, 5, 1, start_hour, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 5, 1, end_hour, 0, 0).unwrap(),
            season: None,
            episode: None,
            icon: None,
        }
    }

    #[test]
    fn test_valid_span() {
        // Arrange & Act & Assert
        assert!(record(10, 11).has_valid_span());
    }

    #[test]
    fn test_zero_length_span_is_invalid() {
        // Arrange & Act & Assert
        assert!(!record(10, 10).has_valid_span());
    }

    #[test]
    fn test_inverted_span_is_invalid() {
        // Arrange & Act & Assert
        assert!(!record(11, 10).has_valid_span());
    }
}
