//! Asset conversion helpers.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use epgcache_xmltv::ProgrammeRecord;
use regex::Regex;

use super::types::RedbeeAsset;

/// Regex for titles of the form `S01 E05 Rest of title`.
#[allow(clippy::expect_used)]
static EPISODE_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^S(\d+)\s+E(\d+)\s+(.+)$").expect("failed to compile episode title regex")
});

/// Splits a season/episode prefix off an asset title.
///
/// Returns the remaining title with `Some(season)`/`Some(episode)` when the
/// title starts with `S<n> E<n> `, otherwise the trimmed title unchanged.
///
/// # Input format
///
/// ```text
/// S02 E11 The Title
/// ```
#[must_use]
pub fn split_episode_title(raw: &str) -> (String, Option<u32>, Option<u32>) {
    let trimmed = raw.trim();
    let parsed = EPISODE_TITLE_RE.captures(trimmed).and_then(|caps| {
        let season = caps.get(1)?.as_str().parse::<u32>().ok()?;
        let episode = caps.get(2)?.as_str().parse::<u32>().ok()?;
        let title = caps.get(3)?.as_str().trim().to_owned();
        Some((title, Some(season), Some(episode)))
    });
    parsed.unwrap_or_else(|| (trimmed.to_owned(), None, None))
}

/// Parses an ISO-8601 asset timestamp into UTC.
///
/// # Errors
///
/// Returns an error if the string is not RFC 3339.
pub fn parse_asset_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid asset timestamp: {s}"))
}

/// Converts an upstream asset into a programme record on `channel_id`.
///
/// The span is not validated here; the transformer reports bad spans.
///
/// # Errors
///
/// Returns an error if either timestamp cannot be parsed.
pub fn to_programme_record(channel_id: &str, asset: RedbeeAsset) -> Result<ProgrammeRecord> {
    let start = parse_asset_time(&asset.start_time)?;
    let end = parse_asset_time(&asset.end_time)?;
    let (title, season, episode) = split_episode_title(&asset.title);

    Ok(ProgrammeRecord {
        channel_id: channel_id.to_owned(),
        title,
        description: asset.description.unwrap_or_default(),
        start,
        end,
        season,
        episode,
        icon: asset.images.into_iter().find_map(|i| i.url),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeZone;

    use super::*;
    use crate::redbee::types::RedbeeImage;

    fn asset(title: &str, start: &str, end: &str) -> RedbeeAsset {
        RedbeeAsset {
            title: String::from(title),
            description: Some(String::from("Synopsis")),
            start_time: String::from(start),
            end_time: String::from(end),
            images: vec![RedbeeImage {
                url: Some(String::from("https://img.example/a.jpg")),
            }],
        }
    }

    #[test]
    fn test_split_episode_title() {
        // Arrange & Act
        let (title, season, episode) = split_episode_title("S02 E11 The Title");

        // Assert
        assert_eq!(title, "The Title");
        assert_eq!(season, Some(2));
        assert_eq!(episode, Some(11));
    }

    #[test]
    fn test_split_plain_title() {
        // Arrange & Act
        let (title, season, episode) = split_episode_title("  Evening News ");

        // Assert
        assert_eq!(title, "Evening News");
        assert_eq!(season, None);
        assert_eq!(episode, None);
    }

    #[test]
    fn test_split_requires_numbers() {
        // Arrange & Act
        let (title, season, _) = split_episode_title("Super Extra Show");

        // Assert
        assert_eq!(title, "Super Extra Show");
        assert_eq!(season, None);
    }

    #[test]
    fn test_split_prefix_without_rest_is_plain() {
        // Arrange & Act
        let (title, season, _) = split_episode_title("S01 E02");

        // Assert
        assert_eq!(title, "S01 E02");
        assert_eq!(season, None);
    }

    #[test]
    fn test_parse_asset_time_with_offset_and_fraction() {
        // Arrange & Act
        let t = parse_asset_time("2024-05-01T08:30:00.000+02:00").unwrap();

        // Assert
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_asset_time_invalid() {
        // Arrange & Act
        let result = parse_asset_time("yesterday");

        // Assert
        assert!(result.unwrap_err().to_string().contains("invalid asset timestamp"));
    }

    #[test]
    fn test_to_programme_record() {
        // Arrange
        let a = asset("S01 E03 Pilot", "2024-05-01T06:00:00Z", "2024-05-01T07:00:00Z");

        // Act
        let record = to_programme_record("nova-tv", a).unwrap();

        // Assert
        assert_eq!(record.channel_id, "nova-tv");
        assert_eq!(record.title, "Pilot");
        assert_eq!(record.season, Some(1));
        assert_eq!(record.episode, Some(3));
        assert_eq!(record.description, "Synopsis");
        assert_eq!(record.icon.as_deref(), Some("https://img.example/a.jpg"));
        assert!(record.has_valid_span());
    }

    #[test]
    fn test_to_programme_record_keeps_inverted_span() {
        // Arrange
        let a = asset("News", "2024-05-01T07:00:00Z", "2024-05-01T06:00:00Z");

        // Act
        let record = to_programme_record("nova-tv", a).unwrap();

        // Assert
        assert!(!record.has_valid_span());
    }
}
