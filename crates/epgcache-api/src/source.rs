//! `GuideSource` trait and fetch parameters.
#![allow(clippy::future_not_send)]

use chrono::{DateTime, TimeDelta, Utc};
use epgcache_xmltv::{ChannelDescriptor, ProgrammeRecord};

use super::error::UpstreamError;

/// Channels to fetch. An empty selection means every listed channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSet {
    selected: Vec<String>,
}

impl ChannelSet {
    /// Selects every channel of the upstream listing.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            selected: Vec::new(),
        }
    }

    /// Selects only the given channel ids.
    #[must_use]
    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `channel_id` should be fetched.
    #[must_use]
    pub fn includes(&self, channel_id: &str) -> bool {
        self.selected.is_empty() || self.selected.iter().any(|id| id == channel_id)
    }

    /// Explicitly selected ids (empty for "all").
    #[must_use]
    pub fn selected(&self) -> &[String] {
        &self.selected
    }
}

/// Half-open time window `[start, end)`; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchWindow {
    /// Earliest instant of interest.
    pub start: Option<DateTime<Utc>>,
    /// Instant after which programmes are not of interest.
    pub end: Option<DateTime<Utc>>,
}

impl FetchWindow {
    /// A window with no bounds.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// A window reaching `past` before and `future` after `now`.
    /// `None` leaves that side open.
    #[must_use]
    pub fn around(now: DateTime<Utc>, past: Option<TimeDelta>, future: Option<TimeDelta>) -> Self {
        Self {
            start: past.and_then(|d| now.checked_sub_signed(d)),
            end: future.and_then(|d| now.checked_add_signed(d)),
        }
    }

    /// Returns `true` if a programme spanning `[start, end)` overlaps the window.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| end > s) && self.end.is_none_or(|e| start < e)
    }
}

/// Raw result of one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guide {
    /// Channels of the listing, in listing order.
    pub channels: Vec<ChannelDescriptor>,
    /// Programmes across all fetched channels, in upstream order.
    pub programmes: Vec<ProgrammeRecord>,
    /// Assets that could not be decoded into programme records.
    pub skipped_assets: usize,
}

/// Source of guide data.
///
/// Implementations make network calls only; they hold no shared mutable
/// state and do not retry. Uses `trait_variant::make` to generate a
/// `Send`-bound async trait.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(GuideSource: Send)]
pub trait LocalGuideSource {
    /// Fetches channels and programmes.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Transient`] for failures worth retrying and
    /// [`UpstreamError::Permanent`] otherwise.
    async fn fetch(&self, channels: &ChannelSet, window: &FetchWindow)
    -> Result<Guide, UpstreamError>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_channel_set_all_includes_everything() {
        // Arrange
        let set = ChannelSet::all();

        // Act & Assert
        assert!(set.includes("nova"));
        assert!(set.includes("anything"));
    }

    #[test]
    fn test_channel_set_only() {
        // Arrange
        let set = ChannelSet::only(["nova", "doma"]);

        // Act & Assert
        assert!(set.includes("doma"));
        assert!(!set.includes("cinema"));
        assert_eq!(set.selected().len(), 2);
    }

    #[test]
    fn test_unbounded_window_overlaps_everything() {
        // Arrange
        let window = FetchWindow::unbounded();

        // Act & Assert
        assert!(window.overlaps(at(0), at(1)));
    }

    #[test]
    fn test_window_overlap_edges() {
        // Arrange
        let window =
            FetchWindow::around(at(12), Some(TimeDelta::hours(2)), Some(TimeDelta::hours(2)));

        // Act & Assert
        assert!(window.overlaps(at(9), at(11)));
        assert!(window.overlaps(at(13), at(15)));
        // Ends exactly at the window start.
        assert!(!window.overlaps(at(8), at(10)));
        // Starts exactly at the window end.
        assert!(!window.overlaps(at(14), at(15)));
    }

    #[test]
    fn test_window_with_open_future() {
        // Arrange
        let window = FetchWindow::around(at(12), Some(TimeDelta::hours(1)), None);

        // Act & Assert
        assert_eq!(window.start, Some(at(11)));
        assert_eq!(window.end, None);
        assert!(window.overlaps(at(22), at(23)));
        assert!(!window.overlaps(at(9), at(10)));
    }
}
