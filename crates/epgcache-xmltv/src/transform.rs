//! Groups programme records by channel and orders them by start time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::document::{ChannelListing, XmltvDocument};
use super::model::{ChannelDescriptor, ProgrammeRecord};

/// A data-quality problem with a single programme record.
///
/// These never abort a transform; they are collected in [`TransformReport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// The programme does not start before it ends.
    #[error("programme {title:?} on {channel_id} starts at {start} but ends at {end}")]
    MalformedRecord {
        /// Channel of the rejected programme.
        channel_id: String,
        /// Title of the rejected programme.
        title: String,
        /// Reported start.
        start: DateTime<Utc>,
        /// Reported end.
        end: DateTime<Utc>,
    },
    /// The programme references a channel that is not in the listing.
    #[error("programme {title:?} references unknown channel {channel_id}")]
    UnknownChannel {
        /// Unmatched channel id.
        channel_id: String,
        /// Title of the dropped programme.
        title: String,
    },
}

/// Counts of what a transform accepted and what it dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Programmes written to the document.
    pub accepted: usize,
    /// Programmes left out of the document, with the reason.
    pub rejected: Vec<TransformError>,
}

impl TransformReport {
    /// Number of programmes rejected for an invalid time span.
    #[must_use]
    pub fn malformed_count(&self) -> usize {
        self.rejected
            .iter()
            .filter(|e| matches!(e, TransformError::MalformedRecord { .. }))
            .count()
    }

    /// Number of programmes dropped for referencing an unknown channel.
    #[must_use]
    pub fn unknown_channel_count(&self) -> usize {
        self.rejected
            .iter()
            .filter(|e| matches!(e, TransformError::UnknownChannel { .. }))
            .count()
    }
}

/// Builds an [`XmltvDocument`] from fetched programmes and channels.
///
/// - Channels keep their input order; a repeated channel id keeps the first
///   descriptor.
/// - Programmes are grouped by channel and sorted by start time (stable, so
///   equal start times keep input order).
/// - Programmes with `start >= end` are rejected, and programmes on channels
///   missing from `channels` are dropped. Both are counted in the report.
#[must_use]
pub fn transform(
    programmes: Vec<ProgrammeRecord>,
    channels: &[ChannelDescriptor],
) -> (XmltvDocument, TransformReport) {
    let mut listings: Vec<ChannelListing> = Vec::with_capacity(channels.len());
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(channels.len());

    for channel in channels {
        if index.contains_key(channel.id.as_str()) {
            tracing::debug!(channel = %channel.id, "Duplicate channel in listing, keeping first");
            continue;
        }
        index.insert(channel.id.as_str(), listings.len());
        listings.push(ChannelListing {
            channel: channel.clone(),
            programmes: Vec::new(),
        });
    }

    let mut report = TransformReport::default();

    for programme in programmes {
        if !programme.has_valid_span() {
            tracing::warn!(
                channel = %programme.channel_id,
                title = %programme.title,
                start = %programme.start,
                end = %programme.end,
                "Rejected programme with non-positive duration"
            );
            report.rejected.push(TransformError::MalformedRecord {
                channel_id: programme.channel_id,
                title: programme.title,
                start: programme.start,
                end: programme.end,
            });
            continue;
        }

        let listing = index
            .get(programme.channel_id.as_str())
            .and_then(|&i| listings.get_mut(i));
        if let Some(listing) = listing {
            listing.programmes.push(programme);
            report.accepted = report.accepted.saturating_add(1);
        } else {
            tracing::debug!(
                channel = %programme.channel_id,
                title = %programme.title,
                "Dropped programme for unknown channel"
            );
            report.rejected.push(TransformError::UnknownChannel {
                channel_id: programme.channel_id,
                title: programme.title,
            });
        }
    }

    for listing in &mut listings {
        listing.programmes.sort_by_key(|p| p.start);
    }

    tracing::info!(
        channels = listings.len(),
        accepted = report.accepted,
        malformed = report.malformed_count(),
        unknown_channel = report.unknown_channel_count(),
        "XMLTV transform completed"
    );

    (XmltvDocument::new(listings), report)
}
