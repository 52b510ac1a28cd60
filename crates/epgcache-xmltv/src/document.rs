//! `XmltvDocument` and its XMLTV serialization.

use std::fmt::Display;
use std::io::Write;

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::model::{ChannelDescriptor, ProgrammeRecord};

/// Value of the `generator-info-name` attribute on `<tv>`.
const GENERATOR_NAME: &str = "epgcache";

/// Serialization failure. Fatal for the refresh cycle that hit it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmltvError {
    /// The XML writer failed.
    #[error("failed to write XMLTV document: {0}")]
    Write(String),
}

impl XmltvError {
    fn write(err: impl Display) -> Self {
        Self::Write(err.to_string())
    }
}

/// One channel together with its programmes, ordered by start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListing {
    /// The channel.
    pub channel: ChannelDescriptor,
    /// Programmes on this channel.
    pub programmes: Vec<ProgrammeRecord>,
}

/// An XMLTV guide built by [`crate::transform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmltvDocument {
    channels: Vec<ChannelListing>,
}

/// Formats an instant as an XMLTV timestamp (`YYYYMMDDHHMMSS +0000`).
#[must_use]
pub fn format_xmltv_time(t: &DateTime<Utc>) -> String {
    t.format("%Y%m%d%H%M%S +0000").to_string()
}

impl XmltvDocument {
    pub(crate) const fn new(channels: Vec<ChannelListing>) -> Self {
        Self { channels }
    }

    /// Channel listings in document order.
    #[must_use]
    pub fn channels(&self) -> &[ChannelListing] {
        &self.channels
    }

    /// Total number of programmes across all channels.
    #[must_use]
    pub fn programme_count(&self) -> usize {
        self.channels.iter().map(|l| l.programmes.len()).sum()
    }

    /// Serializes the document as UTF-8 XMLTV.
    ///
    /// All `<channel>` elements come first, followed by every channel's
    /// `<programme>` elements in channel order.
    ///
    /// # Errors
    ///
    /// Returns [`XmltvError::Write`] if the XML writer fails.
    pub fn to_xml(&self) -> Result<Vec<u8>, XmltvError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(XmltvError::write)?;

        let mut tv = BytesStart::new("tv");
        tv.push_attribute(("generator-info-name", GENERATOR_NAME));
        writer
            .write_event(Event::Start(tv))
            .map_err(XmltvError::write)?;

        for listing in &self.channels {
            write_channel(&mut writer, &listing.channel)?;
        }
        for listing in &self.channels {
            for programme in &listing.programmes {
                write_programme(&mut writer, programme)?;
            }
        }

        writer
            .write_event(Event::End(BytesEnd::new("tv")))
            .map_err(XmltvError::write)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn write_channel<W: Write>(
    writer: &mut Writer<W>,
    channel: &ChannelDescriptor,
) -> Result<(), XmltvError> {
    let mut start = BytesStart::new("channel");
    start.push_attribute(("id", channel.id.as_str()));
    writer
        .write_event(Event::Start(start))
        .map_err(XmltvError::write)?;

    write_text_element(writer, "display-name", &[], &channel.display_name)?;
    if let Some(ref icon) = channel.icon {
        write_empty_element(writer, "icon", &[("src", icon)])?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("channel")))
        .map_err(XmltvError::write)
}

fn write_programme<W: Write>(
    writer: &mut Writer<W>,
    programme: &ProgrammeRecord,
) -> Result<(), XmltvError> {
    let start_time = format_xmltv_time(&programme.start);
    let stop_time = format_xmltv_time(&programme.end);

    let mut start = BytesStart::new("programme");
    start.push_attribute(("start", start_time.as_str()));
    start.push_attribute(("stop", stop_time.as_str()));
    start.push_attribute(("channel", programme.channel_id.as_str()));
    writer
        .write_event(Event::Start(start))
        .map_err(XmltvError::write)?;

    write_text_element(writer, "title", &[], &programme.title)?;
    if !programme.description.is_empty() {
        write_text_element(writer, "desc", &[], &programme.description)?;
    }
    if let (Some(season), Some(episode)) = (programme.season, programme.episode) {
        let onscreen = format!("S{season:02}E{episode:02}");
        write_text_element(writer, "episode-num", &[("system", "onscreen")], &onscreen)?;
        // xmltv_ns numbering is zero-based.
        let ns = format!(
            "{}.{}.",
            season.saturating_sub(1),
            episode.saturating_sub(1)
        );
        write_text_element(writer, "episode-num", &[("system", "xmltv_ns")], &ns)?;
    }
    if let Some(ref icon) = programme.icon {
        write_empty_element(writer, "icon", &[("src", icon)])?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("programme")))
        .map_err(XmltvError::write)
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attributes: &[(&str, &str)],
    text: &str,
) -> Result<(), XmltvError> {
    let mut start = BytesStart::new(name);
    for &attribute in attributes {
        start.push_attribute(attribute);
    }
    writer
        .write_event(Event::Start(start))
        .map_err(XmltvError::write)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(XmltvError::write)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(XmltvError::write)
}

fn write_empty_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attributes: &[(&str, &str)],
) -> Result<(), XmltvError> {
    let mut element = BytesStart::new(name);
    for &attribute in attributes {
        element.push_attribute(attribute);
    }
    writer
        .write_event(Event::Empty(element))
        .map_err(XmltvError::write)
}
