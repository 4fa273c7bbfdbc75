// SPDX-License-Identifier: MIT

//! Streaming XMLTV parser.
//!
//! Forward-only event loop over `quick-xml`. Tolerant by contract: a
//! malformed document yields whatever programmes were accumulated before
//! the error plus a warning, never an error to the caller. Programmes
//! are kept in document order per channel, neither deduplicated nor
//! sorted.

use crate::models::EpgProgram;
use chrono::DateTime;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Best-effort parse result: the per-channel programme map plus the
/// diagnostics accumulated along the way.
#[derive(Debug, Default)]
pub struct ParsedEpg {
    pub programs: HashMap<String, Vec<EpgProgram>>,
    pub warnings: Vec<String>,
}

impl ParsedEpg {
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn program_count(&self) -> usize {
        self.programs.values().map(|v| v.len()).sum()
    }
}

/// Text-bearing programme child currently being scanned.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Desc,
    Category,
}

impl Field {
    fn tag(self) -> &'static [u8] {
        match self {
            Field::Title => b"title",
            Field::Desc => b"desc",
            Field::Category => b"category",
        }
    }
}

#[derive(Debug, Default)]
struct PendingProgramme {
    channel_id: Option<String>,
    start_time: Option<i64>,
    end_time: Option<i64>,
    title: Option<String>,
    description: Option<String>,
    icon: Option<String>,
    category: Option<String>,
}

pub fn parse(xml: &str) -> ParsedEpg {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut epg = ParsedEpg::default();
    let mut pending: Option<PendingProgramme> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"programme" => {
                    pending = Some(PendingProgramme {
                        channel_id: get_attribute(e, b"channel"),
                        start_time: get_attribute(e, b"start").and_then(|s| parse_xmltv_date(&s)),
                        end_time: get_attribute(e, b"stop").and_then(|s| parse_xmltv_date(&s)),
                        ..PendingProgramme::default()
                    });
                    field = None;
                }
                b"title" if pending.is_some() => field = Some(Field::Title),
                b"desc" if pending.is_some() => field = Some(Field::Desc),
                b"category" if pending.is_some() => field = Some(Field::Category),
                b"icon" => {
                    if let Some(ref mut prog) = pending {
                        if prog.icon.is_none() {
                            prog.icon = get_attribute(e, b"src");
                        }
                    }
                }
                _ => {}
            },
            // Self-closing tags produce no End event, so only the
            // attribute-carrying icon matters here.
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"icon" {
                    if let Some(ref mut prog) = pending {
                        if prog.icon.is_none() {
                            prog.icon = get_attribute(e, b"src");
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                // Only the first text content before the closing tag counts.
                if let (Some(f), Some(prog)) = (field, pending.as_mut()) {
                    let text = e.xml_content().unwrap_or_default().trim().to_string();
                    if !text.is_empty() {
                        let slot = match f {
                            Field::Title => &mut prog.title,
                            Field::Desc => &mut prog.description,
                            Field::Category => &mut prog.category,
                        };
                        if slot.is_none() {
                            *slot = Some(text);
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                if name.as_ref() == b"programme" {
                    field = None;
                    if let Some(prog) = pending.take() {
                        emit(&mut epg.programs, prog);
                    }
                } else if field.is_some_and(|f| f.tag() == name.as_ref()) {
                    field = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                // Keep what we have; a broken feed is not fatal.
                let message = format!("XML error at byte {}: {}", reader.buffer_position(), e);
                warn!("{message}");
                epg.warnings.push(message);
                break;
            }
            _ => {}
        }
    }

    epg
}

/// A programme needs channel, title, start, and stop to be emitted;
/// anything else is dropped without diagnostics.
fn emit(programs: &mut HashMap<String, Vec<EpgProgram>>, prog: PendingProgramme) {
    let (Some(channel_id), Some(title), Some(start_time), Some(end_time)) =
        (prog.channel_id, prog.title, prog.start_time, prog.end_time)
    else {
        return;
    };

    let program = EpgProgram {
        id: Uuid::new_v4().to_string(),
        channel_id: channel_id.clone(),
        title,
        description: prog.description,
        start_time,
        end_time,
        icon: prog.icon,
        category: prog.category,
    };

    programs.entry(channel_id).or_default().push(program);
}

fn get_attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// XMLTV timestamps look like `20240115120000 +0000`. Anything that does
/// not parse yields `None`, which drops the whole programme.
fn parse_xmltv_date(value: &str) -> Option<i64> {
    DateTime::parse_from_str(value.trim(), "%Y%m%d%H%M%S %z")
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_programme() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="bbc1">
    <title>News at Noon</title>
    <desc>Daily news broadcast</desc>
    <icon src="http://example.com/news.png"/>
    <category>News</category>
  </programme>
</tv>"#;

        let epg = parse(xml);
        assert!(epg.warnings.is_empty());
        let programs = epg.programs.get("bbc1").unwrap();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "News at Noon");
        assert_eq!(programs[0].description.as_deref(), Some("Daily news broadcast"));
        assert_eq!(programs[0].icon.as_deref(), Some("http://example.com/news.png"));
        assert_eq!(programs[0].category.as_deref(), Some("News"));
        assert_eq!(programs[0].end_time - programs[0].start_time, 3_600_000);
    }

    #[test]
    fn timezone_offsets_shift_the_timestamp() {
        let xml = r#"<tv>
  <programme start="20240115120000 +0100" stop="20240115130000 +0100" channel="ch1"><title>A</title></programme>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="ch2"><title>B</title></programme>
</tv>"#;

        let epg = parse(xml);
        let a = &epg.programs.get("ch1").unwrap()[0];
        let b = &epg.programs.get("ch2").unwrap()[0];
        assert_eq!(b.start_time - a.start_time, 3_600_000);
    }

    #[test]
    fn programme_without_title_is_dropped() {
        let xml = r#"<tv>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="ch1">
    <desc>No title here</desc>
  </programme>
</tv>"#;

        assert!(parse(xml).is_empty());
    }

    #[test]
    fn unparseable_date_drops_the_programme() {
        let xml = r#"<tv>
  <programme start="not-a-date" stop="20240115130000 +0000" channel="ch1"><title>X</title></programme>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="ch1"><title>Y</title></programme>
</tv>"#;

        let epg = parse(xml);
        let programs = epg.programs.get("ch1").unwrap();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "Y");
    }

    #[test]
    fn malformed_tail_keeps_earlier_programmes() {
        let xml = r#"<tv>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="ch1"><title>One</title></programme>
  <programme start="20240115130000 +0000" stop="20240115140000 +0000" channel="ch1"><title>Two</title></programme>
  <programme start="20240115140000 +0000" stop="20240115150000 </tv>"#;

        let epg = parse(xml);
        assert_eq!(epg.programs.get("ch1").unwrap().len(), 2);
        assert!(!epg.warnings.is_empty());
    }

    #[test]
    fn nested_elements_before_title_text_are_tolerated() {
        let xml = r#"<tv>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="ch1">
    <title><sub-title/>Actual Title</title>
  </programme>
</tv>"#;

        let epg = parse(xml);
        assert_eq!(epg.programs.get("ch1").unwrap()[0].title, "Actual Title");
    }

    #[test]
    fn document_order_is_preserved_without_sorting() {
        let xml = r#"<tv>
  <programme start="20240115140000 +0000" stop="20240115150000 +0000" channel="ch1"><title>Later</title></programme>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="ch1"><title>Earlier</title></programme>
</tv>"#;

        let epg = parse(xml);
        let programs = epg.programs.get("ch1").unwrap();
        assert_eq!(programs[0].title, "Later");
        assert_eq!(programs[1].title, "Earlier");
    }

    #[test]
    fn entities_in_attributes_are_unescaped() {
        let xml = r#"<tv>
  <programme start="20240115120000 +0000" stop="20240115130000 +0000" channel="a&amp;b"><title>T</title></programme>
</tv>"#;

        let epg = parse(xml);
        assert!(epg.programs.contains_key("a&b"));
    }
}
