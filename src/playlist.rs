// SPDX-License-Identifier: MIT

//! Extended-M3U playlist parsing.
//!
//! Single pass, line oriented. An `#EXTINF:` directive opens a pending
//! entry; the next non-empty, non-comment line is its stream URL and
//! closes the record. Anything malformed is skipped silently: this
//! parser never fails, worst case is an empty result.

use crate::models::{Channel, ChannelCategory};
use uuid::Uuid;

const EXTINF: &str = "#EXTINF:";

pub fn parse(content: &str) -> Vec<Channel> {
    let mut channels = Vec::new();
    let mut pending: Option<PendingEntry> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(info) = line.strip_prefix(EXTINF) {
            pending = Some(PendingEntry {
                name: extract_name(info),
                logo_url: extract_attribute(line, "tvg-logo"),
                group_title: extract_attribute(line, "group-title"),
                epg_channel_id: extract_attribute(line, "tvg-id"),
            });
        } else if !line.is_empty() && !line.starts_with('#') {
            // A URL with no preceding directive is skipped, not an error.
            if let Some(entry) = pending.take() {
                channels.push(entry.into_channel(line));
            }
        }
    }

    channels
}

struct PendingEntry {
    name: String,
    logo_url: Option<String>,
    group_title: Option<String>,
    epg_channel_id: Option<String>,
}

impl PendingEntry {
    fn into_channel(self, stream_url: &str) -> Channel {
        Channel {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            stream_url: stream_url.to_string(),
            logo_url: self.logo_url,
            group_title: self.group_title,
            epg_channel_id: self.epg_channel_id,
            category: ChannelCategory::LiveTv,
            description: None,
            rating: None,
            duration: None,
            release_date: None,
            genre: None,
            added: None,
            series_id: None,
            season_number: None,
            episode_number: None,
        }
    }
}

/// Display name is everything after the last comma on the directive line.
fn extract_name(info: &str) -> String {
    match info.rfind(',') {
        Some(pos) if pos + 1 < info.len() => {
            let name = info[pos + 1..].trim();
            if name.is_empty() {
                "Unknown Channel".to_string()
            } else {
                name.to_string()
            }
        }
        _ => "Unknown Channel".to_string(),
    }
}

/// First `name="value"` occurrence on the line, in any position.
/// Malformed attribute syntax yields `None`, never a parse failure.
fn extract_attribute(line: &str, name: &str) -> Option<String> {
    let marker = format!("{name}=\"");
    let start = line.find(&marker)? + marker.len();
    let end = line[start..].find('"')?;
    Some(line[start..start + end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_after_last_comma() {
        let content = "#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"cnn.us\" tvg-logo=\"http://logos/cnn.png\" group-title=\"News\",CNN, International\n\
            http://example.com/live/1.ts\n";

        let channels = parse(content);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "International");
        assert_eq!(channels[0].group_title.as_deref(), Some("News"));
        assert_eq!(channels[0].epg_channel_id.as_deref(), Some("cnn.us"));
        assert_eq!(
            channels[0].logo_url.as_deref(),
            Some("http://logos/cnn.png")
        );
        assert_eq!(channels[0].category, ChannelCategory::LiveTv);
    }

    #[test]
    fn attributes_in_any_order_or_absent() {
        let content = "#EXTINF:-1 group-title=\"Sports\" tvg-id=\"espn\",ESPN\n\
            http://example.com/2.ts\n";

        let channels = parse(content);
        assert_eq!(channels[0].group_title.as_deref(), Some("Sports"));
        assert_eq!(channels[0].epg_channel_id.as_deref(), Some("espn"));
        assert!(channels[0].logo_url.is_none());
    }

    #[test]
    fn missing_name_falls_back() {
        let channels = parse("#EXTINF:-1 tvg-id=\"x\"\nhttp://example.com/3.ts\n");
        assert_eq!(channels[0].name, "Unknown Channel");

        let channels = parse("#EXTINF:-1,\nhttp://example.com/4.ts\n");
        assert_eq!(channels[0].name, "Unknown Channel");
    }

    #[test]
    fn directive_without_url_produces_nothing() {
        let channels = parse("#EXTINF:-1,Dangling Channel\n");
        assert!(channels.is_empty());
    }

    #[test]
    fn url_without_directive_is_skipped() {
        let content = "http://orphan.example.com/1.ts\n\
            #EXTINF:-1,Real Channel\n\
            http://example.com/real.ts\n";

        let channels = parse(content);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Real Channel");
    }

    #[test]
    fn comments_and_blank_lines_between_directive_and_url() {
        let content = "#EXTINF:-1,Channel A\n\
            \n\
            #EXTVLCOPT:something\n\
            http://example.com/a.ts\n";

        let channels = parse(content);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].stream_url, "http://example.com/a.ts");
    }

    #[test]
    fn ids_are_fresh_per_parse() {
        let content = "#EXTINF:-1,Channel\nhttp://example.com/1.ts\n";
        let first = parse(content);
        let second = parse(content);
        assert_ne!(first[0].id, second[0].id);
    }
}
