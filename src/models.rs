// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// Content kind discriminant for a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelCategory {
    LiveTv,
    Movie,
    Series,
    RecentlyWatched,
}

/// Unified representation of any playable item: a live channel, a movie,
/// or a series episode.
///
/// `id` is stable for the lifetime of one cached catalog snapshot but is
/// not stable across reloads of an M3U source (the parser generates a
/// fresh UUID per entry on every parse). Callers must not persist
/// long-lived references to M3U-sourced ids across cache refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub stream_url: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub group_title: Option<String>,
    #[serde(default)]
    pub epg_channel_id: Option<String>,
    pub category: ChannelCategory,
    #[serde(default)]
    pub description: Option<String>,
    /// Provider-supplied rating. Free-form, may be non-numeric.
    #[serde(default)]
    pub rating: Option<String>,
    /// Runtime in minutes. VOD only.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Free-form, year-prefixed (e.g. "2023-05-01" or just "2023").
    #[serde(default)]
    pub release_date: Option<String>,
    /// Comma-separated genre tags.
    #[serde(default)]
    pub genre: Option<String>,
    /// Provider epoch-seconds string for when the item was added.
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default)]
    pub series_id: Option<u32>,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub episode_number: Option<u32>,
}

/// A scheduled broadcast slot from an XMLTV guide.
///
/// `channel_id` matches [`Channel::epg_channel_id`], not [`Channel::id`].
/// Programs for a channel are kept in document order: not deduplicated,
/// not sorted, and possibly overlapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgProgram {
    /// Generated per parse; not idempotent across re-parses.
    pub id: String,
    pub channel_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Epoch milliseconds.
    pub start_time: i64,
    /// Epoch milliseconds. Always >= `start_time`.
    pub end_time: i64,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl EpgProgram {
    /// True if `now` falls inside the slot, inclusive on both ends.
    pub fn is_live(&self, now: i64) -> bool {
        now >= self.start_time && now <= self.end_time
    }

    pub fn is_upcoming(&self, now: i64) -> bool {
        self.start_time > now
    }
}

/// One watch-history entry. At most one per channel id; re-adding a
/// channel replaces its entry and moves it to the front of the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentlyWatched {
    pub channel_id: String,
    /// Epoch milliseconds of the most recent play.
    pub timestamp: i64,
    #[serde(default)]
    pub last_position: i64,
    #[serde(default)]
    pub duration: i64,
}

/// Which configured source the repository loads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SourceType {
    #[default]
    M3u,
    Xtream,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XtreamCredentials {
    pub server_url: String,
    pub username: String,
    pub password: String,
}
