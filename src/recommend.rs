// SPDX-License-Identifier: MIT

//! Watch-history driven recommendations.
//!
//! Pure scoring over history + catalog, no I/O. Recent watches weigh
//! more; their genres and categories become preference weights, and
//! every unwatched channel is scored against those preferences with
//! small bonuses for high ratings and recent releases.

use crate::models::{Channel, ChannelCategory, RecentlyWatched};
use chrono::Datelike;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 30;

const GENRE_FACTOR: f64 = 2.0;
const CATEGORY_FACTOR: f64 = 1.5;
const RATING_THRESHOLD: f64 = 7.0;
const RATING_FACTOR: f64 = 0.5;
const RECENT_RELEASE_BONUS: f64 = 2.0;
const RECENT_RELEASE_WINDOW_YEARS: i32 = 3;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

struct Preferences {
    genre_weights: HashMap<String, f64>,
    category_weights: HashMap<ChannelCategory, f64>,
}

pub fn generate_recommendations(
    watch_history: &[RecentlyWatched],
    all_channels: &[Channel],
    max_recommendations: usize,
) -> Vec<Channel> {
    generate_recommendations_at(
        watch_history,
        all_channels,
        max_recommendations,
        crate::cache::now_ms(),
    )
}

/// Same as [`generate_recommendations`] with an explicit clock, which
/// also fixes the calendar year used for the recent-release bonus.
pub fn generate_recommendations_at(
    watch_history: &[RecentlyWatched],
    all_channels: &[Channel],
    max_recommendations: usize,
    now: i64,
) -> Vec<Channel> {
    if watch_history.is_empty() || all_channels.is_empty() {
        return Vec::new();
    }

    let watched_ids: HashSet<&str> = watch_history.iter().map(|e| e.channel_id.as_str()).collect();
    let watched_channels: Vec<&Channel> = all_channels
        .iter()
        .filter(|c| watched_ids.contains(c.id.as_str()))
        .collect();

    // History referencing channels no longer in the catalog tells us
    // nothing about taste.
    if watched_channels.is_empty() {
        return Vec::new();
    }

    let preferences = calculate_preferences(&watched_channels, watch_history, now);
    let current_year = chrono::DateTime::from_timestamp_millis(now)
        .map(|dt| dt.year())
        .unwrap_or(1970);

    let mut scored: Vec<(&Channel, f64)> = all_channels
        .iter()
        .filter(|c| !watched_ids.contains(c.id.as_str()))
        .map(|c| (c, score_channel(c, &preferences, current_year)))
        .filter(|(_, score)| *score > 0.0)
        .collect();

    // Stable sort: equal scores keep catalog order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(max_recommendations);

    scored.into_iter().map(|(c, _)| c.clone()).collect()
}

fn calculate_preferences(
    watched_channels: &[&Channel],
    watch_history: &[RecentlyWatched],
    now: i64,
) -> Preferences {
    let mut genre_weights: HashMap<String, f64> = HashMap::new();
    let mut category_weights: HashMap<ChannelCategory, f64> = HashMap::new();

    for channel in watched_channels {
        let age_ms = watch_history
            .iter()
            .find(|e| e.channel_id == channel.id)
            .map(|e| now - e.timestamp)
            .unwrap_or(i64::MAX);
        let weight = recency_weight(age_ms);

        for genre in genre_tokens(channel.genre.as_deref()) {
            *genre_weights.entry(genre).or_insert(0.0) += weight;
        }
        *category_weights.entry(channel.category).or_insert(0.0) += weight;
    }

    Preferences {
        genre_weights,
        category_weights,
    }
}

fn recency_weight(age_ms: i64) -> f64 {
    if age_ms < DAY_MS {
        5.0
    } else if age_ms < 7 * DAY_MS {
        3.0
    } else if age_ms < 30 * DAY_MS {
        1.5
    } else {
        1.0
    }
}

fn score_channel(channel: &Channel, preferences: &Preferences, current_year: i32) -> f64 {
    let mut score = 0.0;

    for genre in genre_tokens(channel.genre.as_deref()) {
        if let Some(weight) = preferences.genre_weights.get(&genre) {
            score += weight * GENRE_FACTOR;
        }
    }

    if let Some(weight) = preferences.category_weights.get(&channel.category) {
        score += weight * CATEGORY_FACTOR;
    }

    // Non-numeric ratings contribute nothing.
    if let Some(rating) = channel.rating.as_deref().and_then(|r| r.parse::<f64>().ok()) {
        if rating >= RATING_THRESHOLD {
            score += rating * RATING_FACTOR;
        }
    }

    if let Some(year) = channel
        .release_date
        .as_deref()
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse::<i32>().ok())
    {
        if year >= current_year - RECENT_RELEASE_WINDOW_YEARS {
            score += RECENT_RELEASE_BONUS;
        }
    }

    score
}

/// Genre matching is case- and whitespace-insensitive.
fn genre_tokens(genre: Option<&str>) -> Vec<String> {
    genre
        .map(|g| {
            g.split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
