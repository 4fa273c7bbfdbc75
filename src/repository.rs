// SPDX-License-Identifier: MIT

//! Catalog orchestration: cache-first loading, source dispatch, and the
//! pure projections (recommendations, history, favorites) over the
//! loaded catalog.

use crate::cache::{CacheStore, StorageBackend};
use crate::config::Config;
use crate::epg::EpgSource;
use crate::error::{Error, Result};
use crate::models::{Channel, EpgProgram, RecentlyWatched, SourceType, XtreamCredentials};
use crate::playlist;
use crate::recommend;
use crate::xtream::{AuthResponse, SeriesListing, XtreamClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Where the last `load_channels` call left the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Empty,
    Loading,
    Loaded,
    Failed,
}

/// Session-scoped orchestrator over one [`CacheStore`].
///
/// Concurrent `load_channels` calls are not coalesced: both may hit the
/// network and the last cache write wins. This mirrors the observed
/// behavior of the system and is a documented limitation, not a defect.
pub struct ContentRepository<S: StorageBackend> {
    cache: CacheStore<S>,
    config: Config,
    http: reqwest::Client,
    catalog: Mutex<Vec<Channel>>,
    epg: Mutex<HashMap<String, Vec<EpgProgram>>>,
    state: Mutex<LoadState>,
    // Created at most once per credential set; re-auth replaces it.
    xtream: Mutex<Option<Arc<XtreamClient>>>,
}

impl<S: StorageBackend> ContentRepository<S> {
    pub fn new(cache: CacheStore<S>, config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.network.connect_timeout_secs))
            .timeout(Duration::from_secs(config.network.read_timeout_secs))
            .build()?;

        Ok(Self {
            cache,
            config,
            http,
            catalog: Mutex::new(Vec::new()),
            epg: Mutex::new(HashMap::new()),
            state: Mutex::new(LoadState::Empty),
            xtream: Mutex::new(None),
        })
    }

    pub fn cache(&self) -> &CacheStore<S> {
        &self.cache
    }

    pub fn load_state(&self) -> LoadState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Loads the catalog, cache first.
    ///
    /// Unless forced, a valid non-empty cached snapshot is returned
    /// without touching the network. Otherwise the active source type's
    /// loader runs; an empty loader result is the policy failure
    /// "no channels found" even though the network call succeeded, and
    /// a non-empty result is written through to the cache before it is
    /// returned.
    pub async fn load_channels(&self, force_refresh: bool) -> Result<Vec<Channel>> {
        if !force_refresh {
            if let Some(cached) = self.cache.cached_channels() {
                if !cached.is_empty() {
                    debug!(channels = cached.len(), "serving catalog from cache");
                    *self.catalog.lock().unwrap_or_else(|e| e.into_inner()) = cached.clone();
                    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = LoadState::Loaded;
                    return Ok(cached);
                }
            }
        }

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = LoadState::Loading;

        let result = match self.cache.source_type() {
            SourceType::M3u => self.load_m3u_channels().await,
            SourceType::Xtream => self.load_xtream_channels().await,
        };

        let channels = match result {
            Ok(channels) if channels.is_empty() => {
                *self.state.lock().unwrap_or_else(|e| e.into_inner()) = LoadState::Failed;
                return Err(Error::NoChannels);
            }
            Ok(channels) => channels,
            Err(e) => {
                *self.state.lock().unwrap_or_else(|e| e.into_inner()) = LoadState::Failed;
                return Err(e);
            }
        };

        self.cache.cache_channels(&channels)?;
        *self.catalog.lock().unwrap_or_else(|e| e.into_inner()) = channels.clone();
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = LoadState::Loaded;
        Ok(channels)
    }

    async fn load_m3u_channels(&self) -> Result<Vec<Channel>> {
        let url = self.cache.m3u_url().ok_or(Error::MissingSource("M3U URL"))?;

        debug!(url, "downloading M3U playlist");
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::BadResponse {
                url,
                message: format!("HTTP status {}", response.status()),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(Error::BadResponse {
                url,
                message: "empty playlist response".to_string(),
            });
        }

        Ok(playlist::parse(&body))
    }

    async fn load_xtream_channels(&self) -> Result<Vec<Channel>> {
        let client = self.xtream_client()?;
        let mut channels = Vec::new();

        // Mirrors the per-call tolerance of the catalog screens: a bad
        // response from one listing skips it, a transport error aborts.
        match client.get_live_streams(None).await {
            Ok(streams) => {
                channels.extend(streams.iter().map(|s| client.live_to_channel(s)));
            }
            Err(e @ Error::BadResponse { .. }) => {
                warn!(error = %e, "live stream listing failed, continuing with VOD");
            }
            Err(e) => return Err(e),
        }

        match client.get_vod_streams(None).await {
            Ok(streams) => {
                channels.extend(streams.iter().map(|s| client.vod_to_channel(s)));
            }
            Err(e @ Error::BadResponse { .. }) => {
                warn!(error = %e, "VOD listing failed, continuing with live only");
            }
            Err(e) => return Err(e),
        }

        Ok(channels)
    }

    /// Returns the lazily-created panel client, building it from the
    /// stored credentials on first use.
    fn xtream_client(&self) -> Result<Arc<XtreamClient>> {
        let mut handle = self.xtream.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = handle.as_ref() {
            return Ok(client.clone());
        }

        let credentials = self
            .cache
            .xtream_credentials()
            .ok_or(Error::MissingSource("Xtream credentials"))?;
        let client = Arc::new(XtreamClient::new(&credentials, &self.config.network)?);
        *handle = Some(client.clone());
        Ok(client)
    }

    /// Verifies the credentials against the panel and, on success,
    /// persists them and makes Xtream the active source.
    pub async fn authenticate_xtream(
        &self,
        credentials: &XtreamCredentials,
    ) -> Result<AuthResponse> {
        let client = Arc::new(XtreamClient::new(credentials, &self.config.network)?);
        let auth = client.authenticate().await?;

        self.cache.set_xtream_credentials(credentials)?;
        self.cache.set_source_type(SourceType::Xtream)?;
        *self.xtream.lock().unwrap_or_else(|e| e.into_inner()) = Some(client);

        Ok(auth)
    }

    /// Stores the playlist URL and makes M3U the active source.
    pub fn set_m3u_url(&self, url: &str) -> Result<()> {
        self.cache.set_m3u_url(url)?;
        self.cache.set_source_type(SourceType::M3u)
    }

    // EPG

    /// Downloads guide data (honoring the fallback chain when no URL is
    /// given), keeps it in memory for lookups, and writes it through to
    /// the cache under the current cache epoch.
    pub async fn load_epg(
        &self,
        url: Option<&str>,
        force_refresh: bool,
    ) -> Result<HashMap<String, Vec<EpgProgram>>> {
        if !force_refresh {
            if let Some(cached) = self.cache.cached_epg() {
                if !cached.is_empty() {
                    *self.epg.lock().unwrap_or_else(|e| e.into_inner()) = cached.clone();
                    return Ok(cached);
                }
            }
        }

        let source = EpgSource::new(&self.config.network, self.config.epg.clone())?;
        let programs = source.download_epg(url).await?;
        self.cache.cache_epg(&programs)?;
        *self.epg.lock().unwrap_or_else(|e| e.into_inner()) = programs.clone();
        Ok(programs)
    }

    /// (now, next) for a channel, over the in-memory guide.
    pub fn now_and_next(
        &self,
        channel: &Channel,
    ) -> (Option<EpgProgram>, Option<EpgProgram>) {
        let epg = self.epg.lock().unwrap_or_else(|e| e.into_inner());
        let (current, upcoming) = crate::epg::current_and_upcoming(
            channel.epg_channel_id.as_deref(),
            &epg,
            crate::cache::now_ms(),
        );
        (current.cloned(), upcoming.cloned())
    }

    // Series / VOD detail

    pub async fn list_series(&self, category_id: Option<&str>) -> Result<Vec<SeriesListing>> {
        self.xtream_client()?.get_series(category_id).await
    }

    /// Expands a series into playable episode channels.
    pub async fn series_episodes(&self, listing: &SeriesListing) -> Result<Vec<Channel>> {
        let client = self.xtream_client()?;
        let info = client.get_series_info(listing.series_id).await?;
        Ok(client.episodes_to_channels(listing, &info))
    }

    /// Fills in plot/genre/duration detail for a VOD channel in place.
    pub async fn enrich_vod(&self, channel: &mut Channel) -> Result<()> {
        let Some(vod_id) = channel
            .id
            .strip_prefix("vod_")
            .and_then(|id| id.parse::<u32>().ok())
        else {
            return Ok(());
        };

        let info = self.xtream_client()?.get_vod_info(vod_id).await?;
        XtreamClient::apply_vod_info(channel, &info);
        Ok(())
    }

    // Projections over the loaded catalog. Never touch the network.

    pub fn recommendations(&self, max: usize) -> Vec<Channel> {
        let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
        recommend::generate_recommendations(&self.cache.recently_watched(), &catalog, max)
    }

    /// History entries resolved against the catalog, most recent first.
    /// Entries whose channel vanished from the catalog are skipped.
    pub fn recently_watched_channels(&self) -> Vec<Channel> {
        let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
        self.cache
            .recently_watched()
            .iter()
            .filter_map(|entry| {
                catalog
                    .iter()
                    .find(|c| c.id == entry.channel_id)
                    .cloned()
            })
            .collect()
    }

    /// Catalog entries newest-first by the provider's added timestamp.
    /// M3U-sourced entries carry no added time and sort last.
    pub fn latest_added(&self, limit: usize) -> Vec<Channel> {
        let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
        let mut channels: Vec<Channel> = catalog.clone();
        channels.sort_by_key(|c| {
            std::cmp::Reverse(
                c.added
                    .as_deref()
                    .and_then(|a| a.parse::<i64>().ok())
                    .unwrap_or(i64::MIN),
            )
        });
        channels.truncate(limit);
        channels
    }

    pub fn favorite_channels(&self) -> Vec<Channel> {
        let favorites = self.cache.favorites();
        let catalog = self.catalog.lock().unwrap_or_else(|e| e.into_inner());
        catalog
            .iter()
            .filter(|c| favorites.contains(&c.id))
            .cloned()
            .collect()
    }

    pub fn watch_history(&self) -> Vec<RecentlyWatched> {
        self.cache.recently_watched()
    }

    pub fn add_recently_watched(
        &self,
        channel_id: &str,
        last_position: i64,
        duration: i64,
    ) -> Result<()> {
        self.cache
            .add_recently_watched(channel_id, last_position, duration)
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear_cache()
    }

    /// Drops credentials, history, and cached content; keeps favorites
    /// and the tracking preference. Also resets the session state.
    pub fn secure_logout(&self) -> Result<()> {
        self.cache.secure_logout()?;
        self.catalog.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.epg.lock().unwrap_or_else(|e| e.into_inner()).clear();
        *self.xtream.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = LoadState::Empty;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::models::ChannelCategory;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn repo() -> ContentRepository<MemoryStore> {
        let cache = CacheStore::new(MemoryStore::new(), DAY_MS, 50);
        ContentRepository::new(cache, Config::default()).unwrap()
    }

    fn channel(id: &str, genre: Option<&str>, added: Option<&str>) -> Channel {
        Channel {
            id: id.to_string(),
            name: id.to_string(),
            stream_url: format!("http://example.com/{id}"),
            logo_url: None,
            group_title: None,
            epg_channel_id: None,
            category: ChannelCategory::Movie,
            description: None,
            rating: None,
            duration: None,
            release_date: None,
            genre: genre.map(String::from),
            added: added.map(String::from),
            series_id: None,
            season_number: None,
            episode_number: None,
        }
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_the_network() {
        let repo = repo();
        repo.cache()
            .cache_channels(&[channel("a", None, None)])
            .unwrap();

        let channels = repo.load_channels(false).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(repo.load_state(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn missing_source_is_a_typed_failure() {
        let repo = repo();

        // No cache, default source type M3U, no URL configured.
        let err = repo.load_channels(false).await.unwrap_err();
        assert!(matches!(err, Error::MissingSource(_)));
        assert_eq!(repo.load_state(), LoadState::Failed);
    }

    #[tokio::test]
    async fn forced_refresh_skips_the_cache() {
        let repo = repo();
        repo.cache()
            .cache_channels(&[channel("a", None, None)])
            .unwrap();

        // Forced refresh must go to the (unconfigured) network and fail.
        let err = repo.load_channels(true).await.unwrap_err();
        assert!(matches!(err, Error::MissingSource(_)));
    }

    #[tokio::test]
    async fn projections_resolve_against_loaded_catalog() {
        let repo = repo();
        repo.cache()
            .cache_channels(&[
                channel("a", Some("drama"), Some("200")),
                channel("b", Some("drama"), Some("300")),
                channel("c", Some("comedy"), None),
            ])
            .unwrap();
        repo.load_channels(false).await.unwrap();

        repo.add_recently_watched("a", 0, 0).unwrap();
        repo.add_recently_watched("c", 0, 0).unwrap();

        let recent = repo.recently_watched_channels();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "c");
        assert_eq!(recent[1].id, "a");

        let recs = repo.recommendations(30);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].id, "b");

        let latest = repo.latest_added(2);
        assert_eq!(latest[0].id, "b");
        assert_eq!(latest[1].id, "a");
    }

    #[tokio::test]
    async fn favorites_projection() {
        let repo = repo();
        repo.cache()
            .cache_channels(&[channel("a", None, None), channel("b", None, None)])
            .unwrap();
        repo.load_channels(false).await.unwrap();

        repo.cache().add_favorite("b").unwrap();
        repo.cache().add_favorite("ghost").unwrap();

        let favorites = repo.favorite_channels();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, "b");
    }

    #[tokio::test]
    async fn logout_resets_session_state() {
        let repo = repo();
        repo.cache()
            .cache_channels(&[channel("a", None, None)])
            .unwrap();
        repo.load_channels(false).await.unwrap();
        repo.cache().add_favorite("a").unwrap();

        repo.secure_logout().unwrap();

        assert_eq!(repo.load_state(), LoadState::Empty);
        assert!(repo.recently_watched_channels().is_empty());
        assert!(repo.cache().cached_channels().is_none());
        // Favorites survive, though nothing resolves until a reload.
        assert!(repo.cache().is_favorite("a"));
        assert!(repo.favorite_channels().is_empty());
    }
}
