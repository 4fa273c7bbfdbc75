// SPDX-License-Identifier: MIT

//! Durable key/value persistence for the pipeline.
//!
//! [`StorageBackend`] is the injected storage seam: get/set/remove/clear
//! over opaque bytes. [`CacheStore`] layers JSON (de)serialization, the
//! 24h TTL gate for bulk content, and the unconditional credential /
//! history / favorites state on top. Corrupt payloads are treated as a
//! cache miss, never as a fatal error; I/O failures on writes propagate
//! to the caller.

use crate::error::Result;
use crate::models::{Channel, EpgProgram, RecentlyWatched, SourceType, XtreamCredentials};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

const KEY_SOURCE_TYPE: &str = "source_type";
const KEY_M3U_URL: &str = "m3u_url";
const KEY_XTREAM_CREDS: &str = "xtream_credentials";
const KEY_CHANNELS: &str = "cached_channels";
const KEY_EPG: &str = "cached_epg";
const KEY_CACHE_TIMESTAMP: &str = "cache_timestamp";
const KEY_RECENTLY_WATCHED: &str = "recently_watched";
const KEY_FAVORITES: &str = "favorites";
const KEY_TRACKING_ENABLED: &str = "tracking_enabled";

/// Minimal byte-oriented storage contract.
///
/// Implementations are free to encrypt at rest; that is a property of
/// the backend, not of the pipeline logic.
pub trait StorageBackend: Send {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>>;
    fn set(&mut self, key: &str, value: &[u8]) -> io::Result<()>;
    fn remove(&mut self, key: &str) -> io::Result<()>;
    fn clear(&mut self) -> io::Result<()>;
}

/// One JSON file per key under a directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    /// Store rooted at the platform cache directory.
    pub fn default_location() -> io::Result<Self> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| io::Error::other("Could not determine cache directory"))?
            .join("m3uplayer");
        Self::new(dir)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileStore {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&mut self, key: &str, value: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        // Whole-value replace so a write completes or fails atomically.
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn clear(&mut self) -> io::Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|e| e == "json") {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

/// In-memory backend, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> io::Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        self.entries.clear();
        Ok(())
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Typed persistence layer over a [`StorageBackend`].
///
/// Every operation locks the backend for its whole read-modify-write
/// cycle, so two concurrent history appends cannot lose an update.
pub struct CacheStore<S: StorageBackend> {
    store: Mutex<S>,
    ttl_ms: i64,
    max_recently_watched: usize,
}

impl CacheStore<FileStore> {
    pub fn open_default(ttl_ms: i64, max_recently_watched: usize) -> Result<Self> {
        Ok(Self::new(
            FileStore::default_location()?,
            ttl_ms,
            max_recently_watched,
        ))
    }
}

impl<S: StorageBackend> CacheStore<S> {
    pub fn new(store: S, ttl_ms: i64, max_recently_watched: usize) -> Self {
        Self {
            store: Mutex::new(store),
            ttl_ms,
            max_recently_watched,
        }
    }

    /// Backends replace whole values, so a panic while the lock is held
    /// cannot leave a half-written entry; recover from poison instead
    /// of propagating the panic to every later caller.
    fn backend(&self) -> std::sync::MutexGuard<'_, S> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_json<T: DeserializeOwned>(store: &S, key: &str) -> Option<T> {
        let bytes = match store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "storage read failed, treating as absent");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "corrupt cache payload, treating as absent");
                None
            }
        }
    }

    fn write_json<T: Serialize>(store: &mut S, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        store.set(key, &bytes)?;
        Ok(())
    }

    // Source selection

    pub fn source_type(&self) -> SourceType {
        let store = self.backend();
        Self::read_json(&store, KEY_SOURCE_TYPE).unwrap_or_default()
    }

    pub fn set_source_type(&self, source: SourceType) -> Result<()> {
        let mut store = self.backend();
        Self::write_json(&mut store, KEY_SOURCE_TYPE, &source)
    }

    // M3U URL

    pub fn m3u_url(&self) -> Option<String> {
        let store = self.backend();
        Self::read_json(&store, KEY_M3U_URL)
    }

    pub fn set_m3u_url(&self, url: &str) -> Result<()> {
        let mut store = self.backend();
        Self::write_json(&mut store, KEY_M3U_URL, &url)
    }

    pub fn clear_m3u_url(&self) -> Result<()> {
        let mut store = self.backend();
        store.remove(KEY_M3U_URL)?;
        Ok(())
    }

    // Xtream credentials

    pub fn xtream_credentials(&self) -> Option<XtreamCredentials> {
        let store = self.backend();
        Self::read_json(&store, KEY_XTREAM_CREDS)
    }

    pub fn set_xtream_credentials(&self, credentials: &XtreamCredentials) -> Result<()> {
        let mut store = self.backend();
        Self::write_json(&mut store, KEY_XTREAM_CREDS, credentials)
    }

    pub fn clear_xtream_credentials(&self) -> Result<()> {
        let mut store = self.backend();
        store.remove(KEY_XTREAM_CREDS)?;
        Ok(())
    }

    // Channel / EPG snapshots, gated by one shared cache epoch

    /// Epoch-ms timestamp of the last channels write, if any.
    pub fn cache_timestamp(&self) -> Option<i64> {
        let store = self.backend();
        Self::read_json(&store, KEY_CACHE_TIMESTAMP)
    }

    pub fn is_cache_valid(&self) -> bool {
        self.is_cache_valid_at(now_ms())
    }

    pub fn is_cache_valid_at(&self, now: i64) -> bool {
        match self.cache_timestamp() {
            Some(ts) => now - ts < self.ttl_ms,
            None => false,
        }
    }

    /// Writes the snapshot and refreshes the shared cache epoch.
    pub fn cache_channels(&self, channels: &[Channel]) -> Result<()> {
        let mut store = self.backend();
        Self::write_json(&mut store, KEY_CHANNELS, &channels)?;
        Self::write_json(&mut store, KEY_CACHE_TIMESTAMP, &now_ms())
    }

    pub fn cached_channels(&self) -> Option<Vec<Channel>> {
        self.cached_channels_at(now_ms())
    }

    pub fn cached_channels_at(&self, now: i64) -> Option<Vec<Channel>> {
        if !self.is_cache_valid_at(now) {
            return None;
        }
        let store = self.backend();
        Self::read_json(&store, KEY_CHANNELS)
    }

    /// Shares the channels epoch: writing the EPG does not refresh it.
    pub fn cache_epg(&self, epg: &HashMap<String, Vec<EpgProgram>>) -> Result<()> {
        let mut store = self.backend();
        Self::write_json(&mut store, KEY_EPG, epg)
    }

    pub fn cached_epg(&self) -> Option<HashMap<String, Vec<EpgProgram>>> {
        self.cached_epg_at(now_ms())
    }

    pub fn cached_epg_at(&self, now: i64) -> Option<HashMap<String, Vec<EpgProgram>>> {
        if !self.is_cache_valid_at(now) {
            return None;
        }
        let store = self.backend();
        Self::read_json(&store, KEY_EPG)
    }

    pub fn clear_cache(&self) -> Result<()> {
        let mut store = self.backend();
        store.remove(KEY_CHANNELS)?;
        store.remove(KEY_EPG)?;
        store.remove(KEY_CACHE_TIMESTAMP)?;
        Ok(())
    }

    // Watch history

    pub fn tracking_enabled(&self) -> bool {
        let store = self.backend();
        Self::read_json(&store, KEY_TRACKING_ENABLED).unwrap_or(true)
    }

    /// Disabling tracking clears all history. One-way: re-enabling does
    /// not restore it.
    pub fn set_tracking_enabled(&self, enabled: bool) -> Result<()> {
        let mut store = self.backend();
        Self::write_json(&mut store, KEY_TRACKING_ENABLED, &enabled)?;
        if !enabled {
            store.remove(KEY_RECENTLY_WATCHED)?;
        }
        Ok(())
    }

    pub fn recently_watched(&self) -> Vec<RecentlyWatched> {
        let store = self.backend();
        if !Self::read_json(&store, KEY_TRACKING_ENABLED).unwrap_or(true) {
            return Vec::new();
        }
        Self::read_json(&store, KEY_RECENTLY_WATCHED).unwrap_or_default()
    }

    /// No-op while tracking is disabled. Replaces any existing entry for
    /// the channel, prepends, and truncates to the configured bound.
    pub fn add_recently_watched(
        &self,
        channel_id: &str,
        last_position: i64,
        duration: i64,
    ) -> Result<()> {
        let mut store = self.backend();
        if !Self::read_json(&store, KEY_TRACKING_ENABLED).unwrap_or(true) {
            return Ok(());
        }

        let mut entries: Vec<RecentlyWatched> =
            Self::read_json(&store, KEY_RECENTLY_WATCHED).unwrap_or_default();
        entries.retain(|e| e.channel_id != channel_id);
        entries.insert(
            0,
            RecentlyWatched {
                channel_id: channel_id.to_string(),
                timestamp: now_ms(),
                last_position,
                duration,
            },
        );
        entries.truncate(self.max_recently_watched);

        Self::write_json(&mut store, KEY_RECENTLY_WATCHED, &entries)
    }

    pub fn clear_recently_watched(&self) -> Result<()> {
        let mut store = self.backend();
        store.remove(KEY_RECENTLY_WATCHED)?;
        Ok(())
    }

    // Favorites, independent of the TTL epoch

    pub fn favorites(&self) -> BTreeSet<String> {
        let store = self.backend();
        Self::read_json(&store, KEY_FAVORITES).unwrap_or_default()
    }

    pub fn add_favorite(&self, channel_id: &str) -> Result<()> {
        let mut store = self.backend();
        let mut favorites: BTreeSet<String> =
            Self::read_json(&store, KEY_FAVORITES).unwrap_or_default();
        favorites.insert(channel_id.to_string());
        Self::write_json(&mut store, KEY_FAVORITES, &favorites)
    }

    pub fn remove_favorite(&self, channel_id: &str) -> Result<()> {
        let mut store = self.backend();
        let mut favorites: BTreeSet<String> =
            Self::read_json(&store, KEY_FAVORITES).unwrap_or_default();
        favorites.remove(channel_id);
        Self::write_json(&mut store, KEY_FAVORITES, &favorites)
    }

    pub fn is_favorite(&self, channel_id: &str) -> bool {
        self.favorites().contains(channel_id)
    }

    pub fn clear_favorites(&self) -> Result<()> {
        let mut store = self.backend();
        store.remove(KEY_FAVORITES)?;
        Ok(())
    }

    /// Clears credentials, the M3U URL, watch history, and the cached
    /// channel/EPG snapshots. Favorites and the tracking flag survive.
    pub fn secure_logout(&self) -> Result<()> {
        let mut store = self.backend();
        store.remove(KEY_XTREAM_CREDS)?;
        store.remove(KEY_M3U_URL)?;
        store.remove(KEY_RECENTLY_WATCHED)?;
        store.remove(KEY_CHANNELS)?;
        store.remove(KEY_EPG)?;
        store.remove(KEY_CACHE_TIMESTAMP)?;
        Ok(())
    }

    pub fn clear_all(&self) -> Result<()> {
        let mut store = self.backend();
        store.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelCategory;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn test_store() -> CacheStore<MemoryStore> {
        CacheStore::new(MemoryStore::new(), DAY_MS, 50)
    }

    fn channel(id: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: id.to_string(),
            stream_url: format!("http://example.com/{id}.ts"),
            logo_url: None,
            group_title: None,
            epg_channel_id: None,
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

    #[test]
    fn ttl_boundary_is_exclusive() {
        let store = test_store();
        store.cache_channels(&[channel("a")]).unwrap();
        let t0 = store.cache_timestamp().unwrap();

        assert!(store.cached_channels_at(t0 + DAY_MS - 1).is_some());
        assert!(store.cached_channels_at(t0 + DAY_MS + 1).is_none());
    }

    #[test]
    fn epg_shares_channel_epoch() {
        let store = test_store();
        let mut epg = HashMap::new();
        epg.insert(
            "ch1".to_string(),
            vec![EpgProgram {
                id: "p".to_string(),
                channel_id: "ch1".to_string(),
                title: "Show".to_string(),
                description: None,
                start_time: 0,
                end_time: 1,
                icon: None,
                category: None,
            }],
        );

        // No channels write yet, so there is no valid epoch.
        store.cache_epg(&epg).unwrap();
        assert!(store.cached_epg().is_none());

        store.cache_channels(&[channel("a")]).unwrap();
        assert_eq!(store.cached_epg().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_payload_is_a_miss() {
        let mut backing = MemoryStore::new();
        backing.set(KEY_CACHE_TIMESTAMP, b"0").unwrap();
        backing.set(KEY_CHANNELS, b"{not json").unwrap();
        let store = CacheStore::new(backing, DAY_MS, 50);

        assert!(store.cached_channels_at(1).is_none());
    }

    #[test]
    fn readding_channel_moves_it_to_front() {
        let store = test_store();
        store.add_recently_watched("a", 0, 0).unwrap();
        store.add_recently_watched("b", 0, 0).unwrap();
        store.add_recently_watched("a", 100, 200).unwrap();

        let entries = store.recently_watched();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].channel_id, "a");
        assert_eq!(entries[0].last_position, 100);
        assert_eq!(entries[1].channel_id, "b");
    }

    #[test]
    fn history_is_bounded() {
        let store = CacheStore::new(MemoryStore::new(), DAY_MS, 3);
        for i in 0..5 {
            store.add_recently_watched(&format!("ch{i}"), 0, 0).unwrap();
        }

        let entries = store.recently_watched();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].channel_id, "ch4");
        assert_eq!(entries[2].channel_id, "ch2");
    }

    #[test]
    fn disabling_tracking_clears_history_one_way() {
        let store = test_store();
        store.add_recently_watched("a", 0, 0).unwrap();
        store.set_tracking_enabled(false).unwrap();

        assert!(store.recently_watched().is_empty());
        store.add_recently_watched("b", 0, 0).unwrap();
        assert!(store.recently_watched().is_empty());

        store.set_tracking_enabled(true).unwrap();
        assert!(store.recently_watched().is_empty());
    }

    #[test]
    fn secure_logout_keeps_favorites_and_tracking_flag() {
        let store = test_store();
        store
            .set_xtream_credentials(&XtreamCredentials {
                server_url: "http://host".to_string(),
                username: "u".to_string(),
                password: "p".to_string(),
            })
            .unwrap();
        store.set_m3u_url("http://host/list.m3u").unwrap();
        store.cache_channels(&[channel("a")]).unwrap();
        store.add_recently_watched("a", 0, 0).unwrap();
        store.add_favorite("a").unwrap();
        store.set_tracking_enabled(true).unwrap();

        store.secure_logout().unwrap();

        assert!(store.xtream_credentials().is_none());
        assert!(store.m3u_url().is_none());
        assert!(store.cached_channels().is_none());
        assert!(store.recently_watched().is_empty());
        assert!(store.is_favorite("a"));
        assert!(store.tracking_enabled());
    }

    #[test]
    fn file_store_read_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(
            FileStore::new(dir.path().to_path_buf()).unwrap(),
            DAY_MS,
            50,
        );

        store.cache_channels(&[channel("a"), channel("b")]).unwrap();
        let cached = store.cached_channels().unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].id, "a");
    }

    #[test]
    fn panic_while_locked_does_not_wedge_the_store() {
        struct FlakyStore {
            inner: MemoryStore,
            panic_on_next_set: bool,
        }

        impl StorageBackend for FlakyStore {
            fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
                self.inner.get(key)
            }
            fn set(&mut self, key: &str, value: &[u8]) -> io::Result<()> {
                if self.panic_on_next_set {
                    self.panic_on_next_set = false;
                    panic!("injected backend failure");
                }
                self.inner.set(key, value)
            }
            fn remove(&mut self, key: &str) -> io::Result<()> {
                self.inner.remove(key)
            }
            fn clear(&mut self) -> io::Result<()> {
                self.inner.clear()
            }
        }

        let store = std::sync::Arc::new(CacheStore::new(
            FlakyStore {
                inner: MemoryStore::new(),
                panic_on_next_set: true,
            },
            DAY_MS,
            50,
        ));

        // First write panics with the lock held, poisoning it.
        let poisoner = store.clone();
        let result = std::thread::spawn(move || {
            let _ = poisoner.add_recently_watched("a", 0, 0);
        })
        .join();
        assert!(result.is_err());

        // Later operations recover instead of panicking.
        store.add_recently_watched("b", 0, 0).unwrap();
        let entries = store.recently_watched();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].channel_id, "b");
    }

    #[test]
    fn concurrent_appends_both_land() {
        let store = std::sync::Arc::new(test_store());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.add_recently_watched(&format!("ch{i}"), 0, 0).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.recently_watched().len(), 8);
    }
}
