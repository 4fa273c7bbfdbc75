// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub cache: CacheConfig,
    pub epg: EpgConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Channel/EPG snapshots older than this are treated as absent.
    pub ttl_hours: u64,
    /// Watch history is truncated to this many entries, newest first.
    pub max_recently_watched: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgConfig {
    /// Ordered fallback list used when no explicit guide URL is set.
    pub default_sources: Vec<String>,
    /// When false, a source that fetches fine but parses to an empty
    /// guide is treated as failed and the next source is tried.
    pub accept_empty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                connect_timeout_secs: 30,
                read_timeout_secs: 60,
            },
            cache: CacheConfig {
                ttl_hours: 24,
                max_recently_watched: 50,
            },
            epg: EpgConfig {
                default_sources: vec![
                    "https://iptv-org.github.io/epg/guides/us/tvguide.com.epg.xml".to_string(),
                    "https://iptv-org.github.io/epg/guides/uk/tv.sky.com.epg.xml".to_string(),
                    "https://iptv-org.github.io/epg/guides/ca/tvguide.com.epg.xml".to_string(),
                ],
                accept_empty: false,
            },
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
        Self::load(&path).unwrap_or_default()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("m3uplayer");

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).with_context(|| {
                format!("Failed to create config directory: {}", config_dir.display())
            })?;
        }

        Ok(config_dir)
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::ensure_config_dir()?.join("config.toml"))
    }

    pub fn ttl_ms(&self) -> i64 {
        (self.cache.ttl_hours * 60 * 60 * 1000) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed.network.connect_timeout_secs, 30);
        assert_eq!(parsed.network.read_timeout_secs, 60);
        assert_eq!(parsed.cache.ttl_hours, 24);
        assert_eq!(parsed.cache.max_recently_watched, 50);
        assert_eq!(parsed.epg.default_sources.len(), 3);
        assert!(!parsed.epg.accept_empty);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default("/nonexistent/m3uplayer.toml");
        assert_eq!(config.cache.ttl_hours, 24);
    }
}
