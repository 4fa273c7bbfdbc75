// SPDX-License-Identifier: MIT

//! Xtream-Codes panel client.
//!
//! Everything goes through `player_api.php` with query-parameter auth.
//! Panels are loose with JSON types (numbers where strings are expected
//! and vice versa), so the wire models deserialize leniently and
//! normalization into the unified [`Channel`] shape happens here.

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::models::{Channel, ChannelCategory, XtreamCredentials};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

fn deserialize_optional_number_as_string<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::Null => Ok(None),
        Value::String(s) => {
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(D::Error::custom("Expected string, number, or null")),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub user_info: Option<UserInfo>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Panels report this as `1`, `"1"`, or `true` on success.
    #[serde(default)]
    pub auth: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub exp_date: Option<String>,
    #[serde(default)]
    pub is_trial: Option<String>,
    #[serde(default)]
    pub active_cons: Option<Value>,
    #[serde(default)]
    pub max_connections: Option<Value>,
}

impl UserInfo {
    pub fn is_authenticated(&self) -> bool {
        match &self.auth {
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            Some(Value::String(s)) => s == "1",
            Some(Value::Bool(b)) => *b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub port: Option<Value>,
    #[serde(default)]
    pub server_protocol: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub timestamp_now: Option<i64>,
    #[serde(default)]
    pub time_now: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(deserialize_with = "deserialize_optional_number_as_string", default)]
    pub category_id: Option<String>,
    pub category_name: String,
    #[serde(default)]
    pub parent_id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub name: String,
    pub stream_id: u32,
    #[serde(default)]
    pub num: Option<u32>,
    #[serde(default)]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub epg_channel_id: Option<String>,
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub rating: Option<String>,
    #[serde(default)]
    pub rating_5based: Option<Value>,
    #[serde(default)]
    pub container_extension: Option<String>,
    #[serde(default)]
    pub is_adult: Option<Value>,
    #[serde(default)]
    pub direct_source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesListing {
    pub name: String,
    pub series_id: u32,
    #[serde(default)]
    pub num: Option<u32>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(rename = "releaseDate", default)]
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub episode_run_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VodInfoResponse {
    #[serde(default)]
    pub info: Option<VodDetails>,
    #[serde(default)]
    pub movie_data: Option<MovieData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VodDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub releasedate: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub rating: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieData {
    #[serde(default)]
    pub stream_id: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub container_extension: Option<String>,
    #[serde(default)]
    pub added: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesInfoResponse {
    #[serde(default)]
    pub info: Option<SeriesDetails>,
    #[serde(default)]
    pub episodes: Option<std::collections::HashMap<String, Vec<Episode>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(rename = "releaseDate", default)]
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub rating: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub episode_num: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub container_extension: Option<String>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default)]
    pub info: Option<EpisodeInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeInfo {
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub movie_image: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub rating: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub releasedate: Option<String>,
}

pub struct XtreamClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl XtreamClient {
    pub fn new(credentials: &XtreamCredentials, network: &NetworkConfig) -> Result<Self> {
        let url = url::Url::parse(&credentials.server_url).map_err(|e| Error::BadResponse {
            url: credentials.server_url.clone(),
            message: format!("invalid server URL: {e}"),
        })?;

        let base_url = match url.port() {
            Some(port) => format!(
                "{}://{}:{}",
                url.scheme(),
                url.host_str().unwrap_or("localhost"),
                port
            ),
            None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or("localhost")),
        };

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network.connect_timeout_secs))
            .timeout(Duration::from_secs(network.read_timeout_secs))
            .user_agent("Mozilla/5.0")
            .build()?;

        Ok(Self {
            client,
            base_url,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }

    fn api_url(&self, action: Option<&str>, extra: Option<(&str, &str)>) -> String {
        let mut url = format!(
            "{}/player_api.php?username={}&password={}",
            self.base_url,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
        );
        if let Some(action) = action {
            url.push_str(&format!("&action={action}"));
        }
        if let Some((key, value)) = extra {
            url.push_str(&format!("&{key}={}", urlencoding::encode(value)));
        }
        url
    }

    async fn make_request<T>(&self, action: &str, extra: Option<(&str, &str)>) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = self.api_url(Some(action), extra);
        debug!(action, "requesting catalog data");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::BadResponse {
                url: format!("{}/player_api.php", self.base_url),
                message: format!("HTTP status {} for action {action}", response.status()),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(Error::BadResponse {
                url: format!("{}/player_api.php", self.base_url),
                message: format!("empty response for action {action}"),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!(action, error = %e, "failed to parse panel response");
            Error::Serialization(e)
        })
    }

    /// Succeeds only if the panel reports an explicit auth-success flag.
    /// Transport success with a negative flag is still a failure, carrying
    /// the server-provided message when there is one.
    pub async fn authenticate(&self) -> Result<AuthResponse> {
        let url = self.api_url(None, None);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Auth {
                message: format!("HTTP status {}", response.status()),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(Error::Auth {
                message: "empty response from server".to_string(),
            });
        }

        let auth: AuthResponse = serde_json::from_str(&body)?;
        let authenticated = auth
            .user_info
            .as_ref()
            .is_some_and(UserInfo::is_authenticated);

        if authenticated {
            Ok(auth)
        } else {
            let message = auth
                .user_info
                .as_ref()
                .and_then(|u| u.message.clone())
                .unwrap_or_else(|| "Authentication failed".to_string());
            Err(Error::Auth { message })
        }
    }

    pub async fn get_live_streams(&self, category_id: Option<&str>) -> Result<Vec<Stream>> {
        self.make_request("get_live_streams", category_id.map(|id| ("category_id", id)))
            .await
    }

    pub async fn get_vod_streams(&self, category_id: Option<&str>) -> Result<Vec<Stream>> {
        self.make_request("get_vod_streams", category_id.map(|id| ("category_id", id)))
            .await
    }

    pub async fn get_series(&self, category_id: Option<&str>) -> Result<Vec<SeriesListing>> {
        self.make_request("get_series", category_id.map(|id| ("category_id", id)))
            .await
    }

    pub async fn get_live_categories(&self) -> Result<Vec<Category>> {
        self.make_request("get_live_categories", None).await
    }

    pub async fn get_vod_categories(&self) -> Result<Vec<Category>> {
        self.make_request("get_vod_categories", None).await
    }

    pub async fn get_series_categories(&self) -> Result<Vec<Category>> {
        self.make_request("get_series_categories", None).await
    }

    pub async fn get_vod_info(&self, vod_id: u32) -> Result<VodInfoResponse> {
        self.make_request("get_vod_info", Some(("vod_id", &vod_id.to_string())))
            .await
    }

    pub async fn get_series_info(&self, series_id: u32) -> Result<SeriesInfoResponse> {
        self.make_request("get_series_info", Some(("series_id", &series_id.to_string())))
            .await
    }

    fn stream_url(&self, kind: &str, id: &str, extension: &str) -> String {
        format!(
            "{}/{kind}/{}/{}/{id}.{extension}",
            self.base_url, self.username, self.password
        )
    }

    pub fn live_to_channel(&self, stream: &Stream) -> Channel {
        Channel {
            id: format!("live_{}", stream.stream_id),
            name: stream.name.clone(),
            stream_url: self.stream_url("live", &stream.stream_id.to_string(), "m3u8"),
            logo_url: stream.stream_icon.clone(),
            group_title: stream.category_id.clone(),
            epg_channel_id: stream.epg_channel_id.clone(),
            category: ChannelCategory::LiveTv,
            description: None,
            rating: stream.rating.clone(),
            duration: None,
            release_date: None,
            genre: None,
            added: stream.added.clone(),
            series_id: None,
            season_number: None,
            episode_number: None,
        }
    }

    pub fn vod_to_channel(&self, stream: &Stream) -> Channel {
        let extension = stream.container_extension.as_deref().unwrap_or("mp4");
        Channel {
            id: format!("vod_{}", stream.stream_id),
            name: stream.name.clone(),
            stream_url: self.stream_url("movie", &stream.stream_id.to_string(), extension),
            logo_url: stream.stream_icon.clone(),
            group_title: stream.category_id.clone(),
            epg_channel_id: None,
            category: ChannelCategory::Movie,
            description: None,
            rating: stream.rating.clone(),
            duration: None,
            release_date: None,
            genre: None,
            added: stream.added.clone(),
            series_id: None,
            season_number: None,
            episode_number: None,
        }
    }

    /// Expands one series into playable episode channels, carrying the
    /// series-level genre/release/rating down onto each episode.
    pub fn episodes_to_channels(
        &self,
        listing: &SeriesListing,
        info: &SeriesInfoResponse,
    ) -> Vec<Channel> {
        let Some(episodes) = &info.episodes else {
            return Vec::new();
        };

        let details = info.info.as_ref();
        let mut channels = Vec::new();

        for season_episodes in episodes.values() {
            for episode in season_episodes {
                let extension = episode.container_extension.as_deref().unwrap_or("mp4");
                channels.push(Channel {
                    id: format!("series_{}", episode.id),
                    name: episode
                        .title
                        .clone()
                        .unwrap_or_else(|| format!("{} E{:02}", listing.name, episode.episode_num)),
                    stream_url: self.stream_url("series", &episode.id, extension),
                    logo_url: episode
                        .info
                        .as_ref()
                        .and_then(|i| i.movie_image.clone())
                        .or_else(|| listing.cover.clone()),
                    group_title: listing.category_id.clone(),
                    epg_channel_id: None,
                    category: ChannelCategory::Series,
                    description: episode
                        .info
                        .as_ref()
                        .and_then(|i| i.plot.clone())
                        .or_else(|| details.and_then(|d| d.plot.clone()))
                        .or_else(|| listing.plot.clone()),
                    rating: episode
                        .info
                        .as_ref()
                        .and_then(|i| i.rating.clone())
                        .or_else(|| listing.rating.clone()),
                    duration: episode
                        .info
                        .as_ref()
                        .and_then(|i| i.duration_secs)
                        .map(|secs| secs / 60),
                    release_date: details
                        .and_then(|d| d.release_date.clone())
                        .or_else(|| listing.release_date.clone()),
                    genre: details
                        .and_then(|d| d.genre.clone())
                        .or_else(|| listing.genre.clone()),
                    added: episode.added.clone(),
                    series_id: Some(listing.series_id),
                    season_number: episode.season,
                    episode_number: Some(episode.episode_num),
                });
            }
        }

        channels
    }

    /// Folds VOD detail data into an already-normalized movie channel.
    pub fn apply_vod_info(channel: &mut Channel, info: &VodInfoResponse) {
        let Some(details) = &info.info else { return };

        if channel.description.is_none() {
            channel.description = details
                .plot
                .clone()
                .or_else(|| details.description.clone());
        }
        if channel.genre.is_none() {
            channel.genre = details.genre.clone();
        }
        if channel.release_date.is_none() {
            channel.release_date = details.releasedate.clone();
        }
        if channel.rating.is_none() {
            channel.rating = details.rating.clone();
        }
        if channel.duration.is_none() {
            channel.duration = details.duration_secs.map(|secs| secs / 60);
        }
    }
}
