// SPDX-License-Identifier: MIT

//! EPG acquisition: download XMLTV from a configured or default source
//! and answer "what is on now / next" queries over the parsed guide.

pub mod parser;

use crate::config::{EpgConfig, NetworkConfig};
use crate::error::{Error, Result};
use crate::models::EpgProgram;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

pub use parser::ParsedEpg;

pub struct EpgSource {
    client: reqwest::Client,
    config: EpgConfig,
}

impl EpgSource {
    pub fn new(network: &NetworkConfig, config: EpgConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network.connect_timeout_secs))
            .timeout(Duration::from_secs(network.read_timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Downloads and parses guide data.
    ///
    /// With an explicit URL the caller's choice is authoritative: one
    /// attempt, no fallback. With no URL the configured default sources
    /// are tried strictly in order and the first acceptable result wins.
    pub async fn download_epg(
        &self,
        url: Option<&str>,
    ) -> Result<HashMap<String, Vec<EpgProgram>>> {
        if let Some(url) = url {
            let epg = self.fetch_and_parse(url).await?;
            return Ok(epg.programs);
        }

        let mut attempted = 0;
        let mut last_error = "no EPG sources configured".to_string();

        for source in &self.config.default_sources {
            attempted += 1;
            match self.fetch_and_parse(source).await {
                Ok(epg) => {
                    if epg.is_empty() && !self.config.accept_empty {
                        // A fetch that parses to nothing is treated the
                        // same as a failed fetch for fallback purposes.
                        warn!(url = %source, "EPG source parsed to an empty guide, trying next");
                        last_error = format!("{source}: empty guide");
                        continue;
                    }
                    debug!(
                        url = %source,
                        programs = epg.program_count(),
                        warnings = epg.warnings.len(),
                        "EPG source accepted"
                    );
                    return Ok(epg.programs);
                }
                Err(e) => {
                    warn!(url = %source, error = %e, "EPG source failed, trying next");
                    last_error = format!("{source}: {e}");
                }
            }
        }

        Err(Error::EpgExhausted {
            attempted,
            last_error,
        })
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<ParsedEpg> {
        debug!(url, "downloading EPG");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(Error::BadResponse {
                url: url.to_string(),
                message: format!("HTTP status {}", response.status()),
            });
        }

        // Guide files run to tens of megabytes; stream the body down
        // instead of buffering it through reqwest's text path.
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        let body = String::from_utf8_lossy(&body);
        if body.trim().is_empty() {
            return Err(Error::BadResponse {
                url: url.to_string(),
                message: "empty response body".to_string(),
            });
        }

        Ok(parser::parse(&body))
    }
}

/// Returns the program airing at `now` and the next one to start, for a
/// channel keyed by its XMLTV id. Either side may be absent. When
/// intervals overlap the first match in document order wins.
pub fn current_and_upcoming<'a>(
    epg_channel_id: Option<&str>,
    all_programs: &'a HashMap<String, Vec<EpgProgram>>,
    now: i64,
) -> (Option<&'a EpgProgram>, Option<&'a EpgProgram>) {
    let Some(channel_id) = epg_channel_id else {
        return (None, None);
    };
    let Some(programs) = all_programs.get(channel_id) else {
        return (None, None);
    };

    let current = programs.iter().find(|p| p.is_live(now));
    let upcoming = programs
        .iter()
        .filter(|p| p.is_upcoming(now))
        .min_by_key(|p| p.start_time);

    (current, upcoming)
}
