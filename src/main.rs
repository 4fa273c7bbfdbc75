// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use m3uplayer::models::{ChannelCategory, XtreamCredentials};
use m3uplayer::{CacheStore, Channel, Config, ContentRepository};

fn cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser)]
#[command(name = "m3uplayer")]
#[command(about = "IPTV content pipeline: playlists, EPG, and recommendations")]
#[command(version)]
#[command(styles = cargo_style())]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store credentials for an Xtream-Codes panel and verify them
    Login {
        /// Panel base URL, e.g. http://host:8080
        server: String,
        username: String,
        password: String,
    },

    /// Store an M3U playlist URL as the content source
    SetUrl { url: String },

    /// List channels, loading from cache or the configured source
    Channels {
        /// Bypass the cache and reload from the source
        #[arg(short, long)]
        refresh: bool,
        /// Only show channels in this group/category id
        #[arg(short, long)]
        group: Option<String>,
    },

    /// Download guide data and show what is on now per channel
    Epg {
        /// Explicit XMLTV URL (skips the default source fallback chain)
        #[arg(short, long)]
        url: Option<String>,
        #[arg(short, long)]
        refresh: bool,
    },

    /// Recommend unwatched content based on watch history
    Recommend {
        #[arg(short, long, default_value_t = m3uplayer::recommend::DEFAULT_MAX_RECOMMENDATIONS)]
        max: usize,
    },

    /// Show recently watched channels
    Recent,

    /// Show the most recently added catalog entries
    Latest {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Manage favourites
    #[command(subcommand)]
    Favourites(FavouritesCommand),

    /// Enable or disable watch-history tracking
    Tracking {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },

    /// Mark a channel as watched (records history for recommendations)
    Watch { channel_id: String },

    /// Clear cached channel and guide snapshots
    ClearCache,

    /// Forget credentials, history, and cached content
    Logout,
}

#[derive(Subcommand)]
enum FavouritesCommand {
    Add { channel_id: String },
    Remove { channel_id: String },
    List,
}

fn category_tag(category: ChannelCategory) -> &'static str {
    match category {
        ChannelCategory::LiveTv => "live",
        ChannelCategory::Movie => "movie",
        ChannelCategory::Series => "series",
        ChannelCategory::RecentlyWatched => "recent",
    }
}

fn print_channels(channels: &[Channel]) {
    for channel in channels {
        println!(
            "{:<12} [{}] {}",
            channel.id,
            category_tag(channel.category),
            channel.name
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into())
                    .add_directive("hyper_util=error".parse()?),
            )
            .init();
    } else if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("hyper_util=error".parse()?),
            )
            .init();
    }

    let config = Config::load_or_default(Config::default_path()?);
    let cache = CacheStore::open_default(config.ttl_ms(), config.cache.max_recently_watched)?;
    let repo = ContentRepository::new(cache, config)?;

    match cli.command {
        Commands::Login {
            server,
            username,
            password,
        } => {
            let auth = repo
                .authenticate_xtream(&XtreamCredentials {
                    server_url: server,
                    username,
                    password,
                })
                .await?;
            let status = auth
                .user_info
                .and_then(|u| u.status)
                .unwrap_or_else(|| "Active".to_string());
            println!("Logged in ({status})");
        }

        Commands::SetUrl { url } => {
            repo.set_m3u_url(&url)?;
            println!("Playlist URL saved");
        }

        Commands::Channels { refresh, group } => {
            let mut channels = repo.load_channels(refresh).await?;
            if let Some(group) = group {
                channels.retain(|c| c.group_title.as_deref() == Some(group.as_str()));
            }
            print_channels(&channels);
            println!("{} channel(s)", channels.len());
        }

        Commands::Epg { url, refresh } => {
            let channels = repo.load_channels(false).await?;
            repo.load_epg(url.as_deref(), refresh).await?;

            for channel in &channels {
                let (current, upcoming) = repo.now_and_next(channel);
                if current.is_none() && upcoming.is_none() {
                    continue;
                }
                let now = current.map(|p| p.title).unwrap_or_else(|| "-".to_string());
                let next = upcoming.map(|p| p.title).unwrap_or_else(|| "-".to_string());
                println!("{:<30} now: {now}  next: {next}", channel.name);
            }
        }

        Commands::Recommend { max } => {
            repo.load_channels(false).await?;
            let recommendations = repo.recommendations(max);
            if recommendations.is_empty() {
                println!("No recommendations yet. Watch something first.");
            } else {
                print_channels(&recommendations);
            }
        }

        Commands::Recent => {
            repo.load_channels(false).await?;
            print_channels(&repo.recently_watched_channels());
        }

        Commands::Latest { limit } => {
            repo.load_channels(false).await?;
            print_channels(&repo.latest_added(limit));
        }

        Commands::Favourites(cmd) => match cmd {
            FavouritesCommand::Add { channel_id } => {
                repo.cache().add_favorite(&channel_id)?;
                println!("Added {channel_id}");
            }
            FavouritesCommand::Remove { channel_id } => {
                repo.cache().remove_favorite(&channel_id)?;
                println!("Removed {channel_id}");
            }
            FavouritesCommand::List => {
                repo.load_channels(false).await?;
                print_channels(&repo.favorite_channels());
            }
        },

        Commands::Tracking { state } => {
            let enabled = state == "on";
            repo.cache().set_tracking_enabled(enabled)?;
            if enabled {
                println!("Watch-history tracking enabled");
            } else {
                println!("Watch-history tracking disabled, history cleared");
            }
        }

        Commands::Watch { channel_id } => {
            repo.add_recently_watched(&channel_id, 0, 0)?;
            println!("Recorded {channel_id}");
        }

        Commands::ClearCache => {
            repo.clear_cache()?;
            println!("Cache cleared");
        }

        Commands::Logout => {
            repo.secure_logout()?;
            println!("Logged out. Favourites were kept.");
        }
    }

    Ok(())
}
