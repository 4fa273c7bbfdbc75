// SPDX-License-Identifier: MIT

pub mod cache;
pub mod config;
pub mod epg;
pub mod error;
pub mod models;
pub mod playlist;
pub mod recommend;
pub mod repository;
pub mod xtream;

pub use cache::{CacheStore, FileStore, MemoryStore, StorageBackend};
pub use config::Config;
pub use epg::EpgSource;
pub use error::{Error, Result};
pub use models::{Channel, ChannelCategory, EpgProgram, RecentlyWatched, SourceType, XtreamCredentials};
pub use repository::ContentRepository;
pub use xtream::XtreamClient;
