// SPDX-License-Identifier: MIT

//! Failure taxonomy for the ingestion pipeline.
//!
//! Transport failures, policy failures (the server answered but the
//! answer is unusable), and storage failures are kept distinct so the
//! caller can decide what is retryable. Parser modules never produce
//! these: they degrade to empty or partial results instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Network-level failure: timeout, connection refused, non-2xx.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status or an empty response body.
    #[error("Bad response from {url}: {message}")]
    BadResponse { url: String, message: String },

    /// The panel rejected the credentials, or reported no auth flag.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// The source answered successfully but produced an empty catalog.
    /// Deliberate policy: an empty catalog is a failure, not a result.
    #[error("No channels found")]
    NoChannels,

    /// Every applicable EPG source failed or parsed to nothing.
    #[error("All EPG sources failed ({attempted} attempted, last: {last_error})")]
    EpgExhausted { attempted: usize, last_error: String },

    /// An operation needs a source that has not been configured.
    #[error("{0} not configured")]
    MissingSource(&'static str),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
