//! Error types shared by the scraping pipeline.
//!
//! [`ScrapeError`] covers everything the core can fail with. Sinks report
//! their own failures as [`BoxError`]; those are logged by the dispatcher and
//! never travel back into the pipeline.

use thiserror::Error;

/// Boxed error used at the sink boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("failed to read configuration {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no configuration found for source: {0}")]
    UnknownSource(String),

    #[error("no detail-page URLs discovered at {0}")]
    NoUrlsDiscovered(String),

    #[error("failed to scrape {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<ScrapeError>,
    },

    #[error("failed to scrape {code}: {error}")]
    Source {
        code: String,
        #[source]
        error: Box<ScrapeError>,
    },

    #[error("scrape task for {code} aborted: {reason}")]
    TaskAborted { code: String, reason: String },

    #[error("geocoding failed: {0}")]
    Geocoding(String),

    #[error("event publisher is closed")]
    PublisherClosed,
}

impl ScrapeError {
    /// Wrap an error raised while scraping `code`.
    pub fn for_source(code: &str, error: ScrapeError) -> Self {
        ScrapeError::Source {
            code: code.to_string(),
            error: Box::new(error),
        }
    }
}
