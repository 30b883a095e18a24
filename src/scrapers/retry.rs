//! Retrying fetch-and-extract unit.
//!
//! [`RetryingScraper`] composes a [`PageFetcher`] and a [`RecordExtractor`]
//! for one source and adds bounded retry with adaptive backoff.
//!
//! # Backoff
//!
//! The unit keeps its own wait (milliseconds, starting at 1). Before every
//! attempt it sleeps for the current wait:
//!
//! - a failed fetch doubles the wait, capped at [`MAX_WAIT_MS`]
//! - a successful fetch halves it, never below [`MIN_WAIT_MS`] and never
//!   above the value it had when the call started
//!
//! The wait is instance state, so units of different sources never share it.
//! Only fetch failures are retried; an extractor returning `None` counts as
//! a successful fetch.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::extractors::RecordExtractor;
use crate::fetch::{PageFetcher, Throttle};
use crate::models::{Record, ScrapedEvent};

pub const MIN_WAIT_MS: u64 = 1;
pub const MAX_WAIT_MS: u64 = 30_000;

/// Receives an event for every record the unit extracts.
#[async_trait]
pub trait ScrapeListener: Send + Sync {
    async fn on_scraped(&self, event: ScrapedEvent);
}

/// Result of one successful fetch.
#[derive(Debug)]
pub struct Scraped {
    /// `None` when the page held no usable data.
    pub record: Option<Record>,
    /// Time spent in [`RetryingScraper::scrape`], including backoff sleeps.
    pub elapsed: Duration,
}

pub struct RetryingScraper {
    source_code: String,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn RecordExtractor>,
    throttle: Throttle,
    listener: Option<Arc<dyn ScrapeListener>>,
    max_retries: u32,
    wait_ms: u64,
}

impl RetryingScraper {
    pub fn new(
        source_code: &str,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn RecordExtractor>,
        throttle: Throttle,
        max_retries: u32,
    ) -> Self {
        Self {
            source_code: source_code.to_string(),
            fetcher,
            extractor,
            throttle,
            listener: None,
            max_retries: max_retries.max(1),
            wait_ms: MIN_WAIT_MS,
        }
    }

    pub fn with_listener(mut self, listener: Option<Arc<dyn ScrapeListener>>) -> Self {
        self.listener = listener;
        self
    }

    pub fn wait_ms(&self) -> u64 {
        self.wait_ms
    }

    /// Fetch `url` and extract its record, retrying failed fetches.
    ///
    /// Returns [`ScrapeError::RetriesExhausted`] after `max_retries`
    /// consecutive fetch failures. That error only concerns this URL.
    #[instrument(level = "info", skip_all, fields(source = %self.source_code, %url))]
    pub async fn scrape(&mut self, url: &Url) -> Result<Scraped, ScrapeError> {
        let started = Instant::now();
        let entry_wait = self.wait_ms;
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            sleep(Duration::from_millis(self.wait_ms)).await;
            self.throttle.ready().await;

            match self.fetcher.fetch(url).await {
                Ok(page) => {
                    self.wait_ms = (self.wait_ms / 2).min(entry_wait).max(MIN_WAIT_MS);

                    let record = match self.extractor.extract(&page).await {
                        Some(record) if record.is_valid() => {
                            debug!(name = %record.name, coordinates = ?record.coordinates(), "Extracted record");
                            Some(record)
                        }
                        Some(record) => {
                            debug!(name = %record.name, "Discarding invalid record");
                            None
                        }
                        None => {
                            debug!("No usable data on page");
                            None
                        }
                    };
                    let elapsed = started.elapsed();

                    if let (Some(record), Some(listener)) = (&record, &self.listener) {
                        listener
                            .on_scraped(ScrapedEvent {
                                record: record.clone(),
                                source_code: self.source_code.clone(),
                                url: url.to_string(),
                                duration: elapsed,
                                timestamp: Utc::now(),
                            })
                            .await;
                    }
                    return Ok(Scraped { record, elapsed });
                }
                Err(e) => {
                    self.wait_ms = self.wait_ms.saturating_mul(2).min(MAX_WAIT_MS);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        wait_ms = self.wait_ms,
                        error = %e,
                        "Fetch failed; backing off"
                    );
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or(ScrapeError::Status {
            url: url.to_string(),
            status: 0,
        });
        error!(
            attempts = self.max_retries,
            elapsed_ms = started.elapsed().as_millis() as u64,
            error = %last,
            "Fetch exhausted retries"
        );
        Err(ScrapeError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.max_retries,
            last: Box::new(last),
        })
    }
}
