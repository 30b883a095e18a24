//! Scraping orchestration.
//!
//! - [`retry`]: the retrying fetch-and-extract unit, one per source
//! - [`scheduler`]: drives one or more sources, sequentially or concurrently
//!
//! Per source the pipeline is always the same:
//!
//! 1. **Collecting**: the source's [`UrlCollector`](crate::collectors::UrlCollector)
//!    discovers detail-page URLs from the homepage
//! 2. **Scraping**: each URL goes through a [`RetryingScraper`] in discovery
//!    order, spaced by the source's request delay
//! 3. **Publishing**: every valid record is handed to the [`ScrapeListener`]
//!    (the event publisher in production)

pub mod retry;
pub mod scheduler;

pub use retry::{RetryingScraper, ScrapeListener, Scraped};
pub use scheduler::{RunReport, ScrapeSettings, Scheduler, SourceReport};
