//! Multi-source scheduler.
//!
//! A run resolves the requested source codes, builds one [`SourcePipeline`]
//! per source (collector, extractor and retrying unit), and only then starts
//! scraping. Unknown codes and invalid selectors therefore fail the run
//! before a single request is sent.
//!
//! - Sequential: sources run one after another in request order. The first
//!   failing source stops the run; records of earlier sources are kept.
//! - Concurrent: every source runs in its own task. Each task returns its
//!   own outcome and the scheduler merges them as they complete, so no lock
//!   is shared between sources. Every source runs to completion; the first
//!   error to complete is reported next to all successful records.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::{RetryingScraper, ScrapeListener, Scraped};
use crate::collectors::{UrlCollector, build_collector};
use crate::config::{AppConfig, SourceConfig};
use crate::error::ScrapeError;
use crate::extractors::build_extractor;
use crate::fetch::{PageFetcher, Throttle};
use crate::geocoding::Geocoder;
use crate::models::Record;

/// Run-wide knobs shared by every source.
#[derive(Debug, Clone, Copy)]
pub struct ScrapeSettings {
    pub max_retries: u32,
    /// Default spacing between detail-page requests of one source.
    pub request_delay: Duration,
}

impl ScrapeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            request_delay: Duration::from_secs(config.request_delay),
        }
    }
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_delay: Duration::from_secs(1),
        }
    }
}

/// What happened to one source.
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub source_code: String,
    /// Detail-page URLs discovered.
    pub urls: usize,
    /// Valid records extracted.
    pub records: usize,
    /// Pages fetched fine but without usable data.
    pub skipped: usize,
    /// Pages whose fetch exhausted its retries.
    pub failed_urls: Vec<String>,
    pub elapsed: Duration,
    /// Set when the source as a whole failed.
    pub error: Option<String>,
}

impl SourceReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Every valid record, in per-source scrape order.
    pub records: Vec<Record>,
    /// One entry per source that was started, in request order.
    pub sources: Vec<SourceReport>,
    /// First source error; `records` still holds everything scraped.
    pub error: Option<ScrapeError>,
    pub concurrent: bool,
    pub elapsed: Duration,
}

struct SourceOutcome {
    report: SourceReport,
    records: Vec<Record>,
    error: Option<ScrapeError>,
}

/// Everything needed to scrape one source, built before the run starts.
struct SourcePipeline {
    source: Arc<SourceConfig>,
    collector: Box<dyn UrlCollector>,
    scraper: RetryingScraper,
}

impl SourcePipeline {
    fn build(
        source: Arc<SourceConfig>,
        fetcher: &Arc<dyn PageFetcher>,
        geocoder: &Option<Arc<dyn Geocoder>>,
        listener: &Option<Arc<dyn ScrapeListener>>,
        settings: ScrapeSettings,
    ) -> Result<Self, ScrapeError> {
        let wrap = |e| ScrapeError::for_source(&source.source_code, e);
        let collector = build_collector(&source.pages.homepage, fetcher.clone()).map_err(wrap)?;
        let extractor = build_extractor(&source, geocoder.clone()).map_err(wrap)?;
        let scraper = RetryingScraper::new(
            &source.source_code,
            fetcher.clone(),
            extractor,
            Throttle::new(source.request_delay(settings.request_delay)),
            settings.max_retries,
        )
        .with_listener(listener.clone());

        Ok(Self {
            source,
            collector,
            scraper,
        })
    }

    #[instrument(level = "info", skip_all, fields(source = %self.source.source_code))]
    async fn run(mut self) -> SourceOutcome {
        let started = Instant::now();
        let code = self.source.source_code.clone();
        let mut report = SourceReport {
            source_code: code.clone(),
            ..Default::default()
        };
        info!(
            homepage = %self.source.base_url,
            homepage_strategy = self.source.pages.homepage.name(),
            detail_strategy = self.source.pages.detail_page.name(),
            "Collecting detail URLs"
        );

        let urls = match self.collector.collect(&self.source.base_url).await {
            Ok(urls) => urls,
            Err(e) => {
                let e = ScrapeError::for_source(&code, e);
                error!(error = %e, "URL discovery failed");
                report.error = Some(e.to_string());
                report.elapsed = started.elapsed();
                return SourceOutcome {
                    report,
                    records: Vec::new(),
                    error: Some(e),
                };
            }
        };
        report.urls = urls.len();

        let mut records = Vec::new();
        for url in &urls {
            match self.scraper.scrape(url).await {
                Ok(Scraped { record, elapsed }) => {
                    debug!(%url, found = record.is_some(), elapsed_ms = elapsed.as_millis() as u64, "Page scraped");
                    match record {
                        Some(record) => records.push(record),
                        None => report.skipped += 1,
                    }
                }
                Err(e) => {
                    warn!(%url, error = %e, "Skipping page");
                    report.failed_urls.push(url.to_string());
                }
            }
        }

        report.records = records.len();
        report.elapsed = started.elapsed();
        info!(
            urls = report.urls,
            records = report.records,
            skipped = report.skipped,
            failed = report.failed_urls.len(),
            wait_ms = self.scraper.wait_ms(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Source finished"
        );
        SourceOutcome {
            report,
            records,
            error: None,
        }
    }
}

pub struct Scheduler {
    sources: Vec<Arc<SourceConfig>>,
    fetcher: Arc<dyn PageFetcher>,
    geocoder: Option<Arc<dyn Geocoder>>,
    listener: Option<Arc<dyn ScrapeListener>>,
    settings: ScrapeSettings,
}

impl Scheduler {
    pub fn new(
        sources: Vec<SourceConfig>,
        fetcher: Arc<dyn PageFetcher>,
        geocoder: Option<Arc<dyn Geocoder>>,
        settings: ScrapeSettings,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(Arc::new).collect(),
            fetcher,
            geocoder,
            listener: None,
            settings,
        }
    }

    /// Forward every extracted record to `listener` (usually the publisher).
    pub fn with_listener(mut self, listener: Arc<dyn ScrapeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Resolve requested codes to configured sources. Empty means all.
    fn select(&self, codes: &[String]) -> Result<Vec<Arc<SourceConfig>>, ScrapeError> {
        if codes.is_empty() {
            return Ok(self.sources.clone());
        }
        codes
            .iter()
            .map(|code| {
                self.sources
                    .iter()
                    .find(|s| s.source_code.eq_ignore_ascii_case(code))
                    .cloned()
                    .ok_or_else(|| ScrapeError::UnknownSource(code.clone()))
            })
            .collect()
    }

    /// Scrape the requested sources.
    ///
    /// `Err` means the run never started (unknown source or bad selector).
    /// Failures during the run are reported through [`RunReport::error`].
    #[instrument(level = "info", skip_all, fields(concurrent = concurrent))]
    pub async fn run(&self, codes: &[String], concurrent: bool) -> Result<RunReport, ScrapeError> {
        let pipelines = self
            .select(codes)?
            .into_iter()
            .map(|source| {
                SourcePipeline::build(source, &self.fetcher, &self.geocoder, &self.listener, self.settings)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let order: Vec<String> = pipelines.iter().map(|p| p.source.source_code.clone()).collect();
        info!(sources = ?order, "Starting run");

        let started = Instant::now();
        let mut report = if concurrent {
            run_concurrent(pipelines).await
        } else {
            run_sequential(pipelines).await
        };
        report.concurrent = concurrent;
        report.elapsed = started.elapsed();
        report
            .sources
            .sort_by_key(|s| order.iter().position(|c| *c == s.source_code));

        info!(
            records = report.records.len(),
            failed_sources = report.sources.iter().filter(|s| !s.succeeded()).count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Run finished"
        );
        Ok(report)
    }
}

async fn run_sequential(pipelines: Vec<SourcePipeline>) -> RunReport {
    let mut report = RunReport::default();
    for pipeline in pipelines {
        let outcome = pipeline.run().await;
        report.records.extend(outcome.records);
        report.sources.push(outcome.report);
        if let Some(e) = outcome.error {
            report.error = Some(e);
            break;
        }
    }
    report
}

async fn run_concurrent(pipelines: Vec<SourcePipeline>) -> RunReport {
    let mut tasks: FuturesUnordered<_> = pipelines
        .into_iter()
        .map(|pipeline| {
            let code = pipeline.source.source_code.clone();
            let handle = tokio::spawn(pipeline.run());
            async move { (code, handle.await) }
        })
        .collect();

    let mut report = RunReport::default();
    while let Some((code, joined)) = tasks.next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = e.to_string();
                error!(source = %code, %reason, "Scrape task aborted");
                SourceOutcome {
                    report: SourceReport {
                        source_code: code.clone(),
                        error: Some(reason.clone()),
                        ..Default::default()
                    },
                    records: Vec::new(),
                    error: Some(ScrapeError::TaskAborted { code, reason }),
                }
            }
        };
        report.records.extend(outcome.records);
        report.sources.push(outcome.report);
        if report.error.is_none() {
            report.error = outcome.error;
        }
    }
    report
}
