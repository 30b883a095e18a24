//! # Park Scraper
//!
//! Collects state park records from heterogeneous government websites,
//! normalizes them into one schema, and delivers them to pluggable sinks.
//!
//! ## Features
//!
//! - Per-source homepage discovery: JSON listing endpoints or filtered links
//! - Per-source detail extraction: printed coordinates or geocoded addresses
//! - Retrying fetches with adaptive backoff and a per-source request delay
//! - Sequential or concurrent scraping of several sources
//! - Bounded event publisher fanning records out to file and API sinks
//!
//! ## Usage
//!
//! ```sh
//! park_scraper -c config.yaml -o ./output --concurrent
//! ```
//!
//! ## Architecture
//!
//! 1. **Configuration**: load and validate the YAML source definitions
//! 2. **Scheduling**: build every source pipeline, then run them
//! 3. **Publishing**: each extracted record becomes an event for the sinks
//! 4. **Reporting**: drain the publisher, print the summary, write the aggregate

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod collectors;
mod config;
mod error;
mod extractors;
mod fetch;
mod geocoding;
mod models;
mod outputs;
mod publish;
mod scrapers;
mod utils;

use cli::Cli;
use fetch::HttpFetcher;
use geocoding::{Geocoder, MapboxGeocoder};
use outputs::{ApiSink, FileSink, json, summary};
use publish::EventPublisher;
use scrapers::{ScrapeSettings, Scheduler};
use utils::{ensure_writable_dir, normalize_source_codes};

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    let config = config::load_config(&args.config).await?;

    init_tracing(&config.log_level);
    let start_time = std::time::Instant::now();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        sources = config.sources.len(),
        "park_scraper starting up"
    );
    debug!(?args.sources, args.concurrent, ?args.output_dir, "Parsed CLI arguments");

    // Early check: fail before scraping if records cannot be written
    if let Some(dir) = &args.output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Collaborators ----
    let fetcher = Arc::new(HttpFetcher::new(config.request_timeout())?);
    let geocoder: Option<Arc<dyn Geocoder>> = match &args.mapbox_api_key {
        Some(key) if !key.trim().is_empty() => {
            let geocoder: Arc<dyn Geocoder> = Arc::new(MapboxGeocoder::new(key.trim())?);
            Some(geocoder)
        }
        _ => {
            info!("No Mapbox key; address-based sources use their default coordinate");
            None
        }
    };

    // ---- Publisher and sinks ----
    let publisher = EventPublisher::new();
    if let Some(dir) = &args.output_dir {
        publisher.subscribe(Arc::new(FileSink::new(dir)));
    }
    if let Some(base) = &args.api_base {
        let sink = ApiSink::new(base)?;
        info!(endpoint = sink.endpoint(), "Posting records to parks API");
        publisher.subscribe(Arc::new(sink));
    }

    // ---- Run ----
    let scheduler = Scheduler::new(
        config.sources.clone(),
        fetcher,
        geocoder,
        ScrapeSettings::from_config(&config),
    )
    .with_listener(Arc::new(publisher.handle()));

    let codes = normalize_source_codes(&args.sources);
    let report = match scheduler.run(&codes, args.concurrent).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Run aborted before scraping started");
            publisher.close().await;
            return Err(e.into());
        }
    };

    publisher.wait_for_idle().await;
    let stats = publisher.close().await;
    if stats.failures > 0 {
        warn!(failures = stats.failures, "Some records were not delivered to every sink");
    }

    println!("{}", summary::render_summary(&report));

    if let Some(path) = &args.aggregate_output {
        if let Err(e) = json::write_records(&report.records, path).await {
            error!(path = %path.display(), error = %e, "Failed to write aggregate output");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        records = report.records.len(),
        events = stats.events,
        "Execution complete"
    );

    match report.error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
