//! Command-line interface definitions for the park scraper.
//!
//! All options can be given as flags; the configuration path and the
//! credentials can also come from environment variables.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the park scraper.
///
/// # Examples
///
/// ```sh
/// # Scrape every configured source, one after another
/// park_scraper -c config.yaml -o ./output
///
/// # Two sources at once, also posting to the parks API
/// park_scraper -s IL,IN --concurrent --api-base http://localhost:8080/api
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "PARK_SCRAPER_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Comma-separated source codes to scrape (default: all configured sources)
    #[arg(short, long, value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Scrape sources concurrently instead of one after another
    #[arg(long)]
    pub concurrent: bool,

    /// Write one JSON file per record under this directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Base URL of the parks API; records are POSTed to `<base>/park`
    #[arg(long, env = "PARKS_API_BASE")]
    pub api_base: Option<String>,

    /// Write all records of the run to this file as one JSON array
    #[arg(long)]
    pub aggregate_output: Option<PathBuf>,

    /// Mapbox access token, enables address geocoding
    #[arg(long, env = "MAPBOX_API_KEY", hide_env_values = true)]
    pub mapbox_api_key: Option<String>,
}
