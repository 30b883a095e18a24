//! Typed scraper configuration.
//!
//! The configuration file is YAML (plain JSON parses as well). Every source
//! names its homepage discovery strategy and its detail-page extraction
//! strategy together with the selectors that strategy needs:
//!
//! ```yaml
//! logLevel: info
//! requestDelay: 1
//! maxRetries: 3
//! sources:
//!   - sourceCode: IN
//!     baseUrl: https://www.in.gov/dnr/state-parks/
//!     defaultCoordinate: { latitude: 41.0, longitude: -86.0 }
//!     pages:
//!       homepage:
//!         strategy: static_html
//!         selectors:
//!           section: { id: "564717" }
//!           hrefPattern: "/dnr/state-parks/parks-lakes/*"
//!       detailPage:
//!         strategy: geocoded_address
//!         selectors:
//!           nameSelector: h1
//!           addressSelector: "div#property-add p"
//! ```

use itertools::Itertools;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::ScrapeError;
use crate::models::Coordinates;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_delay() -> u64 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

fn default_api_url_attribute() -> String {
    "data-api-url".to_string()
}

fn default_address_label() -> String {
    "Address:".to_string()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Fallback log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds between consecutive detail-page requests of one source.
    #[serde(default = "default_request_delay")]
    pub request_delay: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(alias = "scrapers")]
    pub sources: Vec<SourceConfig>,
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    fn validate(&self) -> Result<(), ScrapeError> {
        if self.sources.is_empty() {
            return Err(ScrapeError::InvalidConfig("no sources configured".into()));
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            let code = source.source_code.trim();
            if code.is_empty() {
                return Err(ScrapeError::InvalidConfig(format!(
                    "source with base URL {} is missing sourceCode",
                    source.base_url
                )));
            }
            // Codes are looked up case-insensitively, so `il` and `IL` collide.
            if !seen.insert(code.to_ascii_lowercase()) {
                return Err(ScrapeError::InvalidConfig(format!(
                    "duplicate sourceCode: {code}"
                )));
            }
        }
        Ok(())
    }
}

/// One scrapeable site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub source_code: String,
    /// Homepage from which detail pages are discovered.
    pub base_url: Url,
    /// Overrides [`AppConfig::request_delay`] for this source.
    #[serde(default)]
    pub request_delay: Option<u64>,
    /// Used when a detail page yields no coordinates of its own.
    #[serde(default)]
    pub default_coordinate: Option<Coordinates>,
    pub pages: PagesConfig,
}

impl SourceConfig {
    pub fn request_delay(&self, fallback: Duration) -> Duration {
        self.request_delay.map(Duration::from_secs).unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagesConfig {
    pub homepage: HomepageStrategy,
    #[serde(alias = "parkPage")]
    pub detail_page: DetailPageStrategy,
}

/// How detail-page URLs are discovered from the homepage.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "strategy", content = "selectors", rename_all = "snake_case")]
pub enum HomepageStrategy {
    JsonApi(JsonApiSelectors),
    StaticHtml(StaticHtmlSelectors),
}

impl HomepageStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            HomepageStrategy::JsonApi(_) => "json_api",
            HomepageStrategy::StaticHtml(_) => "static_html",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonApiSelectors {
    /// CSS selector of the element that carries the API endpoint.
    pub api_url_selector: String,
    /// Attribute on that element holding the endpoint URL.
    #[serde(default = "default_api_url_attribute")]
    pub api_url_attribute: String,
    /// Dotted path to the list of items in the API response.
    pub list_path: String,
    /// Dotted path, relative to one item, to its detail-page URL.
    pub url_path: String,
    /// Dotted path, relative to one item, to its display name.
    #[serde(default)]
    pub name_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticHtmlSelectors {
    #[serde(default)]
    pub section: SectionSelector,
    /// Glob matched against each link's raw `href`. Empty matches all.
    #[serde(default)]
    pub href_pattern: String,
    #[serde(default)]
    pub name_attribute: LinkNameAttribute,
}

/// Container holding the detail-page links. The most specific field wins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionSelector {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
}

impl SectionSelector {
    /// CSS selector for the section: `selector`, then `id`, then `class`, else `body`.
    pub fn css(&self) -> String {
        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        if let Some(selector) = non_empty(&self.selector) {
            selector
        } else if let Some(id) = non_empty(&self.id) {
            // Attribute form so ids starting with a digit stay valid CSS.
            format!("[id=\"{id}\"]")
        } else if let Some(class) = non_empty(&self.class) {
            format!(".{}", class.split_whitespace().join("."))
        } else {
            "body".to_string()
        }
    }
}

/// Where a link's display name comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkNameAttribute {
    #[default]
    Text,
    Title,
    AriaLabel,
}

/// How a detail page is turned into a record.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "strategy", content = "selectors", rename_all = "snake_case")]
pub enum DetailPageStrategy {
    StaticHtml(DetailSelectors),
    GeocodedAddress(AddressSelectors),
}

impl DetailPageStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            DetailPageStrategy::StaticHtml(_) => "static_html",
            DetailPageStrategy::GeocodedAddress(_) => "geocoded_address",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailSelectors {
    pub name_selector: String,
    pub latitude_selector: String,
    pub longitude_selector: String,
    #[serde(default)]
    pub activities_selector: Option<String>,
    /// Attribute of each activity element used as its description.
    #[serde(default)]
    pub activity_description_attribute: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSelectors {
    pub name_selector: String,
    /// Elements searched for the address block.
    pub address_selector: String,
    /// Marker text identifying the address block; removed from the result.
    #[serde(default = "default_address_label")]
    pub address_label: String,
    /// Appended when only a street line is found (e.g. "Indiana").
    #[serde(default)]
    pub address_region: Option<String>,
    #[serde(default)]
    pub activities_selector: Option<String>,
    #[serde(default)]
    pub latitude_selector: Option<String>,
    #[serde(default)]
    pub longitude_selector: Option<String>,
}

/// Parse and validate configuration text. `origin` only labels errors.
pub fn parse_config(text: &str, origin: &str) -> Result<AppConfig, ScrapeError> {
    let config: AppConfig = serde_yaml::from_str(text).map_err(|source| ScrapeError::ConfigParse {
        path: origin.to_string(),
        source,
    })?;
    config.validate()?;
    debug!(sources = config.sources.len(), "Parsed configuration");
    Ok(config)
}

/// Read, parse and validate the configuration file at `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_config(path: &Path) -> Result<AppConfig, ScrapeError> {
    let origin = path.display().to_string();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ScrapeError::ConfigRead {
            path: origin.clone(),
            source,
        })?;
    let config = parse_config(&text, &origin)?;
    info!(
        sources = config.sources.len(),
        request_delay_secs = config.request_delay,
        max_retries = config.max_retries,
        "Loaded configuration"
    );
    Ok(config)
}
