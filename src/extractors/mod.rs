//! Detail-page extraction.
//!
//! An extractor turns one fetched detail page into a [`Record`], or returns
//! `None` when the page has no usable data (empty name, unparseable
//! coordinates). `None` is not an error: the page is skipped and nothing is
//! published for it.
//!
//! | Strategy | Type | Coordinates from |
//! |----------|------|------------------|
//! | `static_html` | [`SelectorExtractor`] | latitude/longitude elements on the page |
//! | `geocoded_address` | [`AddressExtractor`] | geocoded street address, falling back to the source's default coordinate |

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;

use crate::config::{DetailPageStrategy, SourceConfig};
use crate::error::ScrapeError;
use crate::fetch::Page;
use crate::geocoding::Geocoder;
use crate::models::{Activity, Record};
use crate::utils::parse_selector;

pub mod address;
pub mod selector;

pub use address::AddressExtractor;
pub use selector::SelectorExtractor;

#[async_trait]
pub trait RecordExtractor: Send + Sync {
    async fn extract(&self, page: &Page) -> Option<Record>;
}

/// Build the extractor configured for `source`.
///
/// `geocoder` is only consulted by address-based extraction; without one,
/// such sources rely on their default coordinate.
pub fn build_extractor(
    source: &SourceConfig,
    geocoder: Option<Arc<dyn Geocoder>>,
) -> Result<Arc<dyn RecordExtractor>, ScrapeError> {
    Ok(match &source.pages.detail_page {
        DetailPageStrategy::StaticHtml(selectors) => {
            Arc::new(SelectorExtractor::new(&source.source_code, selectors)?)
        }
        DetailPageStrategy::GeocodedAddress(selectors) => Arc::new(AddressExtractor::new(
            &source.source_code,
            selectors,
            source.default_coordinate,
            geocoder,
        )?),
    })
}

/// Activity list selector plus the optional attribute used as description.
pub(crate) struct ActivitySelector {
    selector: Selector,
    description_attribute: Option<String>,
}

impl ActivitySelector {
    pub(crate) fn new(selector: &str, description_attribute: Option<&str>) -> Result<Self, ScrapeError> {
        Ok(Self {
            selector: parse_selector(selector)?,
            description_attribute: description_attribute.map(str::to_string),
        })
    }

    /// Trimmed, non-empty activities in document order.
    pub(crate) fn collect(&self, document: &Html) -> Vec<Activity> {
        document
            .select(&self.selector)
            .filter_map(|el| {
                let name = el.text().collect::<String>().trim().to_string();
                if name.is_empty() {
                    return None;
                }
                let description = self
                    .description_attribute
                    .as_deref()
                    .and_then(|attr| el.value().attr(attr))
                    .map(|d| d.trim().to_string())
                    .unwrap_or_default();
                Some(Activity {
                    description,
                    ..Activity::new(name)
                })
            })
            .collect()
    }
}

/// Concatenated text of every element matching `selector`, trimmed.
pub(crate) fn child_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .flat_map(|el| el.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parse a coordinate as shown on a page. Non-finite values are rejected.
pub(crate) fn parse_coordinate(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
