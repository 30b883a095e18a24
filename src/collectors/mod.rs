//! Detail-page URL discovery.
//!
//! Every source starts from its homepage and needs the list of detail pages
//! to scrape. Sites publish that list in different ways, so discovery is a
//! strategy selected by the source's configuration:
//!
//! | Strategy | Type | How |
//! |----------|------|-----|
//! | `json_api` | [`JsonApiCollector`] | Homepage element points at a JSON endpoint listing the parks |
//! | `static_html` | [`StaticHtmlCollector`] | Links inside a section of the homepage, filtered by an href glob |
//!
//! A collector surfaces transport failures as errors and treats "fetched
//! fine, found nothing" as an error too, so an empty source never passes for
//! a successful one.

use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::config::HomepageStrategy;
use crate::error::ScrapeError;
use crate::fetch::PageFetcher;

pub mod json_api;
pub mod static_html;

pub use json_api::JsonApiCollector;
pub use static_html::StaticHtmlCollector;

#[async_trait]
pub trait UrlCollector: Send + Sync {
    /// Discover detail-page URLs, in page order, starting from `homepage`.
    async fn collect(&self, homepage: &Url) -> Result<Vec<Url>, ScrapeError>;
}

/// Build the collector for a homepage strategy.
///
/// Selector compilation happens here, so configuration mistakes surface
/// before any request is sent.
pub fn build_collector(
    strategy: &HomepageStrategy,
    fetcher: Arc<dyn PageFetcher>,
) -> Result<Box<dyn UrlCollector>, ScrapeError> {
    Ok(match strategy {
        HomepageStrategy::JsonApi(selectors) => Box::new(JsonApiCollector::new(selectors, fetcher)?),
        HomepageStrategy::StaticHtml(selectors) => {
            Box::new(StaticHtmlCollector::new(selectors, fetcher)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JsonApiSelectors, StaticHtmlSelectors};
    use crate::fetch::testing::MockFetcher;

    #[test]
    fn test_build_collector_rejects_bad_selector() {
        let strategy = HomepageStrategy::JsonApi(JsonApiSelectors {
            api_url_selector: "div[".into(),
            api_url_attribute: "data-api-url".into(),
            list_path: "items".into(),
            url_path: "url".into(),
            name_path: None,
        });
        let result = build_collector(&strategy, Arc::new(MockFetcher::new()));
        assert!(matches!(result, Err(ScrapeError::InvalidSelector { .. })));
    }

    #[test]
    fn test_build_collector_static_html_defaults() {
        let strategy = HomepageStrategy::StaticHtml(StaticHtmlSelectors::default());
        assert!(build_collector(&strategy, Arc::new(MockFetcher::new())).is_ok());
    }
}
