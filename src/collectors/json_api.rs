//! Discovery through a JSON listing endpoint.
//!
//! Some park sites render their park list client-side: the homepage only
//! carries an element such as `<div data-api-url="/content/parks.model.json">`
//! and the browser fetches the list from there. This collector follows the
//! same path:
//!
//! 1. Fetch the homepage and read the endpoint attribute from every element
//!    matching `apiUrlSelector`
//! 2. Fetch each endpoint and walk `listPath` (dotted) to the item array
//! 3. Read `urlPath` from every item and resolve it against the endpoint URL
//!
//! Items without a URL are skipped. A payload where `listPath` does not
//! resolve is logged with a bounded preview so the configuration can be fixed.

use async_trait::async_trait;
use scraper::Selector;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::UrlCollector;
use crate::config::JsonApiSelectors;
use crate::error::ScrapeError;
use crate::fetch::{Page, PageFetcher};
use crate::utils::{parse_selector, truncate_for_log};

const PAYLOAD_PREVIEW_BYTES: usize = 500;

/// Resolve a dotted path such as `meta.dynamicPageLink` inside a JSON value.
///
/// Object keys are looked up by name, numeric segments index into arrays.
/// An empty path returns the value itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub struct JsonApiCollector {
    api_selector: Selector,
    selectors: JsonApiSelectors,
    fetcher: Arc<dyn PageFetcher>,
}

impl JsonApiCollector {
    pub fn new(selectors: &JsonApiSelectors, fetcher: Arc<dyn PageFetcher>) -> Result<Self, ScrapeError> {
        Ok(Self {
            api_selector: parse_selector(&selectors.api_url_selector)?,
            selectors: selectors.clone(),
            fetcher,
        })
    }

    /// Endpoint URLs referenced by the homepage, resolved against it.
    fn endpoints(&self, homepage: &Page) -> Vec<Url> {
        let document = homepage.html();
        document
            .select(&self.api_selector)
            .filter_map(|el| el.value().attr(&self.selectors.api_url_attribute))
            .filter_map(|href| match homepage.url.join(href.trim()) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(href, error = %e, "Skipping unparseable API URL");
                    None
                }
            })
            .collect()
    }

    /// Detail-page URLs listed in one endpoint response.
    fn urls_from_payload(&self, payload: &Page) -> Vec<Url> {
        if !payload.is_json() {
            debug!(content_type = ?payload.content_type, "API response is not labelled JSON; parsing anyway");
        }

        let json: Value = match serde_json::from_str(&payload.body) {
            Ok(json) => json,
            Err(e) => {
                warn!(
                    url = %payload.url,
                    error = %e,
                    preview = %truncate_for_log(&payload.body, PAYLOAD_PREVIEW_BYTES),
                    "API response is not valid JSON"
                );
                return Vec::new();
            }
        };

        let items = match lookup(&json, &self.selectors.list_path) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                warn!(
                    url = %payload.url,
                    list_path = %self.selectors.list_path,
                    preview = %truncate_for_log(&other.to_string(), PAYLOAD_PREVIEW_BYTES),
                    "List path does not point at an array"
                );
                return Vec::new();
            }
            None => {
                warn!(
                    url = %payload.url,
                    list_path = %self.selectors.list_path,
                    preview = %truncate_for_log(&payload.body, PAYLOAD_PREVIEW_BYTES),
                    "List path not found in API response"
                );
                return Vec::new();
            }
        };
        debug!(items = items.len(), "Found list items");

        let mut urls = Vec::with_capacity(items.len());
        for item in items {
            let Some(link) = lookup(item, &self.selectors.url_path).and_then(Value::as_str) else {
                continue;
            };
            match payload.url.join(link.trim()) {
                Ok(url) => {
                    let name = self
                        .selectors
                        .name_path
                        .as_deref()
                        .and_then(|path| lookup(item, path))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    debug!(name, %url, "Collected detail URL");
                    urls.push(url);
                }
                Err(e) => warn!(link, error = %e, "Skipping unparseable detail URL"),
            }
        }
        urls
    }
}

#[async_trait]
impl UrlCollector for JsonApiCollector {
    #[instrument(level = "info", skip_all, fields(%homepage))]
    async fn collect(&self, homepage: &Url) -> Result<Vec<Url>, ScrapeError> {
        let page = self.fetcher.fetch(homepage).await?;
        let endpoints = self.endpoints(&page);
        if endpoints.is_empty() {
            warn!(selector = %self.selectors.api_url_selector, "No API endpoint found on homepage");
        }

        let mut urls = Vec::new();
        for endpoint in endpoints {
            info!(%endpoint, "Fetching JSON API");
            let payload = self.fetcher.fetch(&endpoint).await?;
            urls.extend(self.urls_from_payload(&payload));
        }

        if urls.is_empty() {
            return Err(ScrapeError::NoUrlsDiscovered(homepage.to_string()));
        }
        info!(count = urls.len(), "Collected detail URLs");
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockFetcher;
    use serde_json::json;

    const HOMEPAGE: &str = "https://dnr.example.gov/parks.html";
    const API: &str = "https://dnr.example.gov/content/parks.model.json";

    fn selectors() -> JsonApiSelectors {
        JsonApiSelectors {
            api_url_selector: "div.park-list[data-api-url]".into(),
            api_url_attribute: "data-api-url".into(),
            list_path: "data.listItems".into(),
            url_path: "meta.dynamicPageLink".into(),
            name_path: Some("parkName".into()),
        }
    }

    fn homepage_html() -> String {
        r#"<html><body>
            <div class="park-list" data-api-url="/content/parks.model.json"></div>
        </body></html>"#
            .to_string()
    }

    #[test]
    fn test_lookup_paths() {
        let value = json!({"a": {"b": [{"c": "x"}, {"c": "y"}]}, "n": 3});
        assert_eq!(lookup(&value, "a.b.1.c"), Some(&json!("y")));
        assert_eq!(lookup(&value, "n"), Some(&json!(3)));
        assert_eq!(lookup(&value, ""), Some(&value));
        assert!(lookup(&value, "a.missing").is_none());
        assert!(lookup(&value, "n.deeper").is_none());
        assert!(lookup(&value, "a.b.9").is_none());
    }

    #[tokio::test]
    async fn test_collect_resolves_relative_to_api_url() {
        let payload = json!({
            "data": {
                "listItems": [
                    {"parkName": "Starved Rock", "meta": {"dynamicPageLink": "parks/starved-rock.html"}},
                    {"parkName": "No Link", "meta": {}},
                    {"parkName": "Absolute", "meta": {"dynamicPageLink": "https://other.example/p/1"}},
                    {"parkName": "Rooted", "meta": {"dynamicPageLink": "/parks/rooted.html"}}
                ]
            }
        });
        let fetcher = MockFetcher::new()
            .html(HOMEPAGE, &homepage_html())
            .json(API, &payload.to_string());
        let collector = JsonApiCollector::new(&selectors(), Arc::new(fetcher)).unwrap();

        let urls = collector.collect(&Url::parse(HOMEPAGE).unwrap()).await.unwrap();
        let urls: Vec<String> = urls.into_iter().map(String::from).collect();
        assert_eq!(
            urls,
            vec![
                "https://dnr.example.gov/content/parks/starved-rock.html",
                "https://other.example/p/1",
                "https://dnr.example.gov/parks/rooted.html",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_list_path_yields_no_urls_error() {
        let fetcher = MockFetcher::new()
            .html(HOMEPAGE, &homepage_html())
            .json(API, r#"{"results": []}"#);
        let collector = JsonApiCollector::new(&selectors(), Arc::new(fetcher)).unwrap();

        let err = collector.collect(&Url::parse(HOMEPAGE).unwrap()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NoUrlsDiscovered(url) if url == HOMEPAGE));
    }

    #[tokio::test]
    async fn test_homepage_failure_is_surfaced() {
        let fetcher = MockFetcher::new();
        let collector = JsonApiCollector::new(&selectors(), Arc::new(fetcher)).unwrap();

        let err = collector.collect(&Url::parse(HOMEPAGE).unwrap()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_tolerated_then_reported_empty() {
        let fetcher = MockFetcher::new()
            .html(HOMEPAGE, &homepage_html())
            .json(API, "<html>maintenance</html>");
        let collector = JsonApiCollector::new(&selectors(), Arc::new(fetcher)).unwrap();

        let err = collector.collect(&Url::parse(HOMEPAGE).unwrap()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NoUrlsDiscovered(_)));
    }
}
