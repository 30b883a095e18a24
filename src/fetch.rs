//! Page fetching: the lowest-level I/O primitive of the pipeline.
//!
//! - [`PageFetcher`]: async trait issuing a single GET and returning a [`Page`]
//! - [`HttpFetcher`]: the `reqwest` implementation used in production
//! - [`Throttle`]: fixed spacing between consecutive requests to one source
//!
//! A fetch either yields the full body of a 2xx response or an error. Errors
//! are always treated as transient by the retrying unit.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use scraper::Html;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, instrument};
use url::Url;

use crate::error::ScrapeError;

const USER_AGENT: &str = concat!(
    "park_scraper/",
    env!("CARGO_PKG_VERSION"),
    " (state park data collector)"
);

/// A fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects; relative links resolve against it.
    pub url: Url,
    pub content_type: Option<String>,
    pub body: String,
}

impl Page {
    pub fn new(url: Url, content_type: Option<String>, body: impl Into<String>) -> Self {
        Self {
            url,
            content_type,
            body: body.into(),
        }
    }

    /// Parse the body as an HTML document.
    ///
    /// The returned tree is not `Send`; parse and query it inside synchronous
    /// code and never hold it across an `.await`.
    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"))
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Page, ScrapeError>;
}

/// [`PageFetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(ScrapeError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<Page, ScrapeError> {
        let transport = |source: reqwest::Error| ScrapeError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url.clone()).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(transport)?;

        debug!(status = status.as_u16(), bytes = body.len(), "Fetched page");
        Ok(Page::new(final_url, content_type, body))
    }
}

/// Enforces a minimum delay between consecutive requests.
///
/// One throttle belongs to one source's pipeline, so requests to that origin
/// are serialized and spaced by `delay`.
#[derive(Debug)]
pub struct Throttle {
    delay: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last: None }
    }

    /// Wait until the next request may be issued, then mark it as issued.
    pub async fn ready(&mut self) {
        if let Some(last) = self.last {
            sleep_until(last + self.delay).await;
        }
        self.last = Some(Instant::now());
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MockFetcher;
    use super::*;

    #[test]
    fn test_page_content_type() {
        let url = Url::parse("https://example.org/api").unwrap();
        let page = Page::new(url.clone(), Some("application/json; charset=utf-8".into()), "{}");
        assert!(page.is_json());
        let page = Page::new(url, Some("text/html".into()), "<html></html>");
        assert!(!page.is_json());
    }

    #[tokio::test]
    async fn test_mock_fetcher_scripted_failures() {
        let fetcher = MockFetcher::new()
            .html("https://example.org/", "<h1>hi</h1>")
            .failing("https://example.org/", 1);
        let url = Url::parse("https://example.org/").unwrap();

        assert!(matches!(
            fetcher.fetch(&url).await,
            Err(ScrapeError::Status { status: 503, .. })
        ));
        let page = fetcher.fetch(&url).await.unwrap();
        assert!(page.body.contains("hi"));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_requests() {
        let mut throttle = Throttle::new(Duration::from_secs(2));
        let start = Instant::now();
        throttle.ready().await;
        assert!(start.elapsed() < Duration::from_millis(1));
        throttle.ready().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
        throttle.ready().await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(Duration::from_secs(5)).is_ok());
    }
}
