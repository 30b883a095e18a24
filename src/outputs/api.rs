//! Parks API writer.
//!
//! Each record is POSTed as JSON to `{api_base}/park`. `200 OK` and
//! `201 Created` count as success; any other status is returned as an error
//! for the publisher to log.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{BoxError, ScrapeError};
use crate::models::{Record, ScrapedEvent};
use crate::publish::Subscriber;
use crate::utils::truncate_for_log;

#[derive(Debug, Clone)]
pub struct ApiSink {
    endpoint: Url,
    client: reqwest::Client,
}

impl ApiSink {
    pub fn new(api_base: &str) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(ScrapeError::Client)?;
        let endpoint = format!("{}/park", api_base.trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint).map_err(|source| ScrapeError::InvalidUrl {
            url: endpoint.clone(),
            source,
        })?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    #[instrument(level = "debug", skip_all, fields(name = %record.name, endpoint = %self.endpoint))]
    pub async fn post(&self, record: &Record) -> Result<(), BoxError> {
        let response = self.client.post(self.endpoint.clone()).json(record).send().await?;
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            debug!(status = status.as_u16(), "Record accepted");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(format!(
            "API returned HTTP {} for {}: {}",
            status.as_u16(),
            record.name,
            truncate_for_log(&body, 200)
        )
        .into())
    }
}

#[async_trait]
impl Subscriber for ApiSink {
    fn name(&self) -> &str {
        "api"
    }

    async fn on_record_scraped(&self, event: &ScrapedEvent) -> Result<(), BoxError> {
        self.post(&event.record).await
    }
}
