//! Extraction for pages that print their coordinates.
//!
//! Name, latitude and longitude are read with configured CSS selectors;
//! activities come from an optional list selector.

use async_trait::async_trait;
use scraper::Selector;
use tracing::{debug, instrument};

use super::{ActivitySelector, RecordExtractor, child_text, parse_coordinate};
use crate::config::DetailSelectors;
use crate::error::ScrapeError;
use crate::fetch::Page;
use crate::models::Record;
use crate::utils::parse_selector;

pub struct SelectorExtractor {
    source_code: String,
    name: Selector,
    latitude: Selector,
    longitude: Selector,
    activities: Option<ActivitySelector>,
}

impl SelectorExtractor {
    pub fn new(source_code: &str, selectors: &DetailSelectors) -> Result<Self, ScrapeError> {
        let activities = selectors
            .activities_selector
            .as_deref()
            .map(|s| ActivitySelector::new(s, selectors.activity_description_attribute.as_deref()))
            .transpose()?;
        Ok(Self {
            source_code: source_code.to_string(),
            name: parse_selector(&selectors.name_selector)?,
            latitude: parse_selector(&selectors.latitude_selector)?,
            longitude: parse_selector(&selectors.longitude_selector)?,
            activities,
        })
    }

    fn read(&self, page: &Page) -> Option<Record> {
        let document = page.html();
        let name = child_text(&document, &self.name);
        let latitude_text = child_text(&document, &self.latitude);
        let longitude_text = child_text(&document, &self.longitude);
        debug!(%name, latitude = %latitude_text, longitude = %longitude_text, "Extracted fields");

        let (Some(latitude), Some(longitude)) =
            (parse_coordinate(&latitude_text), parse_coordinate(&longitude_text))
        else {
            debug!(%name, "Missing or unparseable coordinates");
            return None;
        };
        if name.is_empty() {
            debug!("Missing park name");
            return None;
        }

        Some(Record {
            name,
            source_code: self.source_code.clone(),
            address: None,
            latitude,
            longitude,
            activities: self
                .activities
                .as_ref()
                .map(|a| a.collect(&document))
                .unwrap_or_default(),
        })
    }
}

#[async_trait]
impl RecordExtractor for SelectorExtractor {
    #[instrument(level = "debug", skip_all, fields(url = %page.url))]
    async fn extract(&self, page: &Page) -> Option<Record> {
        self.read(page)
    }
}
