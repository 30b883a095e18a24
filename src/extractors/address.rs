//! Extraction for pages that only print a street address.
//!
//! The address block is found among the elements matching `addressSelector`
//! by its label (e.g. `Address:`). Its `<br>`-separated lines are trimmed,
//! the label is removed, and the first line (street) is joined with the last
//! (city, state and zip) for geocoding. When only a street is present, the
//! configured region is appended instead.
//!
//! Coordinates are taken, in order, from the page itself (when coordinate
//! selectors are configured and parse), the geocoder, and finally the
//! source's default coordinate. A page with no coordinates from any of them
//! is skipped.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{ActivitySelector, RecordExtractor, child_text, parse_coordinate};
use crate::config::AddressSelectors;
use crate::error::ScrapeError;
use crate::fetch::Page;
use crate::geocoding::Geocoder;
use crate::models::{Activity, Coordinates, Record};
use crate::utils::parse_selector;

/// Fields read synchronously from the parsed page.
#[derive(Debug, Default)]
struct PageFields {
    name: String,
    address: Option<String>,
    coordinates: Option<Coordinates>,
    activities: Vec<Activity>,
}

pub struct AddressExtractor {
    source_code: String,
    name: Selector,
    address: Selector,
    address_label: String,
    address_region: Option<String>,
    coordinates: Option<(Selector, Selector)>,
    activities: Option<ActivitySelector>,
    default_coordinate: Option<Coordinates>,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl AddressExtractor {
    pub fn new(
        source_code: &str,
        selectors: &AddressSelectors,
        default_coordinate: Option<Coordinates>,
        geocoder: Option<Arc<dyn Geocoder>>,
    ) -> Result<Self, ScrapeError> {
        let coordinates = match (&selectors.latitude_selector, &selectors.longitude_selector) {
            (Some(lat), Some(lon)) => Some((parse_selector(lat)?, parse_selector(lon)?)),
            _ => None,
        };
        let activities = selectors
            .activities_selector
            .as_deref()
            .map(|s| ActivitySelector::new(s, None))
            .transpose()?;

        Ok(Self {
            source_code: source_code.to_string(),
            name: parse_selector(&selectors.name_selector)?,
            address: parse_selector(&selectors.address_selector)?,
            address_label: selectors.address_label.clone(),
            address_region: selectors
                .address_region
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            coordinates,
            activities,
            default_coordinate,
            geocoder,
        })
    }

    fn read_page(&self, page: &Page) -> PageFields {
        let document = page.html();
        let coordinates = self.coordinates.as_ref().and_then(|(lat, lon)| {
            Some(Coordinates {
                latitude: parse_coordinate(&child_text(&document, lat))?,
                longitude: parse_coordinate(&child_text(&document, lon))?,
            })
        });
        PageFields {
            name: child_text(&document, &self.name),
            address: self.address_block(&document),
            coordinates,
            activities: self
                .activities
                .as_ref()
                .map(|a| a.collect(&document))
                .unwrap_or_default(),
        }
    }

    /// The first labelled address block, formatted for geocoding.
    fn address_block(&self, document: &Html) -> Option<String> {
        let block = document
            .select(&self.address)
            .find(|el| el.text().collect::<String>().contains(&self.address_label))?;

        let lines: Vec<String> = block_text(&block)
            .lines()
            .map(|line| line.replace(&self.address_label, "").trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        match lines.as_slice() {
            [] => None,
            [street] => Some(match &self.address_region {
                Some(region) => format!("{street}, {region}"),
                None => street.clone(),
            }),
            [street, .., city] => Some(format!("{street}, {city}")),
        }
    }

    async fn resolve(&self, address: Option<&str>) -> Option<Coordinates> {
        if let (Some(address), Some(geocoder)) = (address, &self.geocoder) {
            match geocoder.geocode(address).await {
                Ok(coordinates) => return Some(coordinates),
                Err(e) => warn!(address, error = %e, "Geocoding failed; using default coordinate"),
            }
        } else {
            debug!(has_address = address.is_some(), "Not geocoding; using default coordinate");
        }
        self.default_coordinate
    }
}

/// Text of an element with every `<br>` turned into a line break.
fn block_text(element: &ElementRef<'_>) -> String {
    let mut text = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => {}
        }
    }
    text
}

#[async_trait]
impl RecordExtractor for AddressExtractor {
    #[instrument(level = "debug", skip_all, fields(url = %page.url))]
    async fn extract(&self, page: &Page) -> Option<Record> {
        let fields = self.read_page(page);
        if fields.name.is_empty() {
            debug!("Missing park name");
            return None;
        }

        let coordinates = match fields.coordinates {
            Some(c) => Some(c),
            None => self.resolve(fields.address.as_deref()).await,
        };
        let Some(Coordinates { latitude, longitude }) = coordinates else {
            debug!(name = %fields.name, "No coordinates available");
            return None;
        };

        Some(Record {
            name: fields.name,
            source_code: self.source_code.clone(),
            address: fields.address,
            latitude,
            longitude,
            activities: fields.activities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use url::Url;

    const DEFAULT: Coordinates = Coordinates {
        latitude: 41.0,
        longitude: -86.0,
    };

    struct MockGeocoder {
        result: Option<Coordinates>,
        queries: Mutex<Vec<String>>,
    }

    impl MockGeocoder {
        fn new(result: Option<Coordinates>) -> Arc<Self> {
            Arc::new(Self {
                result,
                queries: Mutex::new(Vec::new()),
            })
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Geocoder for MockGeocoder {
        async fn geocode(&self, address: &str) -> Result<Coordinates, ScrapeError> {
            self.queries.lock().unwrap().push(address.to_string());
            self.result
                .ok_or_else(|| ScrapeError::Geocoding(format!("no results for address: {address}")))
        }
    }

    fn selectors() -> AddressSelectors {
        AddressSelectors {
            name_selector: "h1".into(),
            address_selector: "div#property-add p".into(),
            address_label: "Address:".into(),
            address_region: Some("Indiana".into()),
            activities_selector: Some("ul.activities li".into()),
            latitude_selector: None,
            longitude_selector: None,
        }
    }

    fn extractor(geocoder: Option<Arc<dyn Geocoder>>, default: Option<Coordinates>) -> AddressExtractor {
        AddressExtractor::new("IN", &selectors(), default, geocoder).unwrap()
    }

    fn page(body: &str) -> Page {
        Page::new(
            Url::parse("https://www.example.gov/dnr/state-parks/parks-lakes/dunes/").unwrap(),
            Some("text/html".into()),
            body,
        )
    }

    const DUNES: &str = r#"<html><body>
        <h1>Indiana Dunes State Park</h1>
        <div id="property-add">
            <p>Phone: 219-926-1952</p>
            <p><strong>Address:</strong><br>1600 N 25 E<br>Chesterton, IN 46304</p>
        </div>
        <ul class="activities"><li>Swimming</li><li> </li><li>Hiking</li></ul>
    </body></html>"#;

    #[tokio::test]
    async fn test_geocodes_street_and_city() {
        let geocoder = MockGeocoder::new(Some(Coordinates {
            latitude: 41.6583,
            longitude: -87.0645,
        }));
        let record = extractor(Some(geocoder.clone()), Some(DEFAULT))
            .extract(&page(DUNES))
            .await
            .unwrap();

        assert_eq!(geocoder.queries(), vec!["1600 N 25 E, Chesterton, IN 46304"]);
        assert_eq!(record.name, "Indiana Dunes State Park");
        assert_eq!(record.address.as_deref(), Some("1600 N 25 E, Chesterton, IN 46304"));
        assert_eq!(record.latitude, 41.6583);
        assert_eq!(record.longitude, -87.0645);
        assert_eq!(record.activities.len(), 2);
        assert_eq!(record.source_code, "IN");
    }

    #[tokio::test]
    async fn test_geocoding_failure_uses_default() {
        let geocoder = MockGeocoder::new(None);
        let record = extractor(Some(geocoder.clone()), Some(DEFAULT))
            .extract(&page(DUNES))
            .await
            .unwrap();
        assert_eq!(geocoder.queries().len(), 1);
        assert_eq!(record.coordinates(), DEFAULT);
        assert!(record.address.is_some());
    }

    #[tokio::test]
    async fn test_street_only_appends_region() {
        let body = r#"<h1>Brown County State Park</h1>
            <div id="property-add"><p>Address: 1801 State Road 46 E</p></div>"#;
        let geocoder = MockGeocoder::new(Some(DEFAULT));
        extractor(Some(geocoder.clone()), None)
            .extract(&page(body))
            .await
            .unwrap();
        assert_eq!(geocoder.queries(), vec!["1801 State Road 46 E, Indiana"]);
    }

    #[tokio::test]
    async fn test_missing_address_skips_geocoder() {
        let body = r#"<h1>Clifty Falls State Park</h1><div id="property-add"><p>Open daily</p></div>"#;
        let geocoder = MockGeocoder::new(Some(Coordinates {
            latitude: 1.0,
            longitude: 1.0,
        }));
        let record = extractor(Some(geocoder.clone()), Some(DEFAULT))
            .extract(&page(body))
            .await
            .unwrap();
        assert!(geocoder.queries().is_empty());
        assert_eq!(record.coordinates(), DEFAULT);
        assert!(record.address.is_none());
    }

    #[tokio::test]
    async fn test_no_coordinates_anywhere_returns_none() {
        assert!(extractor(None, None).extract(&page(DUNES)).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_name_returns_none() {
        let body = DUNES.replace("Indiana Dunes State Park", " ");
        assert!(extractor(None, Some(DEFAULT)).extract(&page(&body)).await.is_none());
    }

    #[tokio::test]
    async fn test_page_coordinates_take_precedence() {
        let mut selectors = selectors();
        selectors.latitude_selector = Some(".lat".into());
        selectors.longitude_selector = Some(".lon".into());
        let geocoder = MockGeocoder::new(Some(DEFAULT));
        let extractor = AddressExtractor::new("IN", &selectors, None, Some(geocoder.clone())).unwrap();
        let body = format!("{DUNES}<span class=\"lat\">41.5</span><span class=\"lon\">-87.1</span>");

        let record = extractor.extract(&page(&body)).await.unwrap();
        assert!(geocoder.queries().is_empty());
        assert_eq!(record.latitude, 41.5);
        assert_eq!(record.longitude, -87.1);
    }
}
