use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::fetch::HttpClient;
use crate::models::{RawRecord, Row, Source};
use crate::remap::{self, FieldMap, KeySpec};
use crate::scrapers::normalize::{capitalize, datetime_value, slug};
use crate::scrapers::traits::SourceAdapter;
use crate::scrapers::types::SearchParams;

pub const KAMERNET_SEARCH_URL: &str = "https://kamernet.nl/services/api/listing/findlistings";
pub const KAMERNET_PAGE_SIZE: u64 = 18;
pub const KAMERNET_PAGE_DELAY: Duration = Duration::from_secs(5);

const LEAF_KEYS: &[&str] = &[
    "listingId",
    "furnishingId",
    "availabilityStartDate",
    "availabilityEndDate",
    "street",
    "city",
    "surfaceArea",
    "listingType",
    "totalRentalPrice",
    "utilitiesIncluded",
];

/// Keys added by this adapter after extraction
const DERIVED_KEYS: &[&str] = &["url_append", "domain"];

fn furnishing_name(id: i64) -> Option<&'static str> {
    match id {
        1 => Some("uncarpeted"),
        2 => Some("unfurnished"),
        3 => Some(""),
        4 => Some("furnished"),
        _ => None,
    }
}

fn listing_type_name(id: i64) -> Option<&'static str> {
    match id {
        1 => Some("room"),
        2 => Some("apartment"),
        3 => Some(""),
        4 => Some("studio"),
        _ => None,
    }
}

/// Kamernet listings from its JSON search endpoint
pub struct KamernetSource {
    http: HttpClient,
    search_url: String,
    search: SearchParams,
    page_delay: Duration,
    spec: KeySpec,
    field_map: FieldMap,
}

impl KamernetSource {
    pub fn new(http: HttpClient, search: SearchParams, mapping_path: &Path) -> Result<Self> {
        let field_map = FieldMap::load(Source::Kamernet.name(), mapping_path)?;
        let spec = KeySpec::new(LEAF_KEYS, &[]);
        field_map
            .validate(
                spec.output_keys()
                    .into_iter()
                    .chain(DERIVED_KEYS.iter().map(|k| k.to_string())),
            )
            .context("Kamernet column mapping is incomplete")?;

        info!("Kamernet source ready");
        Ok(Self {
            http,
            search_url: KAMERNET_SEARCH_URL.to_string(),
            search,
            page_delay: KAMERNET_PAGE_DELAY,
            spec,
            field_map,
        })
    }

    pub fn with_search_url(mut self, url: &str) -> Self {
        self.search_url = url.to_string();
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Search body shared by every page request
    pub fn payload(&self, page: u64) -> Value {
        let city = capitalize(&self.search.city);
        json!({
            "location": {"name": city, "cityName": city},
            "radiusId": 4,
            "listingTypeIds": [],
            "maxRentalPriceId": 33,
            "surfaceMinimumId": 2,
            "listingSortOptionId": 1,
            "pageNo": page.to_string(),
            "suitableForGenderIds": [],
            "furnishings": [],
            "availabilityPeriods": [],
            "availableFromDate": null,
            "isBathroomPrivate": null,
            "isToiletPrivate": null,
            "isKitchenPrivate": null,
            "hasInternet": null,
            "suitableForNumberOfPersonsId": null,
            "candidateAge": null,
            "suitableForStatusIds": [],
            "isSmokingInsideAllowed": null,
            "isPetsInsideAllowed": null,
            "roommateMaxNumberId": null,
            "roommateGenderIds": [],
            "ownerTypeIds": [],
            "variant": null,
            "searchview": 1,
            "rowsPerPage": KAMERNET_PAGE_SIZE,
            "OpResponse": {"Code": 1000, "Message": "Operation successful.", "HttpStatusCode": 200},
            "LogEntryId": null
        })
    }

    async fn total_results(&self) -> Result<u64> {
        let first = self
            .http
            .post_json(&self.search_url, &self.payload(1))
            .await?;
        first["total"]
            .as_u64()
            .context("Kamernet response lacks a total")
    }

    /// Decode code tables and dates, rebuild the listing path, then rename
    pub fn normalize(&self, record: &Value) -> Result<Option<Row>> {
        let id = record.get("listingId").cloned().unwrap_or(Value::Null);

        let mut row = match remap::extract(record, &self.spec) {
            Ok(row) => row,
            Err(ScrapeError::KeyNotFound { key }) => {
                warn!("Skipping Kamernet listing {}: no {}", id, key);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let Some(furnishing) = row["furnishingId"].as_i64().and_then(furnishing_name) else {
            warn!("Skipping Kamernet listing {}: unknown furnishing {}", id, row["furnishingId"]);
            return Ok(None);
        };
        let Some(listing_type) = row["listingType"].as_i64().and_then(listing_type_name) else {
            warn!("Skipping Kamernet listing {}: unknown listing type {}", id, row["listingType"]);
            return Ok(None);
        };
        let (Some(street), Some(city), Some(listing_id)) = (
            row["street"].as_str().map(slug),
            row["city"].as_str().map(slug),
            row["listingId"].as_f64(),
        ) else {
            debug!("Skipping Kamernet listing {}: incomplete address", id);
            return Ok(None);
        };

        for key in ["availabilityStartDate", "availabilityEndDate"] {
            let parsed = row[key].as_str().and_then(date_prefix);
            row.insert(key.to_string(), parsed.map_or(Value::Null, datetime_value));
        }
        if let Some(included) = row["utilitiesIncluded"].as_bool() {
            row.insert("utilitiesIncluded".into(), json!(u8::from(included)));
        }

        let url_append = format!(
            "/en/for-rent/{listing_type}-{city}/{street}/{listing_type}-{listing_id:.0}"
        );
        row.insert("furnishingId".into(), json!(furnishing));
        row.insert("listingType".into(), json!(listing_type));
        row.insert("street".into(), json!(street));
        row.insert("city".into(), json!(city));
        row.insert("url_append".into(), json!(url_append));
        row.insert("domain".into(), json!(Source::Kamernet.domain()));

        Ok(Some(self.field_map.rename(row)?))
    }
}

/// `2024-07-01T00:00:00+02:00` -> midnight of that day
fn date_prefix(raw: &str) -> Option<chrono::NaiveDateTime> {
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

#[async_trait]
impl SourceAdapter for KamernetSource {
    fn source(&self) -> Source {
        Source::Kamernet
    }

    async fn discover_all(&mut self) -> Result<Vec<RawRecord>> {
        let total = self.total_results().await?;
        let pages = total.div_ceil(KAMERNET_PAGE_SIZE);
        info!("Kamernet reports {} listings over {} pages", total, pages);

        let mut records = Vec::new();
        for page in 1..=pages {
            let body = self
                .http
                .post_json(&self.search_url, &self.payload(page))
                .await?;
            let listings = body["listings"]
                .as_array()
                .with_context(|| format!("Kamernet page {page} has no listings array"))?;
            records.extend(listings.iter().cloned().map(RawRecord::Json));

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        Ok(records)
    }

    async fn parse_one(&mut self, raw: &RawRecord) -> Result<Option<Row>> {
        match raw {
            RawRecord::Json(record) => self.normalize(record),
            RawRecord::Link(link) => {
                warn!("Kamernet cannot parse link record {}", link);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CannedResponse, MockServer};
    use std::path::PathBuf;

    fn source() -> KamernetSource {
        let mapping =
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("db_mappings/kamernet_mapping.json");
        KamernetSource::new(HttpClient::new().unwrap(), SearchParams::default(), &mapping)
            .unwrap()
            .with_page_delay(Duration::ZERO)
    }

    fn listing(id: u64) -> Value {
        json!({
            "listingId": id,
            "furnishingId": 4,
            "availabilityStartDate": "2024-07-01T00:00:00+02:00",
            "availabilityEndDate": null,
            "street": "Nieuwe Rijn",
            "city": "Leiden",
            "surfaceArea": 18,
            "listingType": 1,
            "totalRentalPrice": 650,
            "utilitiesIncluded": true,
            "isNewAdvert": true
        })
    }

    #[test]
    fn listing_is_decoded_and_renamed() {
        let row = source().normalize(&listing(2217341)).unwrap().unwrap();

        assert_eq!(
            row["url_append"],
            json!("/en/for-rent/room-leiden/nieuwe-rijn/room-2217341")
        );
        assert_eq!(row["domain"], json!("https://kamernet.nl"));
        assert_eq!(row["domain_id"], json!(2217341));
        assert_eq!(row["additional_info"], json!("furnished"));
        assert_eq!(row["dwelling_type"], json!("room"));
        assert_eq!(row["street"], json!("nieuwe-rijn"));
        assert_eq!(row["locale"], json!("leiden"));
        assert_eq!(row["available_date"], json!("2024-07-01 00:00:00"));
        assert_eq!(row["available_end_date"], Value::Null);
        assert_eq!(row["additional_costs"], json!(1));
        assert_eq!(row["rent_total"], json!(650));
    }

    #[test]
    fn unknown_codes_and_missing_keys_skip_the_listing() {
        let mut odd = listing(1);
        odd["furnishingId"] = json!(9);
        assert!(source().normalize(&odd).unwrap().is_none());

        let mut partial = listing(2);
        partial.as_object_mut().unwrap().remove("street");
        assert!(source().normalize(&partial).unwrap().is_none());
    }

    #[test]
    fn payload_interpolates_page_and_city() {
        let payload = source().payload(3);
        assert_eq!(payload["pageNo"], json!("3"));
        assert_eq!(payload["location"]["cityName"], json!("Leiden"));
        assert_eq!(payload["rowsPerPage"], json!(18));
    }

    #[tokio::test]
    async fn discovery_posts_one_request_per_page() {
        let page_one: Vec<Value> = (0..18).map(listing).collect();
        let server = MockServer::start(vec![
            CannedResponse::json(json!({"total": 20, "listings": page_one.clone()})),
            CannedResponse::json(json!({"total": 20, "listings": page_one})),
            CannedResponse::json(json!({"total": 20, "listings": [listing(18), listing(19)]})),
        ])
        .await;
        let mut source = source().with_search_url(&server.url("/services/api/listing/findlistings"));

        let records = source.discover_all().await.unwrap();

        assert_eq!(records.len(), 20);
        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].contains(r#""pageNo":"1""#));
        assert!(requests[2].contains(r#""pageNo":"2""#));
    }

    #[tokio::test]
    async fn discovery_waits_between_pages() {
        let delay = Duration::from_millis(150);
        let server = MockServer::start(vec![
            CannedResponse::json(json!({"total": 20, "listings": []})),
            CannedResponse::json(json!({"total": 20, "listings": [listing(0)]})),
            CannedResponse::json(json!({"total": 20, "listings": [listing(1)]})),
        ])
        .await;
        let mut source = source()
            .with_search_url(&server.url("/services/api/listing/findlistings"))
            .with_page_delay(delay);

        let started = tokio::time::Instant::now();
        let records = source.discover_all().await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(started.elapsed() >= delay * 2);
    }
}
