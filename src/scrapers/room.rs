use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::fetch::HttpClient;
use crate::models::{RawRecord, Row, Source};
use crate::remap::{self, FieldMap, KeySpec};
use crate::scrapers::traits::SourceAdapter;

/// Hexia API behind room.nl; the search parameters are appended to it
pub const ROOM_SEARCH_URL: &str = "https://roomapi.hexia.io/api/v1/actueel-aanbod?";
pub const ROOM_PAGE_SIZE: u64 = 100;

const LEAF_KEYS: &[&str] = &[
    "ID",
    "postalcode",
    "street",
    "houseNumber",
    "houseNumberAddition",
    "gemeenteGeoLocatieNaam",
    "rentBuy",
    "availableFromDate",
    "areaDwelling",
    "totalRent",
    "netRent",
    "calculationRent",
    "serviceCosts",
    "heatingCosts",
    "additionalCosts",
    "numberOfReactions",
    "publicationDate",
    "closingDate",
    "isWoningruil",
    "urlKey",
    "infoveld",
    "specifiekeVoorzieningen",
];

const PATH_KEYS: &[&[&str]] = &[
    &["quarter", "name"],
    &["corporation", "name"],
    &["dwellingType", "localizedName"],
    &["sleepingRoom", "amountOfRooms"],
    &["sleepingRoom", "naam"],
    &["kitchen", "localizedName"],
    &["floor", "verdieping"],
    &["woningsoort", "localizedNaam"],
];

/// Records without these are skipped; `urlKey` becomes the primary key
const REQUIRED_KEYS: &[&str] = &["urlKey", "street", "houseNumber", "gemeenteGeoLocatieNaam"];

const AMENITIES_KEY: &str = "specifiekeVoorzieningen";

/// Room.nl listings pulled straight from the Hexia JSON API
pub struct RoomSource {
    http: HttpClient,
    search_url: String,
    page_size: u64,
    spec: KeySpec,
    field_map: FieldMap,
}

impl RoomSource {
    /// Loads the column mapping and checks it covers every extracted key
    pub fn new(http: HttpClient, mapping_path: &Path) -> Result<Self> {
        let field_map = FieldMap::load(Source::Room.name(), mapping_path)?;
        let spec = KeySpec::new(LEAF_KEYS, PATH_KEYS);
        field_map
            .validate(
                spec.output_keys()
                    .into_iter()
                    .chain(["postcode".to_string(), "domain".to_string()]),
            )
            .context("Room column mapping is incomplete")?;

        info!("Room source ready");
        Ok(Self {
            http,
            search_url: ROOM_SEARCH_URL.to_string(),
            page_size: ROOM_PAGE_SIZE,
            spec,
            field_map,
        })
    }

    pub fn with_search_url(mut self, url: &str) -> Self {
        self.search_url = url.to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn total_results(&self) -> Result<u64> {
        let metadata = self.http.get_json(&self.search_url).await?;
        metadata["_metadata"]["total_search_count"]
            .as_u64()
            .context("Room metadata lacks _metadata.total_search_count")
    }

    fn page_url(&self, page: u64) -> String {
        format!(
            "{}limit={}&locale=en_GB&page={}&sort=-publicationDate",
            self.search_url, self.page_size, page
        )
    }

    /// Flatten and rename one API record; `Ok(None)` when it cannot be used
    pub fn normalize(&self, record: &Value) -> Result<Option<Row>> {
        let id = record.get("ID").cloned().unwrap_or(Value::Null);

        if let Some(missing) = REQUIRED_KEYS
            .iter()
            .find(|key| record.get(**key).map_or(true, Value::is_null))
        {
            debug!("Skipping Room record {}: no {}", id, missing);
            return Ok(None);
        }

        let mut spec = self.spec.clone();
        if record.get("postalcode").is_none() && spec.contains_leaf("postalcode") {
            spec.remove_leaf("postalcode");
            if record.get("postcode").is_some() {
                spec.push_leaf("postcode");
            }
        }
        let spec = spec.resolvable_in(record);

        let mut row = match remap::extract(record, &spec) {
            Ok(row) => row,
            Err(ScrapeError::KeyNotFound { key }) => {
                warn!("Skipping Room record {}: key {} vanished", id, key);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        remap::join_multi_valued(&mut row, AMENITIES_KEY, "localizedName", ", ");
        row.insert("domain".into(), Value::from(Source::Room.domain()));

        Ok(Some(self.field_map.rename(row)?))
    }
}

#[async_trait]
impl SourceAdapter for RoomSource {
    fn source(&self) -> Source {
        Source::Room
    }

    async fn discover_all(&mut self) -> Result<Vec<RawRecord>> {
        let total = self.total_results().await?;
        let pages = total.div_ceil(self.page_size);
        info!("Room reports {} listings over {} pages", total, pages);

        let mut records = Vec::new();
        for page in 0..pages {
            let body = self.http.get_json(&self.page_url(page)).await?;
            let data = body["data"]
                .as_array()
                .with_context(|| format!("Room page {page} has no data array"))?;
            records.extend(data.iter().cloned().map(RawRecord::Json));
        }

        Ok(records)
    }

    async fn parse_one(&mut self, raw: &RawRecord) -> Result<Option<Row>> {
        match raw {
            RawRecord::Json(record) => self.normalize(record),
            RawRecord::Link(link) => {
                warn!("Room cannot parse link record {}", link);
                Ok(None)
            }
        }
    }
}
