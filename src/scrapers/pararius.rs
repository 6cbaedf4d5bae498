use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::fetch::browser::SessionLauncher;
use crate::fetch::{ChromeLauncher, Driver};
use crate::models::{RawRecord, Row, Source};
use crate::scrapers::dom::{first_text, first_text_in, text};
use crate::scrapers::normalize::{
    capitalize, datetime_value, dmy_date, parse_int, parse_price, publish_date,
};
use crate::scrapers::traits::SourceAdapter;
use crate::scrapers::types::{Pacing, SearchParams};

pub const SEARCH_MARKER: &str = ".search-list";
pub const DETAIL_MARKER: &str = ".listing-detail-summary__title";

const PRICE_IDX: usize = 0;
const POSTED_IDX: usize = 1;
const AVAILABLE_IDX: usize = 3;
const FURNISHED_IDX: usize = 4;

lazy_static! {
    static ref RESULT_COUNT: Selector = Selector::parse("span.search-list-header__count").unwrap();
    static ref LISTING_LINK: Selector = Selector::parse(
        "li.search-list__item--listing h2.listing-search-item__title a"
    )
    .unwrap();
    static ref LOCATION: Selector = Selector::parse("div.listing-detail-summary__location").unwrap();
    static ref FEATURES: Selector = Selector::parse("dl.listing-features__list").unwrap();
    static ref MAIN_DESCRIPTION: Selector =
        Selector::parse("span.listing-features__main-description").unwrap();
    static ref PRICE_NOTE: Selector = Selector::parse(
        "dd.listing-features__description--for_rent_price ul.listing-features__sub-description li"
    )
    .unwrap();
    static ref SERVICE_COSTS: Selector =
        Selector::parse("dd.listing-features__description--service_costs span").unwrap();
    static ref SURFACE_AREA: Selector =
        Selector::parse("dd.listing-features__description--surface_area span").unwrap();
    static ref DWELLING_TYPE: Selector =
        Selector::parse("dd.listing-features__description--dwelling_type span").unwrap();
    static ref PROPERTY_TYPE: Selector =
        Selector::parse("dd.listing-features__description--property_types span").unwrap();
}

/// Pararius rentals scraped through a real browser
pub struct ParariusSource<L: SessionLauncher = ChromeLauncher> {
    driver: Driver<L>,
    search: SearchParams,
    page_pacing: Pacing,
    detail_pacing: Pacing,
}

impl<L: SessionLauncher> ParariusSource<L> {
    pub fn new(driver: Driver<L>, search: SearchParams) -> Self {
        info!("Pararius source ready");
        Self {
            driver,
            search,
            page_pacing: Pacing::between(2, 10),
            detail_pacing: Pacing::between(2, 10),
        }
    }

    pub fn with_pacing(mut self, page_pacing: Pacing, detail_pacing: Pacing) -> Self {
        self.page_pacing = page_pacing;
        self.detail_pacing = detail_pacing;
        self
    }

    pub fn search_url(&self, page: u64) -> String {
        format!(
            "{}/apartments/{}/page-{}",
            Source::Pararius.domain(),
            self.search.city,
            page
        )
    }
}

/// Total listing count printed in the search header
pub fn total_results(html: &str) -> Option<u64> {
    let document = Html::parse_document(html);
    first_text(&document, &RESULT_COUNT)
        .and_then(|t| parse_int(&t))
        .and_then(|n| u64::try_from(n).ok())
}

/// Detail links on one search results page
pub fn listing_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&LISTING_LINK)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect()
}

fn is_project(link: &str) -> bool {
    link.split('/').nth(2) == Some("project")
}

fn available_date(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if text.contains("From") || text.starts_with("Vanaf") {
        dmy_date(text)
    } else if ["Immediately", "In consultation", "Per direct", "In overleg"].contains(&text) {
        Some(now)
    } else {
        None
    }
}

/// Parse a rendered detail page.
///
/// The summary location, the feature list, the price line and the surface
/// area are required; every other section may be missing.
pub fn parse_detail(link: &str, html: &str, now: NaiveDateTime) -> Option<Row> {
    let portions: Vec<&str> = link.split('/').collect();
    if portions.len() < 5 || is_project(link) {
        return None;
    }
    let document = Html::parse_document(html);
    let mut row = Row::new();

    row.insert("url_append".into(), json!(link));
    row.insert("domain".into(), json!(Source::Pararius.domain()));
    row.insert("domain_id".into(), json!(portions[3]));
    row.insert("street".into(), json!(capitalize(portions[portions.len() - 1])));
    row.insert("locale".into(), json!(capitalize(portions[2])));
    row.insert("rent_buy".into(), json!("Rent"));

    // "2311 AB Leiden (Pancras-West)"
    let location = first_text(&document, &LOCATION)?;
    let (place, district) = match location.split_once(" (") {
        Some((place, rest)) => (place, Some(rest.trim_end_matches(')'))),
        None => (location.as_str(), None),
    };
    let postal_code: String = place.split_whitespace().take(2).collect();
    row.insert("postal_code".into(), json!(postal_code));
    if let Some(district) = district {
        row.insert("district".into(), json!(district));
    }

    let features = document.select(&FEATURES).next()?;
    let items: Vec<String> = features.select(&MAIN_DESCRIPTION).map(text).collect();

    let rent_total = items.get(PRICE_IDX).and_then(|t| parse_price(t))?;
    row.insert("rent_total".into(), json!(rent_total));

    if let Some(posted) = items.get(POSTED_IDX).and_then(|t| publish_date(t, now)) {
        row.insert("publish_date".into(), datetime_value(posted));
    }
    if let Some(available) = items.get(AVAILABLE_IDX).and_then(|t| available_date(t, now)) {
        row.insert("available_date".into(), datetime_value(available));
    }

    let mut info: Vec<String> = items.get(FURNISHED_IDX).cloned().into_iter().collect();
    if let Some(note) = first_text_in(features, &PRICE_NOTE).filter(|n| n.contains("Includes")) {
        info.push(note);
    }
    if !info.is_empty() {
        row.insert("additional_info".into(), json!(info.join(";")));
    }

    if let Some(costs) = first_text_in(features, &SERVICE_COSTS).and_then(|t| parse_price(&t)) {
        row.insert("service_costs".into(), json!(costs));
    }

    let area = first_text(&document, &SURFACE_AREA)?;
    let area = area.split_whitespace().next().and_then(parse_int)?;
    row.insert("area_dwelling".into(), json!(area));

    if let Some(dwelling) = first_text(&document, &DWELLING_TYPE) {
        row.insert("dwelling_type".into(), json!(dwelling));
    }
    if let Some(building) = first_text(&document, &PROPERTY_TYPE) {
        row.insert("building_type".into(), json!(building));
    }

    Some(row)
}

#[async_trait]
impl<L: SessionLauncher> SourceAdapter for ParariusSource<L> {
    fn source(&self) -> Source {
        Source::Pararius
    }

    async fn discover_all(&mut self) -> Result<Vec<RawRecord>> {
        let first = self.driver.render(&self.search_url(1), SEARCH_MARKER).await?;
        let total = total_results(&first).context("Pararius search page has no result count")?;
        info!("Pararius reports {} listings", total);

        let mut links = listing_links(&first);
        let mut collected = links.len() as u64;
        let mut page = 1;

        while collected < total {
            self.page_pacing.pause().await;
            page += 1;
            let html = self.driver.render(&self.search_url(page), SEARCH_MARKER).await?;
            let page_links = listing_links(&html);
            if page_links.is_empty() {
                warn!("Pararius page {} has no listings, stopping at {}/{}", page, collected, total);
                break;
            }
            debug!("Pararius page {}: {} links", page, page_links.len());
            collected += page_links.len() as u64;
            links.extend(page_links);
        }

        let unique: BTreeSet<String> = links.into_iter().collect();
        info!("Pararius discovered {} unique listings", unique.len());
        Ok(unique.into_iter().map(RawRecord::Link).collect())
    }

    async fn parse_one(&mut self, raw: &RawRecord) -> Result<Option<Row>> {
        let RawRecord::Link(link) = raw else {
            warn!("Pararius cannot parse JSON records");
            return Ok(None);
        };
        if is_project(link) {
            debug!("Skipping Pararius project {}", link);
            return Ok(None);
        }

        let url = format!("{}{}", Source::Pararius.domain(), link);
        info!("Parsing {}", url);
        let html = self.driver.render(&url, DETAIL_MARKER).await?;
        let row = parse_detail(link, &html, Local::now().naive_local());
        if row.is_none() {
            warn!("Skipping {}: required section missing", url);
        }

        self.detail_pacing.pause().await;
        Ok(row)
    }
}
