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
use crate::scrapers::dom::{definition_pairs, first_text, labelled, text};
use crate::scrapers::normalize::{datetime_value, parse_int, parse_price};
use crate::scrapers::traits::SourceAdapter;
use crate::scrapers::types::{Pacing, SearchParams};

pub const SEARCH_MARKER: &str = "div[data-test-id='search-result-item']";
pub const DETAIL_MARKER: &str = "span.object-header__title";
pub const FUNDA_PAGE_SIZE: u64 = 15;

const OWNERSHIP_LABELS: &[&str] = &["Transfer of ownership", "Overdracht"];
const RENTAL_AGREEMENT_LABELS: &[&str] = &["Rental agreement", "Huurovereenkomst"];
const AVAILABLE_STATUSES: &[&str] = &["Available", "Beschikbaar"];
const PRICE_LABELS: &[&str] = &["Rental price", "Huurprijs"];
const AREA_LABELS: &[&str] = &["Area", "Oppervlakte"];

lazy_static! {
    static ref RESULT_COUNT: Selector =
        Selector::parse("div.overflow-hidden.text-ellipsis.whitespace-nowrap.font-semibold")
            .unwrap();
    static ref RESULT_ITEM: Selector = Selector::parse(SEARCH_MARKER).unwrap();
    static ref RESULT_LINK: Selector = Selector::parse("a.text-blue-2.cursor-pointer").unwrap();
    static ref TITLE: Selector = Selector::parse(DETAIL_MARKER).unwrap();
    static ref SUBTITLE: Selector = Selector::parse("span.object-header__subtitle").unwrap();
    static ref NEIGHBOURHOOD: Selector =
        Selector::parse("span.fd-text--ellipsis.fd-text--nowrap.fd-overflow-hidden").unwrap();
    static ref TABLE_HEADER: Selector = Selector::parse("h3.object-kenmerken-list-header").unwrap();
    static ref TABLE: Selector = Selector::parse("dl.object-kenmerken-list").unwrap();
    static ref HIGHLIGHTED_AREA: Selector =
        Selector::parse("span.kenmerken-highlighted__value").unwrap();
}

/// Funda rentals scraped through a real browser
pub struct FundaSource<L: SessionLauncher = ChromeLauncher> {
    driver: Driver<L>,
    search: SearchParams,
    page_pacing: Pacing,
    detail_pacing: Pacing,
}

impl<L: SessionLauncher> FundaSource<L> {
    pub fn new(driver: Driver<L>, search: SearchParams) -> Self {
        info!("Funda source ready");
        Self {
            driver,
            search,
            page_pacing: Pacing::between(3, 10),
            detail_pacing: Pacing::between(2, 5),
        }
    }

    pub fn with_pacing(mut self, page_pacing: Pacing, detail_pacing: Pacing) -> Self {
        self.page_pacing = page_pacing;
        self.detail_pacing = detail_pacing;
        self
    }

    pub fn search_url(&self, page: u64) -> String {
        format!(
            "{}/en/zoeken/huur?selected_area=%5B%22{}%22%5D&search_result={}",
            Source::Funda.domain(),
            self.search.city,
            page
        )
    }
}

pub fn total_results(html: &str) -> Option<u64> {
    let document = Html::parse_document(html);
    first_text(&document, &RESULT_COUNT)
        .and_then(|t| parse_int(&t))
        .and_then(|n| u64::try_from(n).ok())
}

/// First title link of every result card
pub fn listing_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT_ITEM)
        .filter_map(|item| item.select(&RESULT_LINK).next())
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// Absolute English-site URL for a result link
pub fn detail_url(link: &str) -> String {
    let domain = Source::Funda.domain();
    let absolute = if link.starts_with("http") {
        link.to_string()
    } else {
        format!("{domain}{link}")
    };
    if absolute.starts_with(&format!("{domain}/en/")) {
        absolute
    } else {
        absolute.replacen(&format!("{domain}/"), &format!("{domain}/en/"), 1)
    }
}

/// "Breestraat 14 A" -> street, house number, addition
fn split_title(title: &str) -> Option<(String, i64, Option<String>)> {
    let tokens: Vec<&str> = title.split_whitespace().collect();
    let number_at = tokens
        .iter()
        .position(|t| t.starts_with(|c: char| c.is_ascii_digit()))?;
    if number_at == 0 {
        return None;
    }
    let house_number = parse_int(tokens[number_at])?;
    let addition = tokens[number_at + 1..].join(" ");
    Some((
        tokens[..number_at].join(" "),
        house_number,
        (!addition.is_empty()).then_some(addition),
    ))
}

fn leading_int(text: &str) -> Option<i64> {
    text.split_whitespace().next().and_then(parse_int)
}

/// Parse a rendered detail page.
///
/// Listings come either with titled tables (ownership, features, ...) or a
/// single untitled feature table; both carry the rental price.
pub fn parse_detail(link: &str, city: &str, html: &str, now: NaiveDateTime) -> Option<Row> {
    let (_, url_append) = link.split_once(&format!("/{city}"))?;
    let domain_id = url_append
        .split(['-', '/'])
        .find(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))?;

    let document = Html::parse_document(html);
    let mut row = Row::new();
    row.insert("url_append".into(), json!(url_append));
    row.insert("domain".into(), json!(Source::Funda.domain()));
    row.insert("domain_id".into(), json!(domain_id));

    let (street, house_number, addition) = split_title(&first_text(&document, &TITLE)?)?;
    row.insert("street".into(), json!(street));
    row.insert("house_number".into(), json!(house_number));
    row.insert("house_addition".into(), json!(addition));

    // "2312 AB Leiden"
    let subtitle = first_text(&document, &SUBTITLE)?;
    let postal_code: String = subtitle.split_whitespace().take(2).collect();
    row.insert("postal_code".into(), json!(postal_code));

    if let Some(neighbourhood) = document.select(&NEIGHBOURHOOD).last().map(text) {
        row.insert("locale".into(), json!(neighbourhood.replace(' ', "")));
    }

    let headers: Vec<String> = document.select(&TABLE_HEADER).map(text).collect();
    let tables: Vec<_> = document.select(&TABLE).collect();

    let (rent_buy, available, area, price) = if headers.is_empty() {
        let features = definition_pairs(*tables.first()?);
        let area = labelled(&features, AREA_LABELS).and_then(leading_int)?;
        let price = labelled(&features, PRICE_LABELS).and_then(parse_price)?;
        ("Rent", Some(now), area, price)
    } else {
        let titled: Vec<(&str, _)> = headers.iter().map(String::as_str).zip(tables).collect();
        let ownership = OWNERSHIP_LABELS
            .iter()
            .find_map(|label| titled.iter().find(|(h, _)| h == label))
            .map(|(_, table)| definition_pairs(*table))?;

        let rent_buy = if labelled(&ownership, RENTAL_AGREEMENT_LABELS).is_some() {
            "Rent"
        } else {
            "Buy"
        };
        let available = labelled(&ownership, &["Status"])
            .filter(|status| AVAILABLE_STATUSES.contains(status))
            .map(|_| now);
        let area = first_text(&document, &HIGHLIGHTED_AREA)
            .and_then(|t| leading_int(&t))
            .unwrap_or(0);
        let price = labelled(&ownership, PRICE_LABELS).and_then(parse_price)?;
        (rent_buy, available, area, price)
    };

    row.insert("rent_buy".into(), json!(rent_buy));
    row.insert(
        "available_date".into(),
        available.map_or(serde_json::Value::Null, datetime_value),
    );
    row.insert("area_dwelling".into(), json!(area));
    row.insert("rent_total".into(), json!(price));

    Some(row)
}

#[async_trait]
impl<L: SessionLauncher> SourceAdapter for FundaSource<L> {
    fn source(&self) -> Source {
        Source::Funda
    }

    async fn discover_all(&mut self) -> Result<Vec<RawRecord>> {
        let first = self.driver.render(&self.search_url(1), SEARCH_MARKER).await?;
        let total = total_results(&first).context("Funda search page has no result count")?;
        let pages = total.div_ceil(FUNDA_PAGE_SIZE);
        info!("Funda reports {} listings over {} pages", total, pages);

        let mut links = listing_links(&first);
        for page in 2..=pages {
            self.page_pacing.pause().await;
            let html = self.driver.render(&self.search_url(page), SEARCH_MARKER).await?;
            let page_links = listing_links(&html);
            debug!("Funda page {}: {} links", page, page_links.len());
            links.extend(page_links);
        }

        let unique: BTreeSet<String> = links.into_iter().collect();
        info!("Funda discovered {} unique listings", unique.len());
        Ok(unique.into_iter().map(RawRecord::Link).collect())
    }

    async fn parse_one(&mut self, raw: &RawRecord) -> Result<Option<Row>> {
        let RawRecord::Link(link) = raw else {
            warn!("Funda cannot parse JSON records");
            return Ok(None);
        };

        let url = detail_url(link);
        info!("Parsing {}", url);
        let html = self.driver.render(&url, DETAIL_MARKER).await?;
        let row = parse_detail(link, &self.search.city, &html, Local::now().naive_local());
        if row.is_none() {
            warn!("Skipping {}: required section missing", url);
        }

        self.detail_pacing.pause().await;
        Ok(row)
    }
}
