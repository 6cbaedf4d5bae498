//! Text clean-up shared by the source adapters.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::models::DATETIME_FORMAT;

/// Rent value stored when a listing only quotes "price on request"
pub const PRICE_ON_REQUEST: i64 = -1;

const WEEKS_PER_MONTH: f64 = 4.33;

const ON_REQUEST_PHRASES: &[&str] = &["price on request", "op aanvraag"];

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"\d[\d.,]*").unwrap();
    static ref CENTS: Regex = Regex::new(r"[.,]\d{1,2}$").unwrap();
    static ref RELATIVE: Regex = Regex::new(r"(?i)(\d+)\s*(week|month)").unwrap();
    static ref DMY: Regex = Regex::new(r"\d{2}-\d{2}-\d{4}").unwrap();
}

pub fn digits_only(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// Every digit in `text` read as one integer
pub fn parse_int(text: &str) -> Option<i64> {
    digits_only(text).parse().ok()
}

/// Read an amount like `€ 1.250,00 per month` as whole currency units.
///
/// Grouping separators are dropped, a trailing one- or two-digit decimal part
/// is discarded, and "on request" phrasing maps to [`PRICE_ON_REQUEST`].
pub fn parse_price(text: &str) -> Option<i64> {
    let lowered = text.to_lowercase();
    if ON_REQUEST_PHRASES.iter().any(|p| lowered.contains(p)) {
        return Some(PRICE_ON_REQUEST);
    }
    let number = NUMBER.find(text)?.as_str();
    let whole = CENTS.replace(number, "");
    parse_int(&whole)
}

/// Turn "3 weeks ago" / "2 months" / "14-02-2024" into a timestamp
pub fn publish_date(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if let Some(caps) = RELATIVE.captures(text) {
        let count: i64 = caps[1].parse().ok()?;
        let unit = caps[2].to_lowercase();
        let offset = if unit == "week" {
            Duration::try_weeks(count)?
        } else {
            let seconds = count as f64 * WEEKS_PER_MONTH * 7.0 * 86_400.0;
            Duration::try_seconds(seconds.round() as i64)?
        };
        return now.checked_sub_signed(offset);
    }
    dmy_date(text)
}

/// First `dd-mm-yyyy` date found in `text`, at midnight
pub fn dmy_date(text: &str) -> Option<NaiveDateTime> {
    let found = DMY.find(text)?;
    NaiveDate::parse_from_str(found.as_str(), "%d-%m-%Y")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

pub fn datetime_value(dt: NaiveDateTime) -> Value {
    Value::String(dt.format(DATETIME_FORMAT).to_string())
}

pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Lowercase with spaces turned into hyphens, as used in listing URLs
pub fn slug(text: &str) -> String {
    text.to_lowercase().replace(' ', "-")
}

/// Collapse runs of whitespace and trim
pub fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn prices_lose_punctuation_and_cents() {
        assert_eq!(parse_price("€1.250,00"), Some(1250));
        assert_eq!(parse_price("€ 1,250 per month"), Some(1250));
        assert_eq!(parse_price("€ 950 /month incl."), Some(950));
        assert_eq!(parse_price("€ 2.100 per maand"), Some(2100));
        assert_eq!(parse_price("no digits here"), None);
    }

    #[test]
    fn on_request_maps_to_sentinel() {
        assert_eq!(parse_price("Price on request"), Some(PRICE_ON_REQUEST));
        assert_eq!(parse_price("Rental price on request"), Some(-1));
        assert_eq!(parse_price("Huurprijs op aanvraag"), Some(-1));
    }

    #[test]
    fn relative_weeks_and_months() {
        assert_eq!(
            publish_date("3 weeks", noon()),
            Some(noon() - Duration::weeks(3))
        );
        let two_months = publish_date("2 months ago", noon()).unwrap();
        let days = (noon() - two_months).num_days();
        assert_eq!(days, 60); // 2 * 4.33 weeks = 60.62 days
    }

    #[test]
    fn absurd_offsets_yield_nothing() {
        assert_eq!(publish_date("100000000 weeks", noon()), None);
        assert_eq!(publish_date("9999999999999 months ago", noon()), None);
        assert_eq!(publish_date("99999999999999999999 weeks", noon()), None);
    }

    #[test]
    fn absolute_dates_fall_back_to_dmy() {
        let parsed = publish_date("14-02-2024", noon()).unwrap();
        assert_eq!(parsed.format(DATETIME_FORMAT).to_string(), "2024-02-14 00:00:00");
        assert_eq!(publish_date("yesterday-ish", noon()), None);
    }

    #[test]
    fn text_helpers() {
        assert_eq!(digits_only("2311 AB"), "2311");
        assert_eq!(capitalize("haarlemmerstraat"), "Haarlemmerstraat");
        assert_eq!(slug("Nieuwe Rijn"), "nieuwe-rijn");
        assert_eq!(squash("  a \n  b "), "a b");
    }
}
