//! Small helpers over `scraper` for the browser-rendered sources.

use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};

use crate::scrapers::normalize::squash;

lazy_static! {
    static ref DT: Selector = Selector::parse("dt").unwrap();
    static ref DD: Selector = Selector::parse("dd").unwrap();
}

/// Visible text of an element, whitespace collapsed
pub fn text(element: ElementRef<'_>) -> String {
    squash(&element.text().collect::<String>())
}

pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).next().map(text)
}

pub fn first_text_in(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(text)
}

/// `dt`/`dd` pairs of a definition list; wrapper `dd`s holding nested ones are skipped
pub fn definition_pairs(list: ElementRef<'_>) -> Vec<(String, String)> {
    let terms = list.select(&DT).map(text);
    let details = list
        .select(&DD)
        .filter(|dd| dd.select(&DD).next().is_none())
        .map(text);
    terms.zip(details).collect()
}

/// Value for the first label present, so an English label can fall back to Dutch
pub fn labelled<'a>(pairs: &'a [(String, String)], labels: &[&str]) -> Option<&'a str> {
    labels.iter().find_map(|label| {
        pairs
            .iter()
            .find(|(term, _)| term == label)
            .map(|(_, value)| value.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_pairs_skip_wrapper_dds() {
        let html = Html::parse_fragment(
            r#"<dl id="t">
                 <dt>Rental price </dt><dd>€ 1.250 per month</dd>
                 <dt>Status</dt><dd><dl><dd>nested</dd></dl></dd>
               </dl>"#,
        );
        let list = html.select(&Selector::parse("dl#t").unwrap()).next().unwrap();

        let pairs = definition_pairs(list);

        assert_eq!(pairs[0], ("Rental price".to_string(), "€ 1.250 per month".to_string()));
        assert_eq!(pairs[1], ("Status".to_string(), "nested".to_string()));
    }

    #[test]
    fn labelled_prefers_earlier_labels() {
        let pairs = vec![
            ("Huurprijs".to_string(), "€ 900".to_string()),
            ("Rental price".to_string(), "€ 950".to_string()),
        ];
        assert_eq!(labelled(&pairs, &["Rental price", "Huurprijs"]), Some("€ 950"));
        assert_eq!(labelled(&pairs[..1], &["Rental price", "Huurprijs"]), Some("€ 900"));
        assert_eq!(labelled(&pairs, &["Area"]), None);
    }
}
