use chrono::NaiveDate;
use scraper::{ElementRef, Selector};

/// Date layout of the listing cards, e.g. `Fri, 18 Oct 2024`.
pub const CARD_DATE_FORMAT: &str = "%a, %d %b %Y";

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().and_then(|node| {
        let cleaned = inner_text(node);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    })
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(&href).ok().map(|u| u.to_string())
}

/// Keeps the first occurrence of every value, in page order.
pub fn distinct(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// The date half of a card's `date | time` text.
pub fn parse_card_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.split('|').next()?.trim();
    NaiveDate::parse_from_str(date_part, CARD_DATE_FORMAT).ok()
}
