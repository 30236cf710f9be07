//! Free-text ticket prices to sorted numeric lists.
//!
//! Prices are never negative, so two negative codes are reserved for the
//! special cases. Upstream code writes the code in place of the raw text and
//! the normalizer renders it as the matching sentinel label.

use crate::models::{NO_INFORMATION, SOLD_OUT};

pub const SOLD_OUT_CODE: &str = "-1";
pub const NO_INFORMATION_CODE: &str = "-2";

const SOLD_OUT_VALUE: f64 = -1.0;
const NO_INFORMATION_VALUE: f64 = -2.0;

/// `"€15 €12.50 Free"` becomes `"0.0, 12.5, 15.0"`.
///
/// Tokens that are not numbers are skipped. Input without a single number
/// renders as the no-information sentinel.
pub fn normalize(raw: &str) -> String {
    let amounts = parse_amounts(raw);
    if amounts.is_empty() {
        return NO_INFORMATION.to_string();
    }
    amounts
        .iter()
        .map(|value| render(*value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Only the cheapest entry of [`normalize`].
pub fn lowest(raw: &str) -> String {
    parse_amounts(raw)
        .first()
        .map(|value| render(*value))
        .unwrap_or_else(|| NO_INFORMATION.to_string())
}

/// Reads a normalized list back into numbers. Sentinel labels carry no
/// amount and are left out.
pub fn parse_normalized(text: &str) -> Vec<f64> {
    text.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .collect()
}

pub fn is_sentinel(text: &str) -> bool {
    text == SOLD_OUT || text == NO_INFORMATION
}

fn parse_amounts(raw: &str) -> Vec<f64> {
    let cleaned = raw.replace('€', "").replace("Free", "0").replace(',', "");
    let mut amounts: Vec<f64> = cleaned
        .split_whitespace()
        .filter_map(|token| token.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .collect();
    amounts.sort_by(|a, b| a.total_cmp(b));
    amounts
}

fn render(value: f64) -> String {
    if value == SOLD_OUT_VALUE {
        SOLD_OUT.to_string()
    } else if value == NO_INFORMATION_VALUE {
        NO_INFORMATION.to_string()
    } else {
        format!("{value:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_and_joins_prices() {
        assert_eq!(normalize("€15 €12.50 Free"), "0.0, 12.5, 15.0");
        assert_eq!(normalize("€20, €8"), "8.0, 20.0");
    }

    #[test]
    fn normalized_output_parses_back_to_the_same_amounts() {
        let raw = "€30 €9.99 Free €30 €1,200";
        let mut expected: Vec<f64> = vec![30.0, 9.99, 0.0, 30.0, 1200.0];
        expected.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(parse_normalized(&normalize(raw)), expected);
    }

    #[test]
    fn renders_reserved_codes_as_labels() {
        assert_eq!(normalize(SOLD_OUT_CODE), SOLD_OUT);
        assert_eq!(normalize(NO_INFORMATION_CODE), NO_INFORMATION);
        assert_eq!(lowest(SOLD_OUT_CODE), SOLD_OUT);
    }

    #[test]
    fn real_prices_never_render_as_sentinels() {
        assert_eq!(normalize("€0.11 €1.11 €10.11"), "0.11, 1.11, 10.11");
    }

    #[test]
    fn input_without_numbers_does_not_fail() {
        assert_eq!(normalize(""), NO_INFORMATION);
        assert_eq!(normalize("Sold out soon"), NO_INFORMATION);
        assert_eq!(lowest("   "), NO_INFORMATION);
    }

    #[test]
    fn lowest_picks_the_first_sorted_value() {
        assert_eq!(lowest("€25 €18 €40"), "18.0");
        assert_eq!(lowest("€25 Free"), "0.0");
    }

    #[test]
    fn sentinel_labels_are_skipped_when_parsing_back() {
        assert!(parse_normalized(SOLD_OUT).is_empty());
        assert!(is_sentinel(NO_INFORMATION));
        assert!(!is_sentinel("0.0"));
    }
}
