//! Columns the dashboard derives when it loads a harvest, and the genre
//! tallies it charts.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{EventRecord, MISSING, TIMESTAMP_FORMAT};

static POSTAL_CITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{5}\s+([^,\d][^,]*)").expect("postal city regex"));

/// Rendering of a free tier in a normalized price list.
const FREE_PRICE: &str = "0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardRow {
    pub record: EventRecord,
    pub city: String,
    pub starting_day: String,
    pub free_entrance: bool,
}

/// A configured city named in the address wins; otherwise the locality
/// after a five digit postal code.
pub fn city_from_address(address: &str, known: &[String]) -> Option<String> {
    if address == MISSING {
        return None;
    }
    let lower = address.to_lowercase();
    if let Some(city) = known
        .iter()
        .find(|city| lower.contains(&city.to_lowercase()))
    {
        return Some(city.clone());
    }
    POSTAL_CITY_RE
        .captures(address)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|city| !city.is_empty())
}

pub fn starting_day(starting_time: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(starting_time, TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.format("%A").to_string())
}

/// True when one of the still purchasable tiers costs exactly nothing.
/// `10.0` or `20.0` do not count.
pub fn is_free_entrance(remain_prices: &str) -> bool {
    remain_prices
        .split(',')
        .map(str::trim)
        .any(|token| token == FREE_PRICE)
}

pub fn dashboard_rows(records: Vec<EventRecord>, known_cities: &[String]) -> Vec<DashboardRow> {
    records
        .into_iter()
        .map(|record| {
            let city = city_from_address(&record.location_address, known_cities)
                .unwrap_or_else(|| MISSING.to_string());
            let starting_day =
                starting_day(&record.starting_time).unwrap_or_else(|| MISSING.to_string());
            let free_entrance = is_free_entrance(&record.remain_prices);
            DashboardRow {
                record,
                city,
                starting_day,
                free_entrance,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreCount {
    pub city: String,
    pub genre: String,
    pub count: usize,
}

/// The `limit` most frequent genres of each city, cities in order of first
/// appearance, ties broken by name.
pub fn top_genres(rows: &[DashboardRow], limit: usize) -> Vec<GenreCount> {
    let mut cities: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, HashMap<&str, usize>> = HashMap::new();

    for row in rows {
        let city = row.city.as_str();
        if !cities.contains(&city) {
            cities.push(city);
        }
        let tally = counts.entry(city).or_default();
        for genre in row.record.event_genres.split(", ") {
            let genre = genre.trim();
            if genre.is_empty() || genre == MISSING {
                continue;
            }
            *tally.entry(genre).or_default() += 1;
        }
    }

    let mut out = Vec::new();
    for city in cities {
        let Some(tally) = counts.get(city) else {
            continue;
        };
        let mut ranked: Vec<(&str, usize)> = tally.iter().map(|(g, c)| (*g, *c)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        out.extend(ranked.into_iter().take(limit).map(|(genre, count)| GenreCount {
            city: city.to_string(),
            genre: genre.to_string(),
            count,
        }));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitySummary {
    pub city: String,
    pub events: usize,
    pub free_events: usize,
}

pub fn city_summaries(rows: &[DashboardRow]) -> Vec<CitySummary> {
    let mut out: Vec<CitySummary> = Vec::new();
    for row in rows {
        let index = match out.iter().position(|s| s.city == row.city) {
            Some(index) => index,
            None => {
                out.push(CitySummary {
                    city: row.city.clone(),
                    events: 0,
                    free_events: 0,
                });
                out.len() - 1
            }
        };
        out[index].events += 1;
        if row.free_entrance {
            out[index].free_events += 1;
        }
    }
    out
}
