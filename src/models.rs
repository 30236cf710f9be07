use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stand-in for any value the pipeline could not recover. The remote store
/// never receives an empty or null field; it receives this instead.
pub const MISSING: &str = "NaN";
pub const SOLD_OUT: &str = "SOLD OUT";
pub const NO_INFORMATION: &str = "No information available";

/// Timestamp layout shared by the artifact and the remote store.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATA_DATE_FORMAT: &str = "%Y-%m-%d";

/// One event card found on a city listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub city: String,
    pub url: String,
    pub place: Option<String>,
    pub image: Option<String>,
    pub raw_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct MissingField {
    pub field: &'static str,
    pub reason: String,
}

impl MissingField {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub type FieldResult = Result<String, MissingField>;

/// Fields pulled from one event detail page. Each one succeeds or fails on
/// its own.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDetail {
    pub event_title: FieldResult,
    pub event_genres: FieldResult,
    pub line_up: FieldResult,
    pub venue_information: FieldResult,
    pub event_location_details: FieldResult,
    pub event_ticket_types: FieldResult,
    pub ticket_prices: FieldResult,
    pub location_identifier: FieldResult,
    pub location_address: FieldResult,
    pub remain_prices: FieldResult,
}

impl EventDetail {
    pub fn missing_count(&self) -> usize {
        [
            &self.event_title,
            &self.event_genres,
            &self.line_up,
            &self.venue_information,
            &self.event_location_details,
            &self.event_ticket_types,
            &self.ticket_prices,
            &self.location_identifier,
            &self.location_address,
            &self.remain_prices,
        ]
        .iter()
        .filter(|field| field.is_err())
        .count()
    }
}

/// Listing metadata joined with its detail page, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub listing: ListingEntry,
    pub detail: EventDetail,
}

/// One normalized event occurrence. Every field is a string so the record
/// can go to the artifact and to the remote store unchanged; the column
/// order here is the artifact's column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_title: String,
    pub event_genres: String,
    pub line_up: String,
    pub place: String,
    pub starting_time: String,
    pub finishing_time: String,
    pub venue_information: String,
    pub event_location_details: String,
    pub event_ticket_types: String,
    pub ticket_price: String,
    pub location_identifier: String,
    pub location_address: String,
    pub remain_prices: String,
    pub image: String,
    pub url: String,
    pub data_date: String,
}

impl EventRecord {
    /// A record with only its key set; everything else is [`MISSING`].
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            event_title: MISSING.to_string(),
            event_genres: MISSING.to_string(),
            line_up: MISSING.to_string(),
            place: MISSING.to_string(),
            starting_time: MISSING.to_string(),
            finishing_time: MISSING.to_string(),
            venue_information: MISSING.to_string(),
            event_location_details: MISSING.to_string(),
            event_ticket_types: MISSING.to_string(),
            ticket_price: MISSING.to_string(),
            location_identifier: MISSING.to_string(),
            location_address: MISSING.to_string(),
            remain_prices: MISSING.to_string(),
            image: MISSING.to_string(),
            url: url.into(),
            data_date: MISSING.to_string(),
        }
    }
}

pub fn or_missing(value: Option<String>) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text,
        _ => MISSING.to_string(),
    }
}
