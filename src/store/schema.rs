//! The remote table's columns and the checks every outgoing write passes.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{EventRecord, DATA_DATE_FORMAT, MISSING, TIMESTAMP_FORMAT};

/// Columns owned by the pipeline, in the remote table's order.
pub const REMOTE_COLUMNS: [&str; 16] = [
    "event_title",
    "event_genres",
    "line_up",
    "place",
    "starting_time",
    "finishing_time",
    "venue_information",
    "event_location_details",
    "event_ticket_types",
    "ticket_price",
    "location_identifier",
    "location_address",
    "remain_prices",
    "image",
    "url",
    "data_date",
];

/// The only columns refreshed on an event already in the store.
pub const PATCH_COLUMNS: [&str; 2] = ["remain_prices", "data_date"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("record has no url")]
    MissingUrl,
    #[error("{url}: column {column} is empty")]
    EmptyColumn { url: String, column: &'static str },
    #[error("{url}: column {column} has malformed value {value:?}")]
    Malformed {
        url: String,
        column: &'static str,
        value: String,
    },
    #[error("unexpected column set: {0}")]
    Columns(String),
    #[error("serialization failed: {0}")]
    Serialize(String),
}

pub fn validate(record: &EventRecord) -> Result<(), SchemaError> {
    if record.url.trim().is_empty() || record.url == MISSING {
        return Err(SchemaError::MissingUrl);
    }

    let fields = to_map(record)?;
    for column in REMOTE_COLUMNS {
        match fields.get(column) {
            Some(Value::String(text)) if !text.trim().is_empty() => {}
            Some(_) => {
                return Err(SchemaError::EmptyColumn {
                    url: record.url.clone(),
                    column,
                })
            }
            None => return Err(SchemaError::Columns(format!("missing {column}"))),
        }
    }

    check_timestamp(&record.url, "starting_time", &record.starting_time)?;
    check_timestamp(&record.url, "finishing_time", &record.finishing_time)?;
    check_data_date(&record.url, &record.data_date)?;
    Ok(())
}

fn check_timestamp(url: &str, column: &'static str, value: &str) -> Result<(), SchemaError> {
    if value == MISSING || NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).is_ok() {
        return Ok(());
    }
    Err(SchemaError::Malformed {
        url: url.to_string(),
        column,
        value: value.to_string(),
    })
}

fn check_data_date(url: &str, value: &str) -> Result<(), SchemaError> {
    NaiveDate::parse_from_str(value, DATA_DATE_FORMAT)
        .map(|_| ())
        .map_err(|_| SchemaError::Malformed {
            url: url.to_string(),
            column: "data_date",
            value: value.to_string(),
        })
}

fn to_map<T: Serialize>(value: &T) -> Result<Map<String, Value>, SchemaError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SchemaError::Serialize(format!("not an object: {other}"))),
        Err(err) => Err(SchemaError::Serialize(err.to_string())),
    }
}

/// Full column set for a new remote row.
pub fn insert_fields(record: &EventRecord) -> Result<Map<String, Value>, SchemaError> {
    validate(record)?;
    let map = to_map(record)?;
    if map.len() != REMOTE_COLUMNS.len() {
        return Err(SchemaError::Columns(map.keys().cloned().collect::<Vec<_>>().join(",")));
    }
    Ok(map)
}

/// The targeted patch for a row already in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemainPatch {
    pub remain_prices: String,
    pub data_date: String,
}

impl RemainPatch {
    pub fn from_record(record: &EventRecord) -> Result<Self, SchemaError> {
        if record.remain_prices.trim().is_empty() {
            return Err(SchemaError::EmptyColumn {
                url: record.url.clone(),
                column: "remain_prices",
            });
        }
        check_data_date(&record.url, &record.data_date)?;
        Ok(Self {
            remain_prices: record.remain_prices.clone(),
            data_date: record.data_date.clone(),
        })
    }

    pub fn fields(&self) -> Result<Map<String, Value>, SchemaError> {
        to_map(self)
    }
}
