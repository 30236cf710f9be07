//! Files a run leaves behind: the harvest table the dashboard reads, and a
//! one-line-per-run report.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::EventRecord;
use crate::store::schema::REMOTE_COLUMNS;
use crate::utils;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot open {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub fn artifact_path(dir: &Path, run_at: NaiveDateTime) -> PathBuf {
    dir.join(format!("events_{}.csv", run_at.format("%Y%m%d_%H%M%S")))
}

pub fn report_path(dir: &Path) -> PathBuf {
    dir.join("report.csv")
}

/// Writes the full record table, header included even when empty.
pub fn write_artifact(path: &Path, records: &[EventRecord]) -> Result<(), ExportError> {
    utils::ensure_parent(path);
    let mut writer = csv::Writer::from_path(path)?;
    if records.is_empty() {
        writer.write_record(REMOTE_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub fn read_artifact(path: &Path) -> Result<Vec<EventRecord>, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub date: String,
    pub updated_events: usize,
    pub new_events: usize,
}

/// Appends one line, writing the header only when the file is new.
pub fn append_report(path: &Path, report: &RunReport) -> Result<(), ExportError> {
    utils::ensure_parent(path);
    let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    writer.serialize(report)?;
    writer.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub fn read_reports(path: &Path) -> Result<Vec<RunReport>, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut reports = Vec::new();
    for row in reader.deserialize() {
        reports.push(row?);
    }
    Ok(reports)
}
