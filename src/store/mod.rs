pub mod airtable;
pub mod schema;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::EventRecord;
use crate::reconcile::ReconciledUpdate;
use schema::{RemainPatch, SchemaError};

/// Requests per insert call accepted by the remote store.
pub const MAX_BATCH: usize = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(String),
    #[error("store returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected store payload: {0}")]
    Decode(String),
    #[error("record {0} not found")]
    NotFound(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl StoredRecord {
    pub fn url(&self) -> Option<&str> {
        self.fields
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub records: Vec<StoredRecord>,
    /// Continuation cursor; absent on the last page.
    #[serde(default)]
    pub offset: Option<String>,
}

/// A paginated record service.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    async fn list_page(&self, offset: Option<&str>) -> Result<RecordPage, StoreError>;
    async fn create_records(
        &self,
        records: &[Map<String, Value>],
        typecast: bool,
    ) -> Result<(), StoreError>;
    async fn update_record(&self, id: &str, fields: &Map<String, Value>) -> Result<(), StoreError>;
}

/// Reads every page, following the cursor until the store stops sending one.
pub async fn fetch_all<S: RecordStore>(store: &S) -> Result<Vec<StoredRecord>, StoreError> {
    let mut records = Vec::new();
    let mut offset: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.list_page(offset.as_deref()).await?;
        pages += 1;
        records.extend(page.records);
        match page.offset {
            Some(next) if !next.is_empty() => offset = Some(next),
            _ => break,
        }
    }

    info!("Fetched {} stored records in {pages} pages", records.len());
    Ok(records)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub written: usize,
    pub failed: usize,
    /// Zero-based indices of insert batches the store refused.
    pub failed_batches: Vec<usize>,
}

/// Patches `remain_prices` and `data_date` on each matched row. A refused
/// patch is logged and the rest still go out.
pub async fn write_updates<S: RecordStore>(
    store: &S,
    updates: &[ReconciledUpdate],
) -> WriteOutcome {
    let mut outcome = WriteOutcome::default();

    for update in updates {
        let fields = match RemainPatch::from_record(&update.record).and_then(|p| p.fields()) {
            Ok(fields) => fields,
            Err(err) => {
                warn!("not patching {}: {err}", update.id);
                outcome.failed += 1;
                continue;
            }
        };
        match store.update_record(&update.id, &fields).await {
            Ok(()) => outcome.written += 1,
            Err(err) => {
                error!("failed to update {} ({}): {err}", update.id, update.record.url);
                outcome.failed += 1;
            }
        }
    }

    outcome
}

/// Sends new rows in batches of at most `batch_size` (capped at
/// [`MAX_BATCH`]), in order. A refused batch is logged with its index and
/// the next batch still goes out.
pub async fn write_inserts<S: RecordStore>(
    store: &S,
    inserts: &[EventRecord],
    batch_size: usize,
) -> WriteOutcome {
    let batch_size = batch_size.clamp(1, MAX_BATCH);
    let mut outcome = WriteOutcome::default();

    for (index, batch) in inserts.chunks(batch_size).enumerate() {
        let mut payload = Vec::with_capacity(batch.len());
        for record in batch {
            match schema::insert_fields(record) {
                Ok(fields) => payload.push(fields),
                Err(err) => {
                    warn!("batch {index}: dropping invalid record: {err}");
                    outcome.failed += 1;
                }
            }
        }
        if payload.is_empty() {
            continue;
        }

        let first_row = index * batch_size + 1;
        match store.create_records(&payload, true).await {
            Ok(()) => {
                info!("Uploaded batch {index} starting at row {first_row} ({} records)", payload.len());
                outcome.written += payload.len();
            }
            Err(err) => {
                error!(
                    "Failed to upload batch {index} starting at row {first_row} ({} records): {err}",
                    payload.len()
                );
                outcome.failed += payload.len();
                outcome.failed_batches.push(index);
            }
        }
    }

    outcome
}
