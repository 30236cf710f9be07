//! Splits a fresh harvest into rows the store already has and rows it
//! doesn't, by url.

use std::collections::{HashMap, HashSet};

use crate::models::EventRecord;
use crate::store::StoredRecord;

/// A harvested record matched to its existing remote row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledUpdate {
    pub id: String,
    pub record: EventRecord,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub updates: Vec<ReconciledUpdate>,
    pub inserts: Vec<EventRecord>,
}

/// Duplicate urls in `new` collapse to their last sighting, which carries
/// the most recent prices. If the store itself holds a url twice, the first
/// remote row is the one updated.
pub fn reconcile(new: Vec<EventRecord>, old: &[StoredRecord]) -> Reconciliation {
    let mut known: HashMap<&str, &str> = HashMap::new();
    for stored in old {
        if let Some(url) = stored.url() {
            known.entry(url).or_insert(stored.id.as_str());
        }
    }

    let mut result = Reconciliation::default();
    for record in dedupe_by_url(new) {
        match known.get(record.url.as_str()) {
            Some(id) => result.updates.push(ReconciledUpdate {
                id: (*id).to_string(),
                record,
            }),
            None => result.inserts.push(record),
        }
    }
    result
}

fn dedupe_by_url(records: Vec<EventRecord>) -> Vec<EventRecord> {
    let mut last_index: HashMap<String, usize> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        last_index.insert(record.url.clone(), index);
    }
    let mut emitted = HashSet::new();
    let mut out = Vec::with_capacity(last_index.len());
    for (index, record) in records.into_iter().enumerate() {
        if last_index.get(&record.url) == Some(&index) && emitted.insert(record.url.clone()) {
            out.push(record);
        }
    }
    out
}
