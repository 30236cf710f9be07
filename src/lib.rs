pub mod analysis;
pub mod config;
pub mod export;
pub mod models;
pub mod normalize;
pub mod prices;
pub mod reconcile;
pub mod scraping;
pub mod store;
pub mod utils;

use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use config::HarvestConfig;
use export::RunReport;
use models::{EventRecord, TIMESTAMP_FORMAT};
use scraping::{detail, listing, Pacing, SessionLauncher};
use store::RecordStore;

/// What to crawl on one run.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    /// Days ahead of today the listings are scrolled to.
    pub days: i64,
    /// Cities to crawl; empty means every configured city.
    pub cities: Vec<String>,
}

impl HarvestRequest {
    pub fn full(config: &HarvestConfig) -> Self {
        Self {
            days: config.full_horizon_days,
            cities: Vec::new(),
        }
    }

    pub fn update(config: &HarvestConfig) -> Self {
        Self {
            days: config.update_horizon_days,
            cities: Vec::new(),
        }
    }

    fn cities<'a>(&'a self, config: &'a HarvestConfig) -> &'a [String] {
        if self.cities.is_empty() {
            &config.cities
        } else {
            &self.cities
        }
    }
}

#[derive(Debug)]
pub struct Harvest {
    pub data_date: NaiveDate,
    pub discovered: usize,
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub harvested: usize,
    pub updates: usize,
    pub inserts: usize,
    pub failed_updates: usize,
    pub failed_inserts: usize,
    pub failed_batches: Vec<usize>,
    pub artifact: Option<PathBuf>,
}

/// Crawls the listings, visits every discovered event and normalizes the
/// result. Browser failures cost the affected city or url only.
pub async fn collect<L: SessionLauncher>(
    launcher: &L,
    config: &HarvestConfig,
    request: &HarvestRequest,
    pacing: &Pacing,
) -> anyhow::Result<Harvest> {
    let data_date = config.today().context("resolving today's date")?;
    let horizon = config
        .horizon(request.days)
        .context("resolving the crawl horizon")?;
    let cities = request.cities(config);
    info!(
        "Crawling {} cities up to {horizon} ({} days)",
        cities.len(),
        request.days
    );

    let entries = listing::crawl_cities(launcher, config, cities, horizon, pacing).await;
    let discovered = entries.len();
    let raws = detail::harvest_details(launcher, entries).await;
    let records = normalize::normalize_events(raws, data_date);

    Ok(Harvest {
        data_date,
        discovered,
        records,
    })
}

/// Full scrape: harvest and write the artifact, the store is left alone.
pub async fn harvest<L: SessionLauncher>(
    launcher: &L,
    config: &HarvestConfig,
    request: &HarvestRequest,
    pacing: &Pacing,
    run_at: NaiveDateTime,
) -> anyhow::Result<RunSummary> {
    let harvest = collect(launcher, config, request, pacing).await?;
    let path = export::artifact_path(&config.output_dir(), run_at);
    export::write_artifact(&path, &harvest.records)
        .with_context(|| format!("writing harvest artifact {}", path.display()))?;
    info!("Wrote {} records to {}", harvest.records.len(), path.display());

    Ok(RunSummary {
        discovered: harvest.discovered,
        harvested: harvest.records.len(),
        artifact: Some(path),
        ..RunSummary::default()
    })
}

/// Incremental run: harvest, then refresh rows the store already has and
/// add the ones it doesn't. A failed store read aborts before anything is
/// written.
pub async fn update<L: SessionLauncher, S: RecordStore>(
    launcher: &L,
    store: &S,
    config: &HarvestConfig,
    request: &HarvestRequest,
    pacing: &Pacing,
    run_at: NaiveDateTime,
) -> anyhow::Result<RunSummary> {
    let harvest = collect(launcher, config, request, pacing).await?;
    let harvested = harvest.records.len();

    let path = export::artifact_path(&config.output_dir(), run_at);
    export::write_artifact(&path, &harvest.records)
        .with_context(|| format!("writing harvest artifact {}", path.display()))?;

    let existing = store::fetch_all(store)
        .await
        .context("reading the record store")?;
    let plan = reconcile::reconcile(harvest.records, &existing);
    info!(
        "{} records to update, {} to insert",
        plan.updates.len(),
        plan.inserts.len()
    );

    let updated = store::write_updates(store, &plan.updates).await;
    let inserted = store::write_inserts(store, &plan.inserts, config.batch_size).await;
    if !inserted.failed_batches.is_empty() {
        warn!("insert batches refused: {:?}", inserted.failed_batches);
    }

    let report = RunReport {
        date: run_at.format(TIMESTAMP_FORMAT).to_string(),
        updated_events: plan.updates.len(),
        new_events: plan.inserts.len(),
    };
    let report_path = export::report_path(&config.output_dir());
    export::append_report(&report_path, &report)
        .with_context(|| format!("appending run report {}", report_path.display()))?;

    Ok(RunSummary {
        discovered: harvest.discovered,
        harvested,
        updates: updated.written,
        inserts: inserted.written,
        failed_updates: updated.failed,
        failed_inserts: inserted.failed,
        failed_batches: inserted.failed_batches,
        artifact: Some(path),
    })
}
