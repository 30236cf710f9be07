use std::collections::HashSet;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, error, info, warn};

use super::base;
use super::{BrowserSession, Pacing, SessionError, SessionLauncher};
use crate::config::HarvestConfig;
use crate::models::ListingEntry;

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("listing anchor selector"));
static PLACE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h4").expect("listing place selector"));
static DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h5").expect("listing date selector"));
static IMAGE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"img[alt^="Cover for event"][loading="lazy"]"#)
        .expect("listing image selector")
});
static EVENT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{6}\b").expect("event id regex"));

/// What one snapshot of a listing page yielded.
#[derive(Debug, Default)]
pub struct ListingSnapshot {
    pub entries: Vec<ListingEntry>,
    /// Date of the last card whose date could be read.
    pub last_date: Option<NaiveDate>,
}

/// Extracts every event card from a listing page. A card field that can't
/// be read is left empty; the card itself is kept.
pub fn parse_listing(html: &str, city: &str, base_url: &str) -> ListingSnapshot {
    let document = Html::parse_document(html);
    let mut snapshot = ListingSnapshot::default();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = match anchor.value().attr("href") {
            Some(href) if EVENT_ID_RE.is_match(href) => href.to_string(),
            _ => continue,
        };
        let url = match base::absolute_url(base_url, Some(href)) {
            Some(url) => url,
            None => continue,
        };

        let place = base::first_text(&anchor, &PLACE_SELECTOR);
        let raw_date = base::first_text(&anchor, &DATE_SELECTOR);
        let image = base::first_attr(&anchor, &IMAGE_SELECTOR, "src");

        match raw_date.as_deref().and_then(base::parse_card_date) {
            Some(date) => snapshot.last_date = Some(date),
            None => debug!("unreadable card date for {url}: {raw_date:?}"),
        }

        snapshot.entries.push(ListingEntry {
            city: city.to_string(),
            url,
            place,
            image,
            raw_date,
        });
    }

    snapshot
}

/// Cards collected across scrolls, first sighting wins.
#[derive(Debug, Default)]
pub struct ListingAccumulator {
    entries: Vec<ListingEntry>,
    seen: HashSet<String>,
}

impl ListingAccumulator {
    /// Returns how many of `entries` were new.
    pub fn merge(&mut self, entries: Vec<ListingEntry>) -> usize {
        let before = self.entries.len();
        for entry in entries {
            if self.seen.insert(entry.url.clone()) {
                self.entries.push(entry);
            }
        }
        self.entries.len() - before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<ListingEntry> {
        self.entries
    }
}

#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub city: String,
    pub listing_url: String,
    pub base_url: String,
    pub horizon: NaiveDate,
    pub max_scrolls: usize,
}

impl CrawlPlan {
    pub fn for_city(config: &HarvestConfig, city: &str, horizon: NaiveDate) -> Self {
        Self {
            city: city.to_string(),
            listing_url: config.listing_url(city),
            base_url: config.site_base_url.clone(),
            horizon,
            max_scrolls: config.max_scrolls,
        }
    }
}

/// Scrolls one city's listing until a card dated on or after the horizon
/// shows up, or the scroll cap is hit.
pub async fn crawl_city<L: SessionLauncher>(
    launcher: &L,
    plan: &CrawlPlan,
    pacing: &Pacing,
) -> Result<Vec<ListingEntry>, SessionError> {
    let mut session = launcher.launch().await?;
    let result = scroll_until_horizon(&mut session, plan, pacing).await;
    if let Err(err) = session.close().await {
        warn!("closing listing session for {} failed: {err}", plan.city);
    }
    result
}

async fn scroll_until_horizon<S: BrowserSession>(
    session: &mut S,
    plan: &CrawlPlan,
    pacing: &Pacing,
) -> Result<Vec<ListingEntry>, SessionError> {
    session.open(&plan.listing_url).await?;
    pacing.pause().await;

    let mut found = ListingAccumulator::default();
    let mut cursor: Option<NaiveDate> = None;

    for scroll in 1..=plan.max_scrolls {
        session.scroll_by(pacing.scroll_increment()).await?;
        pacing.pause().await;

        let html = session.page_source().await?;
        let snapshot = parse_listing(&html, &plan.city, &plan.base_url);
        let added = found.merge(snapshot.entries);
        if snapshot.last_date.is_some() {
            cursor = snapshot.last_date;
        }
        debug!(
            "{} scroll {scroll}: {added} new, {} total, cursor {cursor:?}",
            plan.city,
            found.len()
        );

        if cursor.is_some_and(|date| date >= plan.horizon) {
            info!(
                "{}: reached {} after {scroll} scrolls, {} events",
                plan.city,
                plan.horizon,
                found.len()
            );
            return Ok(found.into_entries());
        }
    }

    warn!(
        "{}: stopped after {} scrolls before reaching {} (cursor {cursor:?})",
        plan.city, plan.max_scrolls, plan.horizon
    );
    Ok(found.into_entries())
}

/// Crawls every configured city in order. A city whose browser fails is
/// reported and skipped; the others still run. An event listed by more than
/// one city is kept once, under the first city that showed it.
pub async fn crawl_cities<L: SessionLauncher>(
    launcher: &L,
    config: &HarvestConfig,
    cities: &[String],
    horizon: NaiveDate,
    pacing: &Pacing,
) -> Vec<ListingEntry> {
    let mut all = ListingAccumulator::default();
    for city in cities {
        let plan = CrawlPlan::for_city(config, city, horizon);
        match crawl_city(launcher, &plan, pacing).await {
            Ok(found) => {
                let total = found.len();
                let added = all.merge(found);
                info!("{city}: {total} event urls ({} already listed)", total - added);
            }
            Err(err) => error!("{city}: listing crawl failed: {err}"),
        }
    }
    if all.is_empty() {
        warn!("no event urls found in {} cities", cities.len());
    }
    all.into_entries()
}
