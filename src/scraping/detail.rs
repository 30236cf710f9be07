//! Event detail pages.
//!
//! Detail pages come in several shapes (promoted, sold out, free), so every
//! field has its own extractor and fails on its own. Selectors follow the
//! site's current markup and break whenever it ships new generated class
//! names.

use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, error, info, warn};

use super::base;
use super::{BrowserSession, SessionError, SessionLauncher};
use crate::models::{EventDetail, FieldResult, ListingEntry, MissingField, RawEvent};

pub trait FieldExtractor: Send + Sync {
    fn field(&self) -> &'static str;
    fn extract(&self, document: &Html) -> FieldResult;
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("detail selector")
}

/// Text of the first match.
struct FirstText {
    field: &'static str,
    selector: Selector,
}

impl FieldExtractor for FirstText {
    fn field(&self) -> &'static str {
        self.field
    }

    fn extract(&self, document: &Html) -> FieldResult {
        base::first_text(&document.root_element(), &self.selector)
            .ok_or_else(|| MissingField::new(self.field, "element not found"))
    }
}

/// Text of the `index`-th match, whitespace collapsed.
struct NthText {
    field: &'static str,
    selector: Selector,
    index: usize,
}

impl FieldExtractor for NthText {
    fn field(&self) -> &'static str {
        self.field
    }

    fn extract(&self, document: &Html) -> FieldResult {
        document
            .select(&self.selector)
            .nth(self.index)
            .map(base::inner_text)
            .ok_or_else(|| MissingField::new(self.field, format!("no match #{}", self.index)))
    }
}

/// Distinct texts of every match (optionally only those whose markup
/// contains `marker`), comma joined. No match gives an empty string.
struct DistinctTexts {
    field: &'static str,
    selector: Selector,
    marker: Option<&'static str>,
}

impl FieldExtractor for DistinctTexts {
    fn field(&self) -> &'static str {
        self.field
    }

    fn extract(&self, document: &Html) -> FieldResult {
        let texts = document
            .select(&self.selector)
            .filter(|node| self.marker.map_or(true, |marker| node.html().contains(marker)))
            .map(base::inner_text)
            .filter(|text| !text.is_empty());
        Ok(base::distinct(texts).join(", "))
    }
}

/// Texts of `item` matches inside the first `container`. The container is
/// required; its items may be empty.
struct NestedTexts {
    field: &'static str,
    container: Selector,
    item: Selector,
}

impl FieldExtractor for NestedTexts {
    fn field(&self) -> &'static str {
        self.field
    }

    fn extract(&self, document: &Html) -> FieldResult {
        let container = document
            .select(&self.container)
            .next()
            .ok_or_else(|| MissingField::new(self.field, "container not found"))?;
        let names: Vec<String> = container
            .select(&self.item)
            .map(base::inner_text)
            .filter(|text| !text.is_empty())
            .collect();
        Ok(names.join(", "))
    }
}

/// Whatever follows the last `separator` in an attribute of the first match.
struct AttrTail {
    field: &'static str,
    selector: Selector,
    attr: &'static str,
    separator: char,
}

impl FieldExtractor for AttrTail {
    fn field(&self) -> &'static str {
        self.field
    }

    fn extract(&self, document: &Html) -> FieldResult {
        let value = base::first_attr(&document.root_element(), &self.selector, self.attr)
            .ok_or_else(|| MissingField::new(self.field, format!("no {} attribute", self.attr)))?;
        value
            .rsplit(self.separator)
            .next()
            .map(str::to_string)
            .ok_or_else(|| MissingField::new(self.field, "empty attribute"))
    }
}

struct DetailExtractors {
    title: Box<dyn FieldExtractor>,
    genres: Box<dyn FieldExtractor>,
    line_up: Box<dyn FieldExtractor>,
    venue_information: Box<dyn FieldExtractor>,
    location_details: Box<dyn FieldExtractor>,
    ticket_types: Box<dyn FieldExtractor>,
    ticket_prices: Box<dyn FieldExtractor>,
    location_identifier: Box<dyn FieldExtractor>,
    location_address: Box<dyn FieldExtractor>,
    remain_prices: Box<dyn FieldExtractor>,
}

const PRICE_CSS: &str = "p.PriceText-sc-17wxn8u-2";
const VENUE_BLOCK_CSS: &str = r#"div[overflow="hidden"]"#;

static EXTRACTORS: Lazy<DetailExtractors> = Lazy::new(|| DetailExtractors {
    title: Box::new(FirstText {
        field: "event_title",
        selector: selector("h1"),
    }),
    genres: Box::new(DistinctTexts {
        field: "event_genres",
        selector: selector("span[name]"),
        marker: None,
    }),
    line_up: Box::new(NestedTexts {
        field: "line_up",
        container: selector("div.LineUp-sc-1xigslr-0"),
        item: selector("h3"),
    }),
    venue_information: Box::new(NthText {
        field: "venue_information",
        selector: selector(VENUE_BLOCK_CSS),
        index: 0,
    }),
    location_details: Box::new(NthText {
        field: "event_location_details",
        selector: selector(VENUE_BLOCK_CSS),
        index: 1,
    }),
    ticket_types: Box::new(DistinctTexts {
        field: "event_ticket_types",
        selector: selector("h3.Name-sc-17wxn8u-0"),
        marker: None,
    }),
    ticket_prices: Box::new(DistinctTexts {
        field: "ticket_price",
        selector: selector(PRICE_CSS),
        marker: None,
    }),
    location_identifier: Box::new(AttrTail {
        field: "location_identifier",
        selector: selector("a.TertiaryTitle-sc-hrr11b-4"),
        attr: "href",
        separator: '=',
    }),
    location_address: Box::new(FirstText {
        field: "location_address",
        selector: selector(r##"p[color="#6E7A83"]"##),
    }),
    // purchasable tiers render their price with an inherited color
    remain_prices: Box::new(DistinctTexts {
        field: "remain_prices",
        selector: selector(PRICE_CSS),
        marker: Some("inherit"),
    }),
});

fn run(extractor: &dyn FieldExtractor, document: &Html) -> FieldResult {
    let result = extractor.extract(document);
    if let Err(err) = &result {
        debug!("field {} missing: {}", extractor.field(), err.reason);
    }
    result
}

pub fn extract_detail(html: &str) -> EventDetail {
    let document = Html::parse_document(html);
    let ex = &*EXTRACTORS;
    EventDetail {
        event_title: run(ex.title.as_ref(), &document),
        event_genres: run(ex.genres.as_ref(), &document),
        line_up: run(ex.line_up.as_ref(), &document),
        venue_information: run(ex.venue_information.as_ref(), &document),
        event_location_details: run(ex.location_details.as_ref(), &document),
        event_ticket_types: run(ex.ticket_types.as_ref(), &document),
        ticket_prices: run(ex.ticket_prices.as_ref(), &document),
        location_identifier: run(ex.location_identifier.as_ref(), &document),
        location_address: run(ex.location_address.as_ref(), &document),
        remain_prices: run(ex.remain_prices.as_ref(), &document),
    }
}

/// Loads one detail page in a fresh browser. The browser is closed once the
/// page source is in hand, whether or not loading worked.
pub async fn fetch_detail_page<L: SessionLauncher>(
    launcher: &L,
    url: &str,
) -> Result<String, SessionError> {
    let mut session = launcher.launch().await?;
    let html = match session.open(url).await {
        Ok(()) => session.page_source().await,
        Err(err) => Err(err),
    };
    if let Err(err) = session.close().await {
        warn!("closing detail session for {url} failed: {err}");
    }
    html
}

/// Visits every listed event, one browser per page. A page that fails to
/// load is logged and left out.
pub async fn harvest_details<L: SessionLauncher>(
    launcher: &L,
    entries: Vec<ListingEntry>,
) -> Vec<RawEvent> {
    let pb = ProgressBar::new(entries.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }

    let total = entries.len();
    let mut events = Vec::with_capacity(total);
    let mut failed = 0usize;

    for listing in entries {
        match fetch_detail_page(launcher, &listing.url).await {
            Ok(html) => {
                let detail = extract_detail(&html);
                let missing = detail.missing_count();
                if missing > 0 {
                    debug!("{}: {missing} fields missing", listing.url);
                }
                events.push(RawEvent { listing, detail });
            }
            Err(err) => {
                failed += 1;
                error!("skipping {}: {err}", listing.url);
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Harvested {} of {total} event pages ({failed} failed)",
        events.len()
    );
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::testing::{Script, ScriptedLauncher};

    const FULL_PAGE: &str = r##"
    <html><body>
        <h1>Techno Friday</h1>
        <span name="techno">Techno</span>
        <span name="house">House</span>
        <span name="techno">Techno</span>
        <div class="LineUp-sc-1xigslr-0 kpQxyz">
            <h3>Amelie Lens</h3>
            <h3>FJAAK</h3>
        </div>
        <div overflow="hidden">  Doors open at
            midnight.  </div>
        <div overflow="hidden">Over 18 only. ID required.</div>
        <h3 class="Name-sc-17wxn8u-0">Early bird</h3>
        <h3 class="Name-sc-17wxn8u-0">General</h3>
        <h3 class="Name-sc-17wxn8u-0">Early bird</h3>
        <p class="PriceText-sc-17wxn8u-2" color="#B2B8BD">€10</p>
        <p class="PriceText-sc-17wxn8u-2" color="inherit">€15</p>
        <p class="PriceText-sc-17wxn8u-2" color="inherit">€15</p>
        <p class="PriceText-sc-17wxn8u-2" color="inherit">€20</p>
        <a class="TertiaryTitle-sc-hrr11b-4" href="/en/venue?venueId=4242">Spook Club</a>
        <p color="#6E7A83">Carrer del Mar 12, 46003 Valencia, Spain</p>
    </body></html>
    "##;

    #[test]
    fn extracts_every_field_from_a_complete_page() {
        let detail = extract_detail(FULL_PAGE);
        assert_eq!(detail.event_title.as_deref(), Ok("Techno Friday"));
        assert_eq!(detail.event_genres.as_deref(), Ok("Techno, House"));
        assert_eq!(detail.line_up.as_deref(), Ok("Amelie Lens, FJAAK"));
        assert_eq!(detail.venue_information.as_deref(), Ok("Doors open at midnight."));
        assert_eq!(
            detail.event_location_details.as_deref(),
            Ok("Over 18 only. ID required.")
        );
        assert_eq!(detail.event_ticket_types.as_deref(), Ok("Early bird, General"));
        assert_eq!(detail.ticket_prices.as_deref(), Ok("€10, €15, €20"));
        assert_eq!(detail.location_identifier.as_deref(), Ok("4242"));
        assert_eq!(
            detail.location_address.as_deref(),
            Ok("Carrer del Mar 12, 46003 Valencia, Spain")
        );
        assert_eq!(detail.remain_prices.as_deref(), Ok("€15, €20"));
        assert_eq!(detail.missing_count(), 0);
    }

    #[test]
    fn missing_blocks_only_affect_their_own_field() {
        let html = r#"<html><body><h1>Free Jazz Night</h1>
            <span name="jazz">Jazz</span></body></html>"#;
        let detail = extract_detail(html);
        assert_eq!(detail.event_title.as_deref(), Ok("Free Jazz Night"));
        assert_eq!(detail.event_genres.as_deref(), Ok("Jazz"));
        assert_eq!(detail.line_up.as_ref().map_err(|e| e.field), Err("line_up"));
        assert!(detail.venue_information.is_err());
        assert!(detail.event_location_details.is_err());
        assert!(detail.location_identifier.is_err());
        assert!(detail.location_address.is_err());
        assert_eq!(detail.event_ticket_types.as_deref(), Ok(""));
        assert_eq!(detail.remain_prices.as_deref(), Ok(""));
    }

    #[tokio::test]
    async fn harvests_each_url_in_its_own_session() {
        let mut script = Script::default();
        script
            .pages
            .insert("https://xceed.me/e/111111".into(), vec![FULL_PAGE.to_string()]);
        script.failing_urls.push("https://xceed.me/e/222222".into());
        script.pages.insert(
            "https://xceed.me/e/333333".into(),
            vec!["<html><body><h1>Second</h1></body></html>".to_string()],
        );
        let launcher = ScriptedLauncher::new(script);

        let entries = ["111111", "222222", "333333"]
            .iter()
            .map(|id| ListingEntry {
                city: "Valencia".into(),
                url: format!("https://xceed.me/e/{id}"),
                place: None,
                image: None,
                raw_date: None,
            })
            .collect();

        let events = harvest_details(&launcher, entries).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].detail.event_title.as_deref(), Ok("Techno Friday"));
        assert_eq!(events[1].detail.event_title.as_deref(), Ok("Second"));
        let journal = launcher.journal();
        assert_eq!(journal.launched, 3);
        assert_eq!(journal.closed, 3);
    }
}
