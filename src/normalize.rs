//! Raw harvested events to [`EventRecord`]s.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::{
    or_missing, EventRecord, FieldResult, RawEvent, DATA_DATE_FORMAT, MISSING, NO_INFORMATION,
    TIMESTAMP_FORMAT,
};
use crate::prices::{self, NO_INFORMATION_CODE, SOLD_OUT_CODE};
use crate::scraping::base;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub start: NaiveDateTime,
    /// Absent when the card shows no readable closing time.
    pub finish: Option<NaiveDateTime>,
}

/// Splits a card's `Fri, 18 Oct 2024 | 23:30 - 06:00` text. A finish clock
/// time earlier than the start belongs to the next day. A card with a start
/// but no usable finish still yields the start.
pub fn split_schedule(raw: &str) -> Option<Schedule> {
    let (_, times) = raw.split_once('|')?;
    let date = base::parse_card_date(raw)?;
    let (start, finish) = match times.split_once('-') {
        Some((start, finish)) => (start, Some(finish)),
        None => (times, None),
    };
    let start = parse_clock(start)?;
    match finish.and_then(parse_clock) {
        Some(finish) => Some(rolled_schedule(date, start, finish)),
        None => Some(Schedule {
            start: date.and_time(start),
            finish: None,
        }),
    }
}

fn parse_clock(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M").ok()
}

pub fn rolled_schedule(date: NaiveDate, start: NaiveTime, finish: NaiveTime) -> Schedule {
    let finish_date = if finish < start {
        date + Duration::days(1)
    } else {
        date
    };
    Schedule {
        start: date.and_time(start),
        finish: Some(finish_date.and_time(finish)),
    }
}

fn field(value: FieldResult) -> String {
    or_missing(value.ok())
}

struct Pricing {
    ticket_types: String,
    ticket_price: String,
    remain_prices: String,
}

/// No ticket types means the page says nothing about prices, whatever else
/// it shows. With ticket types but nothing purchasable, every tier is gone.
fn pricing(ticket_types: FieldResult, ticket_prices: FieldResult, remain: FieldResult) -> Pricing {
    let ticket_types = match ticket_types {
        Ok(types) if !types.trim().is_empty() => types,
        _ => {
            return Pricing {
                ticket_types: NO_INFORMATION.to_string(),
                ticket_price: prices::normalize(NO_INFORMATION_CODE),
                remain_prices: prices::normalize(NO_INFORMATION_CODE),
            }
        }
    };

    let ticket_price = match ticket_prices {
        Ok(raw) => prices::normalize(&raw),
        Err(_) => MISSING.to_string(),
    };
    let remain_prices = match remain {
        Ok(raw) if raw.trim().is_empty() => prices::normalize(SOLD_OUT_CODE),
        Ok(raw) => prices::normalize(&raw),
        Err(_) => MISSING.to_string(),
    };

    Pricing {
        ticket_types,
        ticket_price,
        remain_prices,
    }
}

pub fn normalize_event(raw: RawEvent, data_date: NaiveDate) -> EventRecord {
    let RawEvent { listing, detail } = raw;

    let schedule = listing.raw_date.as_deref().and_then(split_schedule);
    let starting_time = or_missing(
        schedule.map(|s| s.start.format(TIMESTAMP_FORMAT).to_string()),
    );
    let finishing_time = or_missing(
        schedule
            .and_then(|s| s.finish)
            .map(|finish| finish.format(TIMESTAMP_FORMAT).to_string()),
    );

    let pricing = pricing(
        detail.event_ticket_types,
        detail.ticket_prices,
        detail.remain_prices,
    );

    EventRecord {
        event_title: field(detail.event_title),
        event_genres: field(detail.event_genres),
        line_up: field(detail.line_up),
        place: or_missing(listing.place),
        starting_time,
        finishing_time,
        venue_information: field(detail.venue_information),
        event_location_details: field(detail.event_location_details),
        event_ticket_types: pricing.ticket_types,
        ticket_price: pricing.ticket_price,
        location_identifier: field(detail.location_identifier),
        location_address: field(detail.location_address),
        remain_prices: pricing.remain_prices,
        image: or_missing(listing.image),
        url: listing.url,
        data_date: data_date.format(DATA_DATE_FORMAT).to_string(),
    }
}

pub fn normalize_events(raws: Vec<RawEvent>, data_date: NaiveDate) -> Vec<EventRecord> {
    raws.into_iter()
        .map(|raw| normalize_event(raw, data_date))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDetail, ListingEntry, MissingField, SOLD_OUT};

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).expect("time")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, d).expect("date")
    }

    #[test]
    fn finish_before_start_rolls_to_next_day() {
        let s = rolled_schedule(day(18), hm(23, 30), hm(1, 0));
        assert_eq!(s.start, day(18).and_time(hm(23, 30)));
        assert_eq!(s.finish, Some(day(19).and_time(hm(1, 0))));
    }

    #[test]
    fn same_day_schedule_stays_put() {
        let s = rolled_schedule(day(18), hm(14, 0), hm(18, 0));
        assert_eq!(s.finish, Some(day(18).and_time(hm(18, 0))));
        assert!(s.finish.is_some_and(|finish| s.start <= finish));
    }

    #[test]
    fn splits_card_text() {
        let s = split_schedule("Fri, 18 Oct 2024 | 23:30 - 06:00").expect("schedule");
        assert_eq!(s.start, day(18).and_time(hm(23, 30)));
        assert_eq!(s.finish, Some(day(19).and_time(hm(6, 0))));
        assert_eq!(split_schedule("Fri, 18 Oct 2024"), None);
        assert_eq!(split_schedule("Fri, 18 Oct 2024 | late"), None);
    }

    #[test]
    fn open_ended_card_keeps_its_start() {
        for raw in ["Fri, 18 Oct 2024 | 23:30", "Fri, 18 Oct 2024 | 23:30 - late"] {
            let s = split_schedule(raw).expect("schedule");
            assert_eq!(s.start, day(18).and_time(hm(23, 30)));
            assert_eq!(s.finish, None);
        }
    }

    fn listing() -> ListingEntry {
        ListingEntry {
            city: "Valencia".into(),
            url: "https://xceed.me/en/valencia/event/x/123456".into(),
            place: Some("Spook Club".into()),
            image: None,
            raw_date: Some("Fri, 18 Oct 2024 | 23:30 - 06:00".into()),
        }
    }

    fn detail(types: &str, prices: &str, remain: &str) -> EventDetail {
        EventDetail {
            event_title: Ok("Techno Friday".into()),
            event_genres: Ok("Techno, House".into()),
            line_up: Err(MissingField::new("line_up", "container not found")),
            venue_information: Ok("Doors at midnight".into()),
            event_location_details: Ok("18+".into()),
            event_ticket_types: Ok(types.into()),
            ticket_prices: Ok(prices.into()),
            location_identifier: Ok("4242".into()),
            location_address: Ok("Carrer del Mar 12, 46003 Valencia".into()),
            remain_prices: Ok(remain.into()),
        }
    }

    #[test]
    fn normalizes_a_complete_event() {
        let raw = RawEvent {
            listing: listing(),
            detail: detail("Early bird, General", "€10, €15, Free", "€15"),
        };
        let record = normalize_event(raw, day(16));
        assert_eq!(record.starting_time, "2024-10-18 23:30:00");
        assert_eq!(record.finishing_time, "2024-10-19 06:00:00");
        assert_eq!(record.ticket_price, "0.0, 10.0, 15.0");
        assert_eq!(record.remain_prices, "15.0");
        assert_eq!(record.data_date, "2024-10-16");
        assert_eq!(record.line_up, MISSING);
        assert_eq!(record.image, MISSING);
        assert_eq!(record.place, "Spook Club");
    }

    #[test]
    fn empty_ticket_types_force_no_information() {
        let raw = RawEvent {
            listing: listing(),
            detail: detail("", "€12 €30", "€12"),
        };
        let record = normalize_event(raw, day(16));
        assert_eq!(record.event_ticket_types, NO_INFORMATION);
        assert_eq!(record.ticket_price, NO_INFORMATION);
        assert_eq!(record.remain_prices, NO_INFORMATION);
    }

    #[test]
    fn nothing_left_to_buy_is_sold_out() {
        let raw = RawEvent {
            listing: listing(),
            detail: detail("General", "€12", ""),
        };
        let record = normalize_event(raw, day(16));
        assert_eq!(record.ticket_price, "12.0");
        assert_eq!(record.remain_prices, SOLD_OUT);
    }

    #[test]
    fn unreadable_date_leaves_times_missing() {
        let mut entry = listing();
        entry.raw_date = Some("Tonight".into());
        let record = normalize_event(
            RawEvent {
                listing: entry,
                detail: detail("General", "€12", "€12"),
            },
            day(16),
        );
        assert_eq!(record.starting_time, MISSING);
        assert_eq!(record.finishing_time, MISSING);
    }

    #[test]
    fn missing_finish_keeps_starting_time() {
        let mut entry = listing();
        entry.raw_date = Some("Fri, 18 Oct 2024 | 23:30".into());
        let record = normalize_event(
            RawEvent {
                listing: entry,
                detail: detail("General", "€12", "€12"),
            },
            day(16),
        );
        assert_eq!(record.starting_time, "2024-10-18 23:30:00");
        assert_eq!(record.finishing_time, MISSING);
        assert!(crate::store::schema::validate(&record).is_ok());
    }
}
