//! Tests for timezone resolution: embedded VTIMEZONE definitions, the IANA
//! fallback and the zone policies for floating and all-day values.

use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Omsk;
use chrono_tz::Tz;
use ical_engine::{
    calendar_events, CalendarDocument, CalendarEvents, DstPolicy, Interval, ReadError,
    ReaderConfig, ZonePolicy,
};

// ── Helpers ─────────────────────────────────────────────────────────────────

const US_EASTERN: &str = "BEGIN:VTIMEZONE
TZID:US-Eastern
BEGIN:STANDARD
DTSTART:20071104T020000
RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU
TZOFFSETFROM:-0400
TZOFFSETTO:-0500
END:STANDARD
BEGIN:DAYLIGHT
DTSTART:20070311T020000
RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU
TZOFFSETFROM:-0500
TZOFFSETTO:-0400
END:DAYLIGHT
END:VTIMEZONE";

/// The shape Outlook and Exchange export: both observances start in 1601.
const OUTLOOK_EASTERN: &str = "BEGIN:VTIMEZONE
TZID:Eastern Standard Time
BEGIN:STANDARD
DTSTART:16010101T020000
TZOFFSETFROM:-0400
TZOFFSETTO:-0500
RRULE:FREQ=YEARLY;INTERVAL=1;BYDAY=1SU;BYMONTH=11
END:STANDARD
BEGIN:DAYLIGHT
DTSTART:16010101T020000
TZOFFSETFROM:-0500
TZOFFSETTO:-0400
RRULE:FREQ=YEARLY;INTERVAL=1;BYDAY=2SU;BYMONTH=3
END:DAYLIGHT
END:VTIMEZONE";

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn parse(body: &str) -> CalendarDocument {
    let mut ics = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n");
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        ics.push_str(line);
        ics.push_str("\r\n");
    }
    ics.push_str("END:VCALENDAR\r\n");
    CalendarDocument::parse(ics.as_bytes()).unwrap()
}

fn events_in(
    body: &str,
    interval: &Interval,
    config: &ReaderConfig,
) -> Result<CalendarEvents, ReadError> {
    calendar_events(&parse(body), interval, config)
}

fn year_2026() -> Interval {
    Interval::utc(utc("2026-01-01T00:00:00Z"), utc("2027-01-01T00:00:00Z")).unwrap()
}

fn with_gap(gap: DstPolicy) -> ReaderConfig {
    ReaderConfig {
        dst_gap: gap,
        ..ReaderConfig::default()
    }
}

fn first_start(body: &str, config: &ReaderConfig) -> DateTime<Utc> {
    let result = events_in(body, &year_2026(), config).unwrap();
    assert_eq!(result.skipped, 0);
    result.events[0].start
}

// ── Embedded definitions ────────────────────────────────────────────────────

#[test]
fn vtimezone_offsets_follow_its_rules() {
    let doc = parse(US_EASTERN);
    let def = doc.timezones.get("US-Eastern").unwrap();

    let winter = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap().and_hms_opt(10, 0, 0).unwrap();
    let summer = NaiveDate::from_ymd_opt(2026, 7, 15).unwrap().and_hms_opt(10, 0, 0).unwrap();

    assert_eq!(def.offset_at(winter), FixedOffset::west_opt(5 * 3600).unwrap());
    assert_eq!(def.offset_at(summer), FixedOffset::west_opt(4 * 3600).unwrap());
}

#[test]
fn events_use_the_embedded_definition() {
    let body = format!(
        "{US_EASTERN}
         BEGIN:VEVENT
         UID:summer
         DTSTART;TZID=US-Eastern:20260715T100000
         SUMMARY:Summer
         END:VEVENT"
    );

    assert_eq!(
        first_start(&body, &ReaderConfig::default()),
        utc("2026-07-15T14:00:00Z")
    );
}

#[test]
fn embedded_definition_wins_over_iana_name() {
    // A calendar may redefine a well-known TZID
    let body = "BEGIN:VTIMEZONE
         TZID:Europe/Berlin
         BEGIN:STANDARD
         DTSTART:19700101T000000
         TZOFFSETFROM:+0300
         TZOFFSETTO:+0300
         END:STANDARD
         END:VTIMEZONE
         BEGIN:VEVENT
         UID:x
         DTSTART;TZID=Europe/Berlin:20260115T100000
         SUMMARY:Redefined
         END:VEVENT";

    assert_eq!(
        first_start(body, &ReaderConfig::default()),
        utc("2026-01-15T07:00:00Z")
    );
}

#[test]
fn embedded_gap_time_shifts_forward() {
    // 2026-03-08 02:30 does not exist in US Eastern time
    let body = format!(
        "{US_EASTERN}
         BEGIN:VEVENT
         UID:gap
         DTSTART;TZID=US-Eastern:20260308T023000
         SUMMARY:Gap
         END:VEVENT"
    );
    let iana = body.replace("TZID=US-Eastern", "TZID=America/New_York");
    let config = with_gap(DstPolicy::ShiftForward);

    assert_eq!(first_start(&body, &config), utc("2026-03-08T07:30:00Z"));
    assert_eq!(first_start(&iana, &config), utc("2026-03-08T07:30:00Z"));
}

#[test]
fn embedded_gap_time_is_dropped_under_skip() {
    let body = format!(
        "{US_EASTERN}
         BEGIN:VEVENT
         UID:gap
         DTSTART;TZID=US-Eastern:20260308T023000
         RRULE:FREQ=DAILY;COUNT=2
         SUMMARY:Gap
         END:VEVENT"
    );
    let iana = body.replace("TZID=US-Eastern", "TZID=America/New_York");
    let config = with_gap(DstPolicy::Skip);

    let embedded = events_in(&body, &year_2026(), &config).unwrap();
    let starts: Vec<_> = embedded.events.iter().map(|e| e.start).collect();
    assert_eq!(starts, [utc("2026-03-09T06:30:00Z")]);

    let named = events_in(&iana, &year_2026(), &config).unwrap();
    assert_eq!(named.events, embedded.events);
}

#[test]
fn embedded_times_around_the_gap_are_unaffected() {
    let doc = parse(US_EASTERN);
    let def = doc.timezones.get("US-Eastern").unwrap();
    let at = |h, m| NaiveDate::from_ymd_opt(2026, 3, 8).unwrap().and_hms_opt(h, m, 0).unwrap();

    assert_eq!(def.to_utc(at(1, 59), DstPolicy::Skip), Some(utc("2026-03-08T06:59:00Z")));
    assert_eq!(def.to_utc(at(2, 0), DstPolicy::Skip), None);
    assert_eq!(def.to_utc(at(3, 0), DstPolicy::Skip), Some(utc("2026-03-08T07:00:00Z")));
}

#[test]
fn embedded_repeated_hour_takes_the_earlier_instant() {
    let doc = parse(US_EASTERN);
    let def = doc.timezones.get("US-Eastern").unwrap();
    let repeated = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap().and_hms_opt(1, 30, 0).unwrap();

    assert_eq!(
        def.to_utc(repeated, DstPolicy::ShiftForward),
        Some(utc("2026-11-01T05:30:00Z"))
    );
}

#[test]
fn outlook_definition_starting_in_1601() {
    let doc = parse(OUTLOOK_EASTERN);
    let def = doc.timezones.get("Eastern Standard Time").unwrap();

    let winter = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap().and_hms_opt(10, 0, 0).unwrap();
    let summer = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap().and_hms_opt(10, 0, 0).unwrap();

    assert_eq!(def.offset_at(winter), FixedOffset::west_opt(5 * 3600).unwrap());
    assert_eq!(def.offset_at(summer), FixedOffset::west_opt(4 * 3600).unwrap());
}

#[test]
fn long_daily_series_in_outlook_zone_reads_quickly() {
    let body = format!(
        "{OUTLOOK_EASTERN}
         BEGIN:VEVENT
         UID:standup
         DTSTART;TZID=Eastern Standard Time:20150105T090000
         DTEND;TZID=Eastern Standard Time:20150105T091500
         RRULE:FREQ=DAILY
         SUMMARY:Standup
         END:VEVENT"
    );
    let window = Interval::utc(utc("2025-06-02T00:00:00Z"), utc("2025-06-03T00:00:00Z")).unwrap();

    let started = Instant::now();
    let result = events_in(&body, &window, &ReaderConfig::default()).unwrap();
    let elapsed = started.elapsed();

    let starts: Vec<_> = result.events.iter().map(|e| e.start).collect();
    assert_eq!(starts, [utc("2025-06-02T13:00:00Z")]);
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}

#[test]
fn iana_names_resolve_without_vtimezone() {
    let body = "BEGIN:VEVENT
         UID:x
         DTSTART;TZID=Europe/Berlin:20260115T100000
         SUMMARY:Berlin
         END:VEVENT";

    assert_eq!(
        first_start(body, &ReaderConfig::default()),
        utc("2026-01-15T09:00:00Z")
    );
}

#[test]
fn solidus_prefixed_tzid_is_accepted() {
    let body = "BEGIN:VEVENT
         UID:x
         DTSTART;TZID=/Europe/Berlin:20260115T100000
         SUMMARY:Berlin
         END:VEVENT";

    assert_eq!(
        first_start(body, &ReaderConfig::default()),
        utc("2026-01-15T09:00:00Z")
    );
}

// ── Zone policies ───────────────────────────────────────────────────────────

const FLOATING: &str = "BEGIN:VEVENT
    UID:floating
    DTSTART:20260115T100000
    SUMMARY:Floating
    END:VEVENT";

#[test]
fn floating_time_uses_the_query_zone_by_default() {
    let after: DateTime<Tz> = Omsk.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let before: DateTime<Tz> = Omsk.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
    let interval = Interval::new(after, before).unwrap();

    let result = events_in(FLOATING, &interval, &ReaderConfig::default()).unwrap();

    assert_eq!(result.events[0].start, utc("2026-01-15T04:00:00Z"));
}

#[test]
fn floating_time_in_a_utc_query_is_utc() {
    assert_eq!(
        first_start(FLOATING, &ReaderConfig::default()),
        utc("2026-01-15T10:00:00Z")
    );
}

#[test]
fn floating_time_in_a_named_zone() {
    let config = ReaderConfig {
        floating_zone: ZonePolicy::Named("Asia/Tokyo".to_string()),
        ..ReaderConfig::default()
    };

    assert_eq!(first_start(FLOATING, &config), utc("2026-01-15T01:00:00Z"));
}

#[test]
fn floating_time_in_the_calendar_zone() {
    let body = format!("X-WR-TIMEZONE:Europe/Berlin\n{FLOATING}");
    let config = ReaderConfig {
        floating_zone: ZonePolicy::Calendar,
        ..ReaderConfig::default()
    };

    assert_eq!(first_start(&body, &config), utc("2026-01-15T09:00:00Z"));
}

#[test]
fn calendar_zone_falls_back_to_utc() {
    let config = ReaderConfig {
        floating_zone: ZonePolicy::Calendar,
        ..ReaderConfig::default()
    };

    assert_eq!(first_start(FLOATING, &config), utc("2026-01-15T10:00:00Z"));
}

#[test]
fn unknown_named_zone_is_a_config_error() {
    let config = ReaderConfig {
        floating_zone: ZonePolicy::Named("Nowhere/Special".to_string()),
        ..ReaderConfig::default()
    };

    let err = events_in(FLOATING, &year_2026(), &config).unwrap_err();

    assert!(matches!(err, ReadError::Config(_)), "got {err:?}");
}

#[test]
fn all_day_zone_and_start_are_configurable() {
    let body = "BEGIN:VEVENT
         UID:allday
         DTSTART;VALUE=DATE:20260623
         SUMMARY:All day
         END:VEVENT";
    let config = ReaderConfig {
        all_day_zone: ZonePolicy::Named("Asia/Omsk".to_string()),
        all_day_start: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        ..ReaderConfig::default()
    };

    let result = events_in(body, &year_2026(), &config).unwrap();

    let event = &result.events[0];
    assert_eq!(event.start, utc("2026-06-23T03:00:00Z"));
    assert_eq!(event.end, utc("2026-06-24T03:00:00Z"));
    assert!(event.all_day);
}
