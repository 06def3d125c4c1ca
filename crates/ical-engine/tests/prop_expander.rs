//! Property-based tests for recurrence expansion using proptest.
//!
//! These tests verify invariants that should hold for *any* valid rule, not
//! just the examples in `expander_tests.rs` and `rfc5545_vectors.rs`. The
//! `rrule` crate serves as an independent oracle for rules where both agree
//! on RFC 5545 semantics.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc, Weekday};
use proptest::prelude::*;
use rrule::RRuleSet;

use ical_engine::timezone::ZoneResolver;
use ical_engine::{calendar_events, expand, CalendarDocument, Interval, ReaderConfig};

// ---------------------------------------------------------------------------
// Strategies: generate valid rule components
// ---------------------------------------------------------------------------

fn arb_freq() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("DAILY".to_string()),
        Just("WEEKLY".to_string()),
        Just("MONTHLY".to_string()),
        Just("YEARLY".to_string()),
    ]
}

fn arb_interval() -> impl Strategy<Value = u32> {
    1u32..=4
}

fn arb_count() -> impl Strategy<Value = u32> {
    1u32..=30
}

fn arb_timezone() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("UTC".to_string()),
        Just("America/New_York".to_string()),
        Just("Europe/London".to_string()),
        Just("Asia/Tokyo".to_string()),
    ]
}

/// A DTSTART in 2025-2027 during daytime hours, so it never lands in a DST
/// gap or overlap. Day is capped at 28 to keep every month valid.
fn arb_dtstart() -> impl Strategy<Value = NaiveDateTime> {
    (2025i32..=2027, 1u32..=12, 1u32..=28, 9u32..=17, 0u32..=59).prop_map(|(y, m, d, h, min)| {
        chrono::NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .unwrap()
    })
}

fn arb_weekdays() -> impl Strategy<Value = Vec<Weekday>> {
    proptest::sample::subsequence(
        vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ],
        0..=4,
    )
}

/// Extra BYxxx parts, including ones that may never match.
fn arb_by_parts() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just(";BYDAY=MO,WE,FR".to_string()),
        Just(";BYMONTHDAY=1,15,-1".to_string()),
        Just(";BYMONTH=2,6,11".to_string()),
        Just(";BYHOUR=8,20;BYMINUTE=0,30".to_string()),
        Just(";BYMONTHDAY=31".to_string()),
        Just(";BYMONTH=2;BYMONTHDAY=29".to_string()),
    ]
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ical(t: NaiveDateTime) -> String {
    t.format("%Y%m%dT%H%M%S").to_string()
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn calendar(tz: &str, dtstart: NaiveDateTime, rule: &str, extra: &str) -> CalendarDocument {
    let ics = format!(
        "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:prop\r\nSUMMARY:Prop\r\n\
         DTSTART;TZID={tz}:{}\r\nRRULE:{rule}\r\n{extra}END:VEVENT\r\nEND:VCALENDAR\r\n",
        ical(dtstart)
    );
    CalendarDocument::parse(ics.as_bytes()).unwrap()
}

fn expand_doc(doc: &CalendarDocument, bound: Option<DateTime<Utc>>) -> Vec<DateTime<Utc>> {
    assert!(doc.skipped.is_empty(), "skipped: {:?}", doc.skipped);
    let resolver = ZoneResolver::new(&doc.timezones, None, None, &ReaderConfig::default()).unwrap();
    expand(&doc.events[0], &resolver, bound).unwrap().collect()
}

fn oracle(tz: &str, dtstart: NaiveDateTime, rule: &str) -> Vec<DateTime<Utc>> {
    let text = format!("DTSTART;TZID={}:{}\nRRULE:{}", tz, ical(dtstart), rule);
    let set: RRuleSet = text.parse().unwrap();
    set.all(500)
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&Utc))
        .collect()
}

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Property 1: Occurrences are strictly increasing
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn occurrences_strictly_increase(
        freq in arb_freq(),
        interval in arb_interval(),
        by in arb_by_parts(),
        dtstart in arb_dtstart(),
        tz in arb_timezone(),
    ) {
        let rule = format!("FREQ={};INTERVAL={}{}", freq, interval, by);
        let doc = calendar(&tz, dtstart, &rule, "");
        let bound = dtstart.and_utc() + Duration::days(3 * 365);

        let result = expand_doc(&doc, Some(bound));

        prop_assert!(!result.is_empty(), "DTSTART is always an instance");
        for pair in result.windows(2) {
            prop_assert!(pair[0] < pair[1], "not increasing: {:?} >= {:?}", pair[0], pair[1]);
        }
        prop_assert!(result.iter().all(|t| *t <= bound));
    }
}

// ---------------------------------------------------------------------------
// Property 2: COUNT respected, exactly N instances for rules without BYxxx
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn count_respected(
        freq in arb_freq(),
        interval in arb_interval(),
        count in arb_count(),
        dtstart in arb_dtstart(),
        tz in arb_timezone(),
    ) {
        let rule = format!("FREQ={};INTERVAL={};COUNT={}", freq, interval, count);
        let doc = calendar(&tz, dtstart, &rule, "");

        let result = expand_doc(&doc, None);

        prop_assert_eq!(result.len(), count as usize);
    }
}

// ---------------------------------------------------------------------------
// Property 3: Interval filtering keeps exactly the instances inside [after, before)
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn filtering_matches_the_expansion(
        freq in arb_freq(),
        count in arb_count(),
        dtstart in arb_dtstart(),
        offset_days in -30i64..400,
        length_days in 0i64..200,
    ) {
        let rule = format!("FREQ={};COUNT={}", freq, count);
        let doc = calendar("UTC", dtstart, &rule, "");
        let after = dtstart.and_utc() + Duration::days(offset_days);
        let before = after + Duration::days(length_days);
        let interval = Interval::utc(after, before).unwrap();

        let events = calendar_events(&doc, &interval, &ReaderConfig::default()).unwrap().events;
        let expected: Vec<_> = expand_doc(&doc, None)
            .into_iter()
            .filter(|t| after <= *t && *t < before)
            .collect();

        let starts: Vec<_> = events.iter().map(|e| e.start).collect();
        prop_assert_eq!(starts, expected);
    }
}

// ---------------------------------------------------------------------------
// Property 4: EXDATE removes exactly the excluded instance
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn exdate_removes_one_instance(
        freq in arb_freq(),
        count in 2u32..=30,
        dtstart in arb_dtstart(),
        pick in any::<prop::sample::Index>(),
    ) {
        let rule = format!("FREQ={};COUNT={}", freq, count);
        let full = expand_doc(&calendar("UTC", dtstart, &rule, ""), None);
        let excluded = full[pick.index(full.len())];
        let exdate = format!("EXDATE:{}Z\r\n", ical(excluded.naive_utc()));

        let result = expand_doc(&calendar("UTC", dtstart, &rule, &exdate), None);

        let expected: Vec<_> = full.into_iter().filter(|t| *t != excluded).collect();
        prop_assert_eq!(result, expected);
    }
}

// ---------------------------------------------------------------------------
// Property 5: Agreement with the rrule crate
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(config())]

    #[test]
    fn agrees_with_rrule_crate(
        freq in arb_freq(),
        interval in arb_interval(),
        count in arb_count(),
        dtstart in arb_dtstart(),
        tz in arb_timezone(),
        weekdays in arb_weekdays(),
    ) {
        let mut rule = format!("FREQ={};INTERVAL={};COUNT={}", freq, interval, count);
        if freq == "WEEKLY" && !weekdays.is_empty() {
            // DTSTART must match the rule, or the two disagree on whether it counts.
            let mut days = weekdays;
            if !days.contains(&dtstart.weekday()) {
                days.push(dtstart.weekday());
            }
            let codes: Vec<_> = days.into_iter().map(weekday_code).collect();
            rule.push_str(&format!(";BYDAY={}", codes.join(",")));
        }

        let ours = expand_doc(&calendar(&tz, dtstart, &rule, ""), None);
        let theirs = oracle(&tz, dtstart, &rule);

        prop_assert_eq!(ours, theirs, "rule {} from {} in {}", rule, dtstart, tz);
    }
}
