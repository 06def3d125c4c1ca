//! Reader configuration: per-event error policy and timezone choices.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;

/// What to do with an event whose properties fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidEventPolicy {
    /// Skip and report invalid events. The read only fails when the document
    /// holds a single event and its DTSTART is invalid.
    #[default]
    Lenient,
    /// Always skip invalid events; never fail the read because of them.
    Skip,
    /// Fail the whole read on the first invalid event.
    Strict,
}

/// Which timezone to use for values that carry none of their own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZonePolicy {
    #[default]
    Utc,
    /// The timezone the query interval was given in.
    Query,
    /// The calendar's `X-WR-TIMEZONE`, or UTC when the calendar has none.
    Calendar,
    /// A fixed IANA timezone, e.g. `Europe/Berlin`.
    Named(String),
}

/// Configuration for [`CalendarReader`](crate::CalendarReader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub invalid_events: InvalidEventPolicy,
    /// Zone for DATE-TIME values with neither `Z` nor TZID.
    pub floating_zone: ZonePolicy,
    /// Zone for DATE values (all-day events).
    pub all_day_zone: ZonePolicy,
    /// Time of day at which all-day events start.
    pub all_day_start: NaiveTime,
    pub dst_gap: DstPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            invalid_events: InvalidEventPolicy::default(),
            floating_zone: ZonePolicy::Query,
            all_day_zone: ZonePolicy::Utc,
            all_day_start: NaiveTime::MIN,
            dst_gap: DstPolicy::default(),
        }
    }
}
