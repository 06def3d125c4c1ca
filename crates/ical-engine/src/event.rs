//! Output events -- occurrences made concrete for the caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{EventRecord, EventSpan};
use crate::error::Result;
use crate::filter::Occurrence;
use crate::timezone::ZoneResolver;

/// A single event instance inside the requested interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// The record UID, suffixed with the start time for repeats of a series.
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    /// Empty when the event has no DESCRIPTION.
    pub description: String,
    pub location: Option<String>,
    pub all_day: bool,
}

/// Per-record data shared by all of its occurrences.
#[derive(Debug, Clone)]
pub struct EventTemplate<'a> {
    record: &'a EventRecord,
    length: Duration,
    first_start: Option<DateTime<Utc>>,
}

impl<'a> EventTemplate<'a> {
    /// Resolve the record's DTSTART and DTEND/DURATION once.
    ///
    /// All-day events without an end last one day; timed events without one
    /// last zero. Negative lengths are clamped to zero.
    ///
    /// # Errors
    /// Returns `ReadError::InvalidPropertyValue` when a TZID cannot be resolved.
    pub fn new(record: &'a EventRecord, resolver: &ZoneResolver<'_>) -> Result<Self> {
        let first_start = resolver.resolve(&record.start)?;
        let length = match &record.span {
            Some(EventSpan::Duration(d)) => *d,
            Some(EventSpan::End(end)) => match (first_start, resolver.resolve(end)?) {
                (Some(start), Some(end)) => end - start,
                _ => Duration::zero(),
            },
            None if record.is_all_day() => Duration::days(1),
            None => Duration::zero(),
        };

        Ok(EventTemplate {
            record,
            length: length.max(Duration::zero()),
            first_start,
        })
    }

    /// Build the output event for one occurrence.
    pub fn assemble(&self, occurrence: &Occurrence<'_>) -> Event {
        let record = self.record;
        let id = if record.is_recurring() && Some(occurrence.start) != self.first_start {
            format!("{}_{}", record.uid, occurrence.start.to_rfc3339())
        } else {
            record.uid.clone()
        };

        Event {
            id,
            start: occurrence.start,
            end: occurrence.start + self.length,
            title: record.title.clone(),
            description: record.description.clone().unwrap_or_default(),
            location: record.location.clone(),
            all_day: record.is_all_day(),
        }
    }
}
