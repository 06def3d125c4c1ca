//! End-to-end reads: retrieve, parse, expand, filter and assemble.

use std::io::Read;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::{InvalidEventPolicy, ReaderConfig};
use crate::document::{CalendarDocument, EventRecord};
use crate::error::{ReadError, Result};
use crate::event::{Event, EventTemplate};
use crate::expander::expand;
use crate::filter::{filter, Interval};
use crate::source::{AnySource, SourceReader};
use crate::timezone::ZoneResolver;

/// Events of one calendar within an interval, plus the calendar's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CalendarEvents {
    pub name: Option<String>,
    pub description: Option<String>,
    pub timezone: Option<String>,
    /// Sorted by start time, then id.
    pub events: Vec<Event>,
    /// Number of events left out because they failed to parse or expand.
    pub skipped: usize,
}

/// Reads calendars from a [`SourceReader`] under a [`ReaderConfig`].
#[derive(Debug, Clone)]
pub struct CalendarReader<S = AnySource> {
    source: S,
    config: ReaderConfig,
}

impl CalendarReader<AnySource> {
    /// A reader for files and HTTP(S) URLs with the default configuration.
    ///
    /// # Errors
    /// Returns `ReadError::Config` if the HTTP client cannot be built.
    pub fn from_default_source() -> Result<Self> {
        Ok(CalendarReader::new(AnySource::new()?, ReaderConfig::default()))
    }
}

impl<S: SourceReader> CalendarReader<S> {
    pub fn new(source: S, config: ReaderConfig) -> Self {
        CalendarReader { source, config }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Read the calendar at `location` and return its events within `interval`.
    ///
    /// # Errors
    /// Returns `ReadError::RetrievalFailure` if the source cannot be read,
    /// `ReadError::MalformedDocument` for structural errors, and
    /// `ReadError::InvalidPropertyValue` when the configured
    /// [`InvalidEventPolicy`] turns an invalid event into a failure.
    pub fn read_calendar(&self, location: &str, interval: &Interval) -> Result<CalendarEvents> {
        tracing::info!(location, "reading calendar");

        let bytes = {
            let mut stream = self.source.open(location)?;
            let mut bytes = Vec::new();
            stream
                .read_to_end(&mut bytes)
                .map_err(|e| ReadError::retrieval(location, e))?;
            bytes
        };

        let doc = CalendarDocument::parse(&bytes)?;
        calendar_events(&doc, interval, &self.config)
    }

    /// Like [`read_calendar`](Self::read_calendar), returning only the events.
    ///
    /// # Errors
    /// See [`read_calendar`](Self::read_calendar).
    pub fn read_events(&self, location: &str, interval: &Interval) -> Result<Vec<Event>> {
        Ok(self.read_calendar(location, interval)?.events)
    }
}

/// Read the events of the calendar at `location` between `after` (inclusive)
/// and `before` (exclusive), with the default source and configuration.
///
/// # Errors
/// See [`CalendarReader::read_calendar`]; also `ReadError::InvalidInterval`.
pub fn read_events(location: &str, after: DateTime<Tz>, before: DateTime<Tz>) -> Result<Vec<Event>> {
    let interval = Interval::new(after, before)?;
    CalendarReader::from_default_source()?.read_events(location, &interval)
}

/// Expand and filter an already parsed document.
///
/// # Errors
/// Per-event errors are handled by `config.invalid_events`; see
/// [`InvalidEventPolicy`]. `ReadError::Config` for an unknown configured zone.
pub fn calendar_events(
    doc: &CalendarDocument,
    interval: &Interval,
    config: &ReaderConfig,
) -> Result<CalendarEvents> {
    check_skipped(doc, config.invalid_events)?;

    let mut out = CalendarEvents {
        name: doc.name.clone(),
        description: doc.description.clone(),
        timezone: doc.timezone.clone(),
        events: Vec::new(),
        skipped: doc.skipped.len(),
    };
    if interval.is_empty() {
        return Ok(out);
    }

    let resolver = ZoneResolver::new(&doc.timezones, doc.timezone.as_deref(), interval.zone(), config)?;

    for record in &doc.events {
        match record_events(record, &resolver, interval) {
            Ok(events) => out.events.extend(events),
            Err(err @ ReadError::InvalidPropertyValue { .. })
                if config.invalid_events != InvalidEventPolicy::Strict =>
            {
                tracing::warn!(uid = %record.uid, line = record.line, error = %err, "skipping event");
                out.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    out.events
        .sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
    Ok(out)
}

/// The events of one record inside the interval.
fn record_events(
    record: &EventRecord,
    resolver: &ZoneResolver<'_>,
    interval: &Interval,
) -> Result<Vec<Event>> {
    let template = EventTemplate::new(record, resolver)?;
    let occurrences = expand(record, resolver, Some(interval.before()))?;
    Ok(filter(record, occurrences, interval)
        .map(|occurrence| template.assemble(&occurrence))
        .collect())
}

/// Apply the invalid-event policy to the events the parser skipped.
fn check_skipped(doc: &CalendarDocument, policy: InvalidEventPolicy) -> Result<()> {
    let Some(first) = doc.skipped.first() else {
        return Ok(());
    };
    let fatal = match policy {
        InvalidEventPolicy::Strict => true,
        InvalidEventPolicy::Skip => false,
        InvalidEventPolicy::Lenient => {
            doc.event_blocks() == 1 && first.error.property() == Some("DTSTART")
        }
    };
    if !fatal {
        return Ok(());
    }

    Err(clone_error(&first.error))
}

/// `ReadError` is not `Clone` because of boxed sources; per-event errors never carry one.
fn clone_error(err: &ReadError) -> ReadError {
    match err {
        ReadError::InvalidPropertyValue {
            property,
            value,
            reason,
        } => ReadError::InvalidPropertyValue {
            property: property.clone(),
            value: value.clone(),
            reason: reason.clone(),
        },
        other => ReadError::invalid_because("VEVENT", "", other.to_string()),
    }
}
