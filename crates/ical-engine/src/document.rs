//! Calendar documents -- turns the component tree into typed event records.

use chrono::Duration;

use crate::component::{nest, Component};
use crate::error::{ReadError, Result};
use crate::lexer::{tokenize, unescape_text, ContentLine};
use crate::rule::RecurrenceRule;
use crate::timezone::{TimezoneDef, TimezoneTable};
use crate::value::{parse_duration, parse_time_list, parse_time_property, CalTime, TimeBasis};

/// How long an event lasts, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSpan {
    End(CalTime),
    Duration(Duration),
}

/// One VEVENT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// UID; repeated by recurrence overrides of the same series.
    pub uid: String,
    pub start: CalTime,
    pub span: Option<EventSpan>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub rule: Option<RecurrenceRule>,
    pub rdates: Vec<CalTime>,
    pub exdates: Vec<CalTime>,
    /// Set on overrides of a single instance of a recurring series.
    pub recurrence_id: Option<CalTime>,
    /// Line of the `BEGIN:VEVENT` marker.
    pub line: usize,
}

impl EventRecord {
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    pub fn is_recurring(&self) -> bool {
        self.rule.is_some() || !self.rdates.is_empty()
    }

    /// Parse a `VEVENT` component, validating TZIDs against `timezones`.
    ///
    /// DTSTART is checked first, then SUMMARY, then the optional properties.
    ///
    /// # Errors
    /// Returns `ReadError::InvalidPropertyValue` for a missing DTSTART or SUMMARY,
    /// any value that does not parse under its type, an unknown TZID, or an
    /// event carrying both DTEND and DURATION.
    pub fn from_component(c: &Component, timezones: &TimezoneTable) -> Result<Self> {
        let time = |prop: &ContentLine| -> Result<CalTime> {
            let value = parse_time_property(prop)?;
            check_zone(prop, &value, timezones)?;
            Ok(value)
        };
        let times = |name: &str| -> Result<Vec<CalTime>> {
            let mut out = Vec::new();
            for prop in c.properties_named(name) {
                for value in parse_time_list(prop)? {
                    check_zone(prop, &value, timezones)?;
                    out.push(value);
                }
            }
            Ok(out)
        };
        let text = |name: &str| c.property(name).map(|p| unescape_text(&p.value));

        let start = time(c.property("DTSTART").ok_or_else(|| ReadError::missing("DTSTART"))?)?;
        let title = text("SUMMARY").ok_or_else(|| ReadError::missing("SUMMARY"))?;

        let span = match (c.property("DTEND"), c.property("DURATION")) {
            (Some(end), Some(_)) => {
                return Err(ReadError::invalid_because(
                    "DTEND",
                    &end.value,
                    "DTEND and DURATION are mutually exclusive",
                ))
            }
            (Some(end), None) => Some(EventSpan::End(time(end)?)),
            (None, Some(duration)) => Some(EventSpan::Duration(
                parse_duration(&duration.value)
                    .ok_or_else(|| ReadError::invalid("DURATION", &duration.value))?,
            )),
            (None, None) => None,
        };

        let rule = c
            .property("RRULE")
            .map(|p| RecurrenceRule::parse(&p.value))
            .transpose()?;
        let recurrence_id = c.property("RECURRENCE-ID").map(time).transpose()?;

        Ok(EventRecord {
            uid: c
                .property("UID")
                .map(|p| p.value.trim().to_string())
                .unwrap_or_default(),
            start,
            span,
            title,
            description: text("DESCRIPTION"),
            location: text("LOCATION").filter(|l| !l.trim().is_empty()),
            rule,
            rdates: times("RDATE")?,
            exdates: times("EXDATE")?,
            recurrence_id,
            line: c.line,
        })
    }
}

fn check_zone(prop: &ContentLine, value: &CalTime, timezones: &TimezoneTable) -> Result<()> {
    match &value.basis {
        TimeBasis::Zone(tzid) if timezones.lookup(tzid).is_none() => Err(
            ReadError::invalid_because(&prop.name, &prop.value, format!("unknown TZID {tzid:?}")),
        ),
        _ => Ok(()),
    }
}

/// An event that failed to parse and was left out of the document.
#[derive(Debug)]
pub struct SkippedEvent {
    pub uid: Option<String>,
    /// Line of the `BEGIN:VEVENT` marker.
    pub line: usize,
    pub error: ReadError,
}

/// The parse result of one calendar source.
#[derive(Debug, Default)]
pub struct CalendarDocument {
    /// `X-WR-CALNAME`
    pub name: Option<String>,
    /// `X-WR-CALDESC`
    pub description: Option<String>,
    /// `X-WR-TIMEZONE`
    pub timezone: Option<String>,
    pub timezones: TimezoneTable,
    pub events: Vec<EventRecord>,
    pub skipped: Vec<SkippedEvent>,
}

impl CalendarDocument {
    /// Parse raw iCalendar bytes.
    ///
    /// Structural errors abort the parse. Invalid events do not: they are
    /// collected in [`CalendarDocument::skipped`] and the policy on what to do
    /// with them is left to the caller.
    ///
    /// # Errors
    /// Returns `ReadError::MalformedDocument` for unbalanced components or
    /// unsplittable lines.
    pub fn parse(input: &[u8]) -> Result<Self> {
        let roots = nest(tokenize(input)?)?;
        let mut doc = CalendarDocument::default();

        // Timezones first: events may reference a VTIMEZONE defined after them.
        for calendar in &roots {
            for vtimezone in calendar.children_named("VTIMEZONE") {
                match TimezoneDef::from_component(vtimezone) {
                    Ok(def) => doc.timezones.insert(def),
                    Err(err) => {
                        tracing::warn!(line = vtimezone.line, error = %err, "ignoring invalid VTIMEZONE")
                    }
                }
            }
        }

        for root in &roots {
            if root.name == "VEVENT" {
                doc.add_event(root);
                continue;
            }
            let text = |name: &str| root.property(name).map(|p| unescape_text(&p.value));
            doc.name = doc.name.take().or_else(|| text("X-WR-CALNAME"));
            doc.description = doc.description.take().or_else(|| text("X-WR-CALDESC"));
            doc.timezone = doc
                .timezone
                .take()
                .or_else(|| text("X-WR-TIMEZONE").map(|tz| tz.trim().to_string()));

            for vevent in root.children_named("VEVENT") {
                doc.add_event(vevent);
            }
        }

        doc.apply_overrides();

        tracing::debug!(
            events = doc.events.len(),
            skipped = doc.skipped.len(),
            timezones = doc.timezones.len(),
            "parsed calendar document"
        );
        Ok(doc)
    }

    fn add_event(&mut self, vevent: &Component) {
        match EventRecord::from_component(vevent, &self.timezones) {
            Ok(record) => self.events.push(record),
            Err(error) => {
                let uid = vevent.property("UID").map(|p| p.value.trim().to_string());
                tracing::warn!(
                    uid = uid.as_deref().unwrap_or(""),
                    line = vevent.line,
                    %error,
                    "skipping invalid event"
                );
                self.skipped.push(SkippedEvent {
                    uid,
                    line: vevent.line,
                    error,
                });
            }
        }
    }

    /// Exclude overridden instances from their master series: an override's
    /// RECURRENCE-ID acts as an EXDATE on the record with the same UID.
    fn apply_overrides(&mut self) {
        let overrides: Vec<(String, CalTime)> = self
            .events
            .iter()
            .filter_map(|e| e.recurrence_id.clone().map(|id| (e.uid.clone(), id)))
            .collect();

        for (uid, id) in overrides {
            if let Some(master) = self
                .events
                .iter_mut()
                .find(|e| e.uid == uid && e.recurrence_id.is_none() && e.is_recurring())
            {
                master.exdates.push(id);
            }
        }
    }

    /// Number of VEVENT blocks seen, valid or not.
    pub fn event_blocks(&self) -> usize {
        self.events.len() + self.skipped.len()
    }
}
