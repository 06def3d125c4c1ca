//! Timezone resolution -- calendar-embedded VTIMEZONE definitions plus the IANA database.
//!
//! A [`TimezoneTable`] is built once per document. A [`ZoneResolver`] borrows it
//! together with the reader configuration and turns [`CalTime`] values into UTC
//! instants. Nothing here is global: two documents never share a table.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::component::Component;
use crate::config::{ReaderConfig, ZonePolicy};
use crate::dst::{local_to_utc, DstPolicy};
use crate::error::{ReadError, Result};
use crate::expander::RuleIter;
use crate::rule::{RecurrenceRule, RuleEnd};
use crate::value::{parse_date_time, parse_time_list, parse_utc_offset, CalTime, TimeBasis};

/// One STANDARD or DAYLIGHT block of a VTIMEZONE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observance {
    /// First onset, as local time under `offset_from`.
    pub onset: NaiveDateTime,
    pub offset_from: FixedOffset,
    pub offset_to: FixedOffset,
    pub rule: Option<RecurrenceRule>,
    pub rdates: Vec<NaiveDateTime>,
}

impl Observance {
    fn from_component(c: &Component) -> Result<Self> {
        let prop = |name: &str| c.property(name).ok_or_else(|| ReadError::missing(name));

        let dtstart = prop("DTSTART")?;
        let onset = parse_date_time(&dtstart.value, None)
            .ok_or_else(|| ReadError::invalid("DTSTART", &dtstart.value))?
            .local;
        let offset = |name: &str| -> Result<FixedOffset> {
            let p = prop(name)?;
            parse_utc_offset(&p.value).ok_or_else(|| ReadError::invalid(name, &p.value))
        };
        let rule = c
            .property("RRULE")
            .map(|p| RecurrenceRule::parse(&p.value))
            .transpose()?;
        let rdates = c
            .properties_named("RDATE")
            .map(parse_time_list)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .map(|t| t.local)
            .collect();

        Ok(Observance {
            onset,
            offset_from: offset("TZOFFSETFROM")?,
            offset_to: offset("TZOFFSETTO")?,
            rule,
            rdates,
        })
    }

    /// Latest onset at or before `local`.
    fn last_onset(&self, local: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.onset > local {
            return None;
        }
        let from_rule = self.rule.as_ref().and_then(|rule| {
            let until = match &rule.end {
                RuleEnd::Until(until) => until.local,
                _ => NaiveDateTime::MAX,
            };
            self.last_rule_onset(rule, local.min(until))
        });
        let from_rdates = self.rdates.iter().copied().filter(|t| *t <= local).max();

        [Some(self.onset), from_rule, from_rdates]
            .into_iter()
            .flatten()
            .max()
    }

    /// Latest rule instance at or before `limit`.
    ///
    /// Observances often start centuries back (Outlook writes `16010101T020000`),
    /// so the walk resumes a few periods before `limit` and only widens the
    /// look-back when those periods hold no instance.
    fn last_rule_onset(&self, rule: &RecurrenceRule, limit: NaiveDateTime) -> Option<NaiveDateTime> {
        let latest = |iter: RuleIter<'_>| iter.take_while(|t| *t <= limit).last();
        if matches!(rule.end, RuleEnd::Count(_)) {
            return latest(RuleIter::new(rule, self.onset, Some(limit)));
        }

        let current = RuleIter::period_index(rule, self.onset, limit);
        let mut back = 1;
        while current - back > 0 {
            let found = latest(RuleIter::resume(rule, self.onset, Some(limit), current - back));
            if found.is_some() {
                return found;
            }
            back = back.saturating_mul(2);
        }
        latest(RuleIter::new(rule, self.onset, Some(limit)))
    }

    /// Clocks move forward when this observance starts.
    fn is_forward(&self) -> bool {
        self.offset_to.local_minus_utc() > self.offset_from.local_minus_utc()
    }
}

/// A VTIMEZONE definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneDef {
    pub tzid: String,
    pub observances: Vec<Observance>,
}

impl TimezoneDef {
    /// Build a definition from a `VTIMEZONE` component.
    ///
    /// # Errors
    /// Returns `ReadError::InvalidPropertyValue` if TZID is missing or an
    /// observance lacks DTSTART / TZOFFSETFROM / TZOFFSETTO.
    pub fn from_component(c: &Component) -> Result<Self> {
        let tzid = c
            .property("TZID")
            .map(|p| p.value.trim().to_string())
            .ok_or_else(|| ReadError::missing("TZID"))?;
        let observances = c
            .children
            .iter()
            .filter(|child| child.name == "STANDARD" || child.name == "DAYLIGHT")
            .map(Observance::from_component)
            .collect::<Result<Vec<_>>>()?;
        if observances.is_empty() {
            return Err(ReadError::invalid_because("TZID", &tzid, "no STANDARD or DAYLIGHT block"));
        }
        Ok(TimezoneDef { tzid, observances })
    }

    /// The observance in effect at the given local time, with its latest onset.
    fn observance_at(&self, local: NaiveDateTime) -> Option<(NaiveDateTime, &Observance)> {
        self.observances
            .iter()
            .filter_map(|o| o.last_onset(local).map(|onset| (onset, o)))
            .max_by_key(|(onset, _)| *onset)
    }

    /// UTC offset in effect at the given local time.
    ///
    /// Times in the repeated hour get the offset of the earlier instant.
    pub fn offset_at(&self, local: NaiveDateTime) -> FixedOffset {
        match self.observance_at(local) {
            Some((_, o)) => o.offset_to,
            None => self.initial_offset(),
        }
    }

    /// Before the first onset the earliest observance's "from" offset applies.
    fn initial_offset(&self) -> FixedOffset {
        self.observances
            .iter()
            .min_by_key(|o| o.onset)
            .map_or_else(|| Utc.fix(), |o| o.offset_from)
    }

    /// Map a wall-clock reading to UTC, applying `gap` to times skipped by a
    /// forward transition.
    ///
    /// Returns `None` only for gap times under [`DstPolicy::Skip`].
    pub fn to_utc(&self, local: NaiveDateTime, gap: DstPolicy) -> Option<DateTime<Utc>> {
        let offset = match self.observance_at(local) {
            Some((onset, o)) if o.is_forward() && local < onset + gap_length(o) => match gap {
                DstPolicy::Skip => return None,
                DstPolicy::ShiftForward => o.offset_from,
            },
            Some((_, o)) => o.offset_to,
            None => self.initial_offset(),
        };
        let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
        Some(Utc.from_utc_datetime(&utc))
    }
}

fn gap_length(o: &Observance) -> Duration {
    Duration::seconds(i64::from(o.offset_to.local_minus_utc() - o.offset_from.local_minus_utc()))
}

/// Mapping from TZID to embedded definition, scoped to one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimezoneTable {
    defs: HashMap<String, TimezoneDef>,
}

impl TimezoneTable {
    pub fn insert(&mut self, def: TimezoneDef) {
        self.defs.insert(def.tzid.clone(), def);
    }

    pub fn get(&self, tzid: &str) -> Option<&TimezoneDef> {
        self.defs.get(tzid)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Find a zone by TZID: embedded definitions first, then the IANA database.
    pub fn lookup(&self, tzid: &str) -> Option<Zone<'_>> {
        let tzid = tzid.trim();
        if let Some(def) = self.defs.get(tzid) {
            return Some(Zone::Defined(def));
        }
        // Globally unique TZIDs are prefixed with a solidus.
        let name = tzid.strip_prefix('/').unwrap_or(tzid);
        if let Some(def) = self.defs.get(name) {
            return Some(Zone::Defined(def));
        }
        name.parse::<Tz>().ok().map(Zone::Iana)
    }
}

/// A resolved timezone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone<'a> {
    Utc,
    Iana(Tz),
    Defined(&'a TimezoneDef),
}

impl Zone<'_> {
    /// Map a wall-clock reading in this zone to UTC.
    pub fn to_utc(&self, local: NaiveDateTime, gap: DstPolicy) -> Option<DateTime<Utc>> {
        match self {
            Zone::Utc => Some(Utc.from_utc_datetime(&local)),
            Zone::Iana(tz) => local_to_utc(tz, local, gap),
            Zone::Defined(def) => def.to_utc(local, gap),
        }
    }
}

/// A zone plus the extra rules for one [`TimeBasis`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor<'a> {
    zone: Zone<'a>,
    /// Replaces the time of day for all-day values.
    day_start: Option<NaiveTime>,
    gap: DstPolicy,
}

impl Anchor<'_> {
    /// UTC instant of a wall-clock reading. `None` when the DST policy drops it.
    pub fn to_utc(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        let local = match self.day_start {
            Some(time) => local.date().and_time(time),
            None => local,
        };
        self.zone.to_utc(local, self.gap)
    }
}

/// Resolves values of one document under one configuration and query zone.
#[derive(Debug, Clone)]
pub struct ZoneResolver<'a> {
    table: &'a TimezoneTable,
    floating: Zone<'a>,
    all_day: Zone<'a>,
    all_day_start: NaiveTime,
    gap: DstPolicy,
}

impl<'a> ZoneResolver<'a> {
    /// # Errors
    /// Returns `ReadError::Config` when a [`ZonePolicy::Named`] zone is unknown.
    pub fn new(
        table: &'a TimezoneTable,
        calendar_zone: Option<&str>,
        query_zone: Option<Tz>,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let pick = |policy: &ZonePolicy| -> Result<Zone<'a>> {
            Ok(match policy {
                ZonePolicy::Utc => Zone::Utc,
                ZonePolicy::Query => query_zone.map_or(Zone::Utc, Zone::Iana),
                ZonePolicy::Calendar => match calendar_zone {
                    Some(name) => table.lookup(name).unwrap_or_else(|| {
                        tracing::warn!(timezone = name, "unknown calendar timezone, using UTC");
                        Zone::Utc
                    }),
                    None => Zone::Utc,
                },
                ZonePolicy::Named(name) => table
                    .lookup(name)
                    .ok_or_else(|| ReadError::Config(format!("unknown timezone {name:?}")))?,
            })
        };

        Ok(ZoneResolver {
            table,
            floating: pick(&config.floating_zone)?,
            all_day: pick(&config.all_day_zone)?,
            all_day_start: config.all_day_start,
            gap: config.dst_gap,
        })
    }

    /// The anchor for values of the given basis.
    ///
    /// # Errors
    /// Returns `ReadError::InvalidPropertyValue` for a TZID with no definition.
    pub fn anchor(&self, basis: &TimeBasis) -> Result<Anchor<'a>> {
        let (zone, day_start) = match basis {
            TimeBasis::AllDay => (self.all_day, Some(self.all_day_start)),
            TimeBasis::Utc => (Zone::Utc, None),
            TimeBasis::Floating => (self.floating, None),
            TimeBasis::Zone(tzid) => (
                self.table
                    .lookup(tzid)
                    .ok_or_else(|| ReadError::invalid_because("TZID", tzid, "unknown timezone"))?,
                None,
            ),
        };
        Ok(Anchor {
            zone,
            day_start,
            gap: self.gap,
        })
    }

    /// UTC instant of a single value. `Ok(None)` when the DST policy drops it.
    pub fn resolve(&self, value: &CalTime) -> Result<Option<DateTime<Utc>>> {
        Ok(self.anchor(&value.basis)?.to_utc(value.local))
    }
}
