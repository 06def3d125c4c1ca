//! Interval filtering of occurrence sequences.
//!
//! Intervals are half-open: `after <= t < before`. Because an occurrence
//! sequence is strictly increasing, the filter stops pulling from it at the
//! first time `>= before`; times before `after` are skipped one by one.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::document::EventRecord;
use crate::error::{ReadError, Result};

/// A half-open query window `[after, before)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    /// The zone the caller expressed the window in, if it was not UTC.
    zone: Option<Tz>,
}

impl Interval {
    /// Build an interval from two instants in an IANA zone. The zone of `after`
    /// becomes the query zone (see [`ZonePolicy::Query`](crate::ZonePolicy::Query)).
    ///
    /// # Errors
    /// Returns `ReadError::InvalidInterval` if `after > before`.
    pub fn new(after: DateTime<Tz>, before: DateTime<Tz>) -> Result<Self> {
        Self::build(after.with_timezone(&Utc), before.with_timezone(&Utc), Some(after.timezone()))
    }

    /// Build an interval in UTC.
    ///
    /// # Errors
    /// Returns `ReadError::InvalidInterval` if `after > before`.
    pub fn utc(after: DateTime<Utc>, before: DateTime<Utc>) -> Result<Self> {
        Self::build(after, before, None)
    }

    /// Build an interval from instants in any zone; the query zone is UTC.
    ///
    /// # Errors
    /// Returns `ReadError::InvalidInterval` if `after > before`.
    pub fn between<A: TimeZone, B: TimeZone>(after: DateTime<A>, before: DateTime<B>) -> Result<Self> {
        Self::build(after.with_timezone(&Utc), before.with_timezone(&Utc), None)
    }

    fn build(after: DateTime<Utc>, before: DateTime<Utc>, zone: Option<Tz>) -> Result<Self> {
        if after > before {
            return Err(ReadError::InvalidInterval {
                after: after.to_rfc3339(),
                before: before.to_rfc3339(),
            });
        }
        Ok(Interval {
            after,
            before,
            zone,
        })
    }

    pub fn after(&self) -> DateTime<Utc> {
        self.after
    }

    pub fn before(&self) -> DateTime<Utc> {
        self.before
    }

    pub fn zone(&self) -> Option<Tz> {
        self.zone
    }

    pub fn is_empty(&self) -> bool {
        self.after == self.before
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.after <= t && t < self.before
    }
}

/// One concrete instance of an event record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occurrence<'a> {
    pub start: DateTime<Utc>,
    pub record: &'a EventRecord,
}

/// Keep the times of `occurrences` that fall inside `interval`.
///
/// `occurrences` must be increasing; iteration ends at the first time at or
/// past `interval.before()`.
pub fn filter<'a, I>(
    record: &'a EventRecord,
    occurrences: I,
    interval: &Interval,
) -> impl Iterator<Item = Occurrence<'a>>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let Interval { after, before, .. } = *interval;
    occurrences
        .into_iter()
        .take_while(move |t| *t < before)
        .filter(move |t| *t >= after)
        .map(move |start| Occurrence { start, record })
}
