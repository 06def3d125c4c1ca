//! Recurrence expansion -- turns an event record into a lazy, strictly increasing
//! sequence of UTC start times.
//!
//! Expansion happens in two layers:
//!
//! - [`RuleIter`] walks an RRULE period by period in wall-clock time. Each
//!   period (a year, a month, a week, ...) is expanded into its candidate set by
//!   the BYxxx parts, narrowed by BYSETPOS, and buffered. Nothing beyond the
//!   current period is ever computed.
//! - [`Occurrences`] resolves those wall-clock readings to UTC, merges RDATEs,
//!   drops EXDATEs by exact instant, and stops at COUNT, UNTIL, or (for
//!   open-ended rules only) the caller's bound.
//!
//! EXDATE matching runs against the unbounded series; the bound only decides
//! where an open-ended rule stops producing.

use std::collections::{HashSet, VecDeque};
use std::iter::Peekable;
use std::vec;

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday,
};

use crate::document::EventRecord;
use crate::error::{ReadError, Result};
use crate::rule::{Frequency, RecurrenceRule, RuleEnd};
use crate::timezone::{Anchor, ZoneResolver};
use crate::value::TimeBasis;

/// Wall-clock iterator over the instances of one recurrence rule.
///
/// The start time is always the first instance (RFC 5545 §3.8.5.3) and counts
/// towards COUNT. UNTIL is left to the caller, since comparing against it may
/// need a timezone.
#[derive(Debug, Clone)]
pub struct RuleIter<'a> {
    rule: &'a RecurrenceRule,
    start: NaiveDateTime,
    /// Stop once a whole period starts after this reading.
    horizon: Option<NaiveDateTime>,
    period: i64,
    buffer: VecDeque<NaiveDateTime>,
    emitted: u64,
    empty_periods: u64,
    started: bool,
    done: bool,
}

impl<'a> RuleIter<'a> {
    pub fn new(rule: &'a RecurrenceRule, start: NaiveDateTime, horizon: Option<NaiveDateTime>) -> Self {
        RuleIter {
            rule,
            start,
            horizon,
            period: 0,
            buffer: VecDeque::new(),
            emitted: 0,
            empty_periods: 0,
            started: false,
            done: rule.end == RuleEnd::Count(0),
        }
    }

    /// Start walking at period `period` instead of the first one.
    ///
    /// The start time is not emitted and nothing before that period is
    /// computed, so COUNT rules must not be resumed.
    pub fn resume(
        rule: &'a RecurrenceRule,
        start: NaiveDateTime,
        horizon: Option<NaiveDateTime>,
        period: i64,
    ) -> Self {
        RuleIter {
            period: period.max(0),
            started: true,
            ..RuleIter::new(rule, start, horizon)
        }
    }

    /// Index of the period containing `t`, or a negative index before the start.
    pub fn period_index(rule: &RecurrenceRule, start: NaiveDateTime, t: NaiveDateTime) -> i64 {
        let floor = |t: NaiveDateTime, secs: i64| t.and_utc().timestamp().div_euclid(secs);
        let steps = match rule.freq {
            Frequency::Yearly => i64::from(t.year()) - i64::from(start.year()),
            Frequency::Monthly => {
                (i64::from(t.year()) - i64::from(start.year())) * 12 + i64::from(t.month0())
                    - i64::from(start.month0())
            }
            Frequency::Weekly => {
                (week_start(t.date(), rule.week_start) - week_start(start.date(), rule.week_start))
                    .num_weeks()
            }
            Frequency::Daily => (t.date() - start.date()).num_days(),
            Frequency::Hourly => floor(t, 3_600) - floor(start, 3_600),
            Frequency::Minutely => floor(t, 60) - floor(start, 60),
            Frequency::Secondly => floor(t, 1) - floor(start, 1),
        };
        steps.div_euclid(i64::from(rule.interval.max(1)))
    }

    fn count_reached(&self) -> bool {
        matches!(self.rule.end, RuleEnd::Count(n) if self.emitted >= u64::from(n))
    }

    /// Expand the next period into the buffer. Returns false when the rule is exhausted.
    fn fill(&mut self) -> bool {
        while self.buffer.is_empty() {
            let Some(anchor) = self.period_anchor(self.period) else {
                return false;
            };
            if self.horizon.is_some_and(|h| anchor > h) {
                tracing::debug!(period = self.period, "rule expansion passed its horizon");
                return false;
            }

            let candidates = self.expand_period(anchor);
            self.period += 1;

            let start = self.start;
            self.buffer.extend(candidates.into_iter().filter(|t| *t > start));
            if self.buffer.is_empty() {
                self.empty_periods += 1;
                if self.empty_periods > empty_period_limit(self.rule.freq) {
                    tracing::debug!(
                        periods = self.empty_periods,
                        "rule matched nothing for too long, stopping"
                    );
                    return false;
                }
            } else {
                self.empty_periods = 0;
            }
        }
        true
    }

    /// The first instant of the `index`th period, or `None` past chrono's range.
    fn period_anchor(&self, index: i64) -> Option<NaiveDateTime> {
        let step = index.checked_mul(i64::from(self.rule.interval))?;
        let start = self.start;
        let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN);

        match self.rule.freq {
            Frequency::Yearly => {
                let year = i32::try_from(i64::from(start.year()).checked_add(step)?).ok()?;
                NaiveDate::from_ymd_opt(year, 1, 1).map(midnight)
            }
            Frequency::Monthly => {
                let months = i64::from(start.year()) * 12 + i64::from(start.month0());
                let months = months.checked_add(step)?;
                let year = i32::try_from(months.div_euclid(12)).ok()?;
                let month = u32::try_from(months.rem_euclid(12)).ok()? + 1;
                NaiveDate::from_ymd_opt(year, month, 1).map(midnight)
            }
            Frequency::Weekly => {
                let week = week_start(start.date(), self.rule.week_start);
                week.checked_add_signed(Duration::try_weeks(step)?)
                    .map(midnight)
            }
            Frequency::Daily => start
                .date()
                .checked_add_signed(Duration::try_days(step)?)
                .map(midnight),
            Frequency::Hourly => {
                let base = start.date().and_hms_opt(start.hour(), 0, 0)?;
                base.checked_add_signed(Duration::try_hours(step)?)
            }
            Frequency::Minutely => {
                let base = start.date().and_hms_opt(start.hour(), start.minute(), 0)?;
                base.checked_add_signed(Duration::try_minutes(step)?)
            }
            Frequency::Secondly => {
                let base = start.with_nanosecond(0)?;
                base.checked_add_signed(Duration::try_seconds(step)?)
            }
        }
    }

    /// All instances of the period starting at `anchor`, sorted and BYSETPOS-filtered.
    fn expand_period(&self, anchor: NaiveDateTime) -> Vec<NaiveDateTime> {
        let days = self.period_days(anchor);
        let times = self.period_times(anchor);

        let mut set: Vec<NaiveDateTime> = days
            .iter()
            .flat_map(|d| times.iter().map(move |t| d.and_time(*t)))
            .collect();
        set.sort_unstable();
        set.dedup();

        if self.rule.by_set_pos.is_empty() {
            return set;
        }

        let len = set.len() as i64;
        let mut picked: Vec<NaiveDateTime> = self
            .rule
            .by_set_pos
            .iter()
            .filter_map(|&pos| {
                let pos = i64::from(pos);
                let index = if pos > 0 { pos - 1 } else { len + pos };
                usize::try_from(index).ok().and_then(|i| set.get(i).copied())
            })
            .collect();
        picked.sort_unstable();
        picked.dedup();
        picked
    }

    /// Candidate days of the period.
    fn period_days(&self, anchor: NaiveDateTime) -> Vec<NaiveDate> {
        let rule = self.rule;
        let start = self.start.date();
        let date = anchor.date();

        let no_day_rules =
            rule.by_month_day.is_empty() && rule.by_year_day.is_empty() && rule.by_day.is_empty();

        match rule.freq {
            Frequency::Yearly => {
                let year = date.year();
                if no_day_rules {
                    let months: Vec<u32> = if rule.by_month.is_empty() {
                        vec![start.month()]
                    } else {
                        rule.by_month.clone()
                    };
                    return months
                        .into_iter()
                        .filter_map(|m| NaiveDate::from_ymd_opt(year, m, start.day()))
                        .collect();
                }
                let scope_is_month = !rule.by_month.is_empty();
                days_between(date, NaiveDate::from_ymd_opt(year + 1, 1, 1))
                    .filter(|d| self.month_allowed(*d))
                    .filter(|d| self.month_day_allowed(*d))
                    .filter(|d| self.year_day_allowed(*d))
                    .filter(|d| self.weekday_allowed(*d, scope_is_month))
                    .collect()
            }
            Frequency::Monthly => {
                if !self.month_allowed(date) {
                    return Vec::new();
                }
                if no_day_rules {
                    return NaiveDate::from_ymd_opt(date.year(), date.month(), start.day())
                        .into_iter()
                        .collect();
                }
                days_between(date, date.checked_add_months(chrono::Months::new(1)))
                    .filter(|d| self.month_day_allowed(*d))
                    .filter(|d| self.year_day_allowed(*d))
                    .filter(|d| self.weekday_allowed(*d, true))
                    .collect()
            }
            Frequency::Weekly => {
                let weekdays: Vec<Weekday> = if rule.by_day.is_empty() {
                    vec![start.weekday()]
                } else {
                    rule.by_day.iter().map(|d| d.weekday).collect()
                };
                (0..7)
                    .filter_map(|n| date.checked_add_signed(Duration::days(n)))
                    .filter(|d| weekdays.contains(&d.weekday()))
                    .filter(|d| self.month_allowed(*d))
                    .collect()
            }
            Frequency::Daily | Frequency::Hourly | Frequency::Minutely | Frequency::Secondly => {
                let allowed = self.month_allowed(date)
                    && self.month_day_allowed(date)
                    && self.year_day_allowed(date)
                    && self.weekday_allowed(date, true);
                if allowed {
                    vec![date]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Candidate times of day within the period, sorted.
    fn period_times(&self, anchor: NaiveDateTime) -> Vec<NaiveTime> {
        let rule = self.rule;
        let start = self.start;

        // Parts coarser than the frequency expand; finer ones are fixed by the period.
        let pick = |by: &[u32], fixed_by_period: bool, period_value: u32, start_value: u32| {
            if fixed_by_period {
                if by.is_empty() || by.contains(&period_value) {
                    vec![period_value]
                } else {
                    Vec::new()
                }
            } else if by.is_empty() {
                vec![start_value]
            } else {
                let mut values = by.to_vec();
                values.sort_unstable();
                values.dedup();
                values
            }
        };

        let hours = pick(&rule.by_hour, rule.freq <= Frequency::Hourly, anchor.hour(), start.hour());
        let minutes = pick(
            &rule.by_minute,
            rule.freq <= Frequency::Minutely,
            anchor.minute(),
            start.minute(),
        );
        let seconds = pick(
            &rule.by_second,
            rule.freq == Frequency::Secondly,
            anchor.second(),
            start.second(),
        );

        let mut times = Vec::with_capacity(hours.len() * minutes.len() * seconds.len());
        for h in &hours {
            for m in &minutes {
                for s in &seconds {
                    if let Some(t) = NaiveTime::from_hms_opt(*h, *m, *s) {
                        times.push(t);
                    }
                }
            }
        }
        times
    }

    fn month_allowed(&self, d: NaiveDate) -> bool {
        self.rule.by_month.is_empty() || self.rule.by_month.contains(&d.month())
    }

    fn month_day_allowed(&self, d: NaiveDate) -> bool {
        let len = days_in_month(d);
        self.rule.by_month_day.is_empty()
            || self
                .rule
                .by_month_day
                .iter()
                .any(|&n| nth_matches(n, d.day() as i32, len))
    }

    fn year_day_allowed(&self, d: NaiveDate) -> bool {
        let len = if d.leap_year() { 366 } else { 365 };
        self.rule.by_year_day.is_empty()
            || self
                .rule
                .by_year_day
                .iter()
                .any(|&n| nth_matches(n, d.ordinal() as i32, len))
    }

    /// BYDAY check. Ordinals count within the month, or within the year when
    /// `scope_is_month` is false.
    fn weekday_allowed(&self, d: NaiveDate, scope_is_month: bool) -> bool {
        if self.rule.by_day.is_empty() {
            return true;
        }
        let (pos, len) = if scope_is_month {
            (d.day() as i32, days_in_month(d))
        } else {
            (d.ordinal() as i32, if d.leap_year() { 366 } else { 365 })
        };
        self.rule.by_day.iter().any(|by| {
            by.weekday == d.weekday()
                && match by.ordinal {
                    None => true,
                    Some(n) if n > 0 => (pos - 1) / 7 + 1 == i32::from(n),
                    Some(n) => (len - pos) / 7 + 1 == -i32::from(n),
                }
        })
    }
}

impl Iterator for RuleIter<'_> {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<NaiveDateTime> {
        if self.done || self.count_reached() {
            self.done = true;
            return None;
        }
        if !self.started {
            self.started = true;
            self.emitted += 1;
            return Some(self.start);
        }
        if !self.fill() {
            self.done = true;
            return None;
        }
        self.emitted += 1;
        self.buffer.pop_front()
    }
}

impl std::iter::FusedIterator for RuleIter<'_> {}

/// Consecutive empty periods tolerated before a rule is considered exhausted.
/// Covers one 400-year Gregorian cycle for the calendar frequencies.
fn empty_period_limit(freq: Frequency) -> u64 {
    match freq {
        Frequency::Yearly => 400,
        Frequency::Monthly => 4_800,
        Frequency::Weekly => 20_871,
        Frequency::Daily => 146_097,
        Frequency::Hourly | Frequency::Minutely | Frequency::Secondly => 1_000_000,
    }
}

/// Does a (possibly negative) BYxxx ordinal `n` select position `pos` of `len`?
fn nth_matches(n: i32, pos: i32, len: i32) -> bool {
    if n > 0 {
        n == pos
    } else {
        len + 1 + n == pos
    }
}

fn days_in_month(d: NaiveDate) -> i32 {
    let (y, m) = (d.year(), d.month());
    let next = if m == 12 {
        NaiveDate::from_ymd_opt(y + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(y, m + 1, 1)
    };
    match (next, NaiveDate::from_ymd_opt(y, m, 1)) {
        (Some(next), Some(first)) => (next - first).num_days() as i32,
        _ => 31,
    }
}

fn days_between(from: NaiveDate, until: Option<NaiveDate>) -> impl Iterator<Item = NaiveDate> {
    from.iter_days()
        .take_while(move |d| until.is_none_or(|u| *d < u))
}

fn week_start(d: NaiveDate, wkst: Weekday) -> NaiveDate {
    let back = (7 + d.weekday().num_days_from_monday() - wkst.num_days_from_monday()) % 7;
    d - Duration::days(i64::from(back))
}

/// Inclusive UNTIL bound, compared in UTC when UNTIL carries `Z`, otherwise
/// in the start's wall-clock time.
#[derive(Debug, Clone, Copy)]
enum Until {
    Instant(DateTime<Utc>),
    Local(NaiveDateTime),
}

/// Where the base (pre-RDATE) series comes from.
#[derive(Debug, Clone)]
enum Base<'a> {
    Rule(RuleIter<'a>),
    Single(Option<NaiveDateTime>),
}

impl Iterator for Base<'_> {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<NaiveDateTime> {
        match self {
            Base::Rule(iter) => iter.next(),
            Base::Single(start) => start.take(),
        }
    }
}

/// The lazy, strictly increasing sequence of UTC start times of one event.
///
/// Instances that land on or before the previous one (two DST-gap times
/// shifted onto the same instant) are dropped.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    base: Base<'a>,
    anchor: Anchor<'a>,
    until: Option<Until>,
    bound: Option<DateTime<Utc>>,
    rdates: Peekable<vec::IntoIter<DateTime<Utc>>>,
    exdates: HashSet<DateTime<Utc>>,
    pending: Option<DateTime<Utc>>,
    base_done: bool,
    last: Option<DateTime<Utc>>,
}

impl Occurrences<'_> {
    /// Pull the next base instance into `pending`, honouring UNTIL and the bound.
    fn refill(&mut self) {
        while self.pending.is_none() && !self.base_done {
            let Some(local) = self.base.next() else {
                self.base_done = true;
                return;
            };
            if let Some(Until::Local(until)) = self.until {
                if local > until {
                    self.base_done = true;
                    return;
                }
            }
            // Skipped by the DST policy.
            let Some(utc) = self.anchor.to_utc(local) else {
                continue;
            };
            let past_until = matches!(self.until, Some(Until::Instant(until)) if utc > until);
            let past_bound = self.bound.is_some_and(|bound| utc > bound);
            if past_until || past_bound {
                self.base_done = true;
                return;
            }
            self.pending = Some(utc);
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<DateTime<Utc>> {
        loop {
            self.refill();

            let next = match (self.pending, self.rdates.peek().copied()) {
                (Some(base), Some(extra)) if extra < base => self.rdates.next(),
                (Some(_), _) => self.pending.take(),
                (None, Some(_)) => self.rdates.next(),
                (None, None) => return None,
            }?;

            // Gap times shifted onto an instant already produced collapse into
            // it; they still used up their place in COUNT.
            if self.last.is_some_and(|last| next <= last) {
                continue;
            }
            self.last = Some(next);
            if self.exdates.contains(&next) {
                continue;
            }
            return Some(next);
        }
    }
}

impl std::iter::FusedIterator for Occurrences<'_> {}

/// Expand an event record into its occurrence start times.
///
/// `bound` is only consulted for open-ended rules (no COUNT, no UNTIL): the
/// rule stops producing once an instance lies after it.
///
/// # Errors
/// Returns `ReadError::UnboundedRecurrence` for an open-ended rule without a
/// bound, and `ReadError::InvalidPropertyValue` when a TZID cannot be resolved.
pub fn expand<'a>(
    record: &'a EventRecord,
    resolver: &ZoneResolver<'a>,
    bound: Option<DateTime<Utc>>,
) -> Result<Occurrences<'a>> {
    let anchor = resolver.anchor(&record.start.basis)?;

    let (base, until, bound) = match &record.rule {
        None => (Base::Single(Some(record.start.local)), None, None),
        Some(rule) => {
            let until = match &rule.end {
                RuleEnd::Until(until) if until.basis == TimeBasis::Utc => {
                    resolver.resolve(until)?.map(Until::Instant)
                }
                RuleEnd::Until(until) if until.is_all_day() && !record.start.is_all_day() => {
                    // A DATE bound on a timed series covers that whole day.
                    Some(Until::Local(until.local + Duration::days(1) - Duration::seconds(1)))
                }
                RuleEnd::Until(until) => Some(Until::Local(until.local)),
                RuleEnd::Count(_) | RuleEnd::Forever => None,
            };
            let bound = if rule.is_open_ended() {
                Some(bound.ok_or_else(|| ReadError::UnboundedRecurrence {
                    uid: record.uid.clone(),
                })?)
            } else {
                None
            };
            // Local readings may run up to a day ahead of UTC.
            let horizon = match (until, bound) {
                (Some(Until::Local(until)), _) => Some(until),
                (Some(Until::Instant(until)), _) => Some(until.naive_utc() + Duration::days(2)),
                (None, Some(bound)) => Some(bound.naive_utc() + Duration::days(2)),
                (None, None) => None,
            };
            let iter = RuleIter::new(rule, record.start.local, horizon);
            (Base::Rule(iter), until, bound)
        }
    };

    let mut rdates = resolve_all(resolver, &record.rdates)?;
    rdates.sort_unstable();
    rdates.dedup();
    let exdates = resolve_all(resolver, &record.exdates)?.into_iter().collect();

    Ok(Occurrences {
        base,
        anchor,
        until,
        bound,
        rdates: rdates.into_iter().peekable(),
        exdates,
        pending: None,
        base_done: false,
        last: None,
    })
}

fn resolve_all(
    resolver: &ZoneResolver<'_>,
    values: &[crate::value::CalTime],
) -> Result<Vec<DateTime<Utc>>> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if let Some(utc) = resolver.resolve(value)? {
            out.push(utc);
        }
    }
    Ok(out)
}
