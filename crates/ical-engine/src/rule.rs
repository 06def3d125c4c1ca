//! RRULE value parsing.

use std::str::FromStr;

use chrono::Weekday;

use crate::error::{ReadError, Result};
use crate::value::{parse_value, CalTime};

/// Base step of a recurrence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl FromStr for Frequency {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        Ok(match s {
            "SECONDLY" => Frequency::Secondly,
            "MINUTELY" => Frequency::Minutely,
            "HOURLY" => Frequency::Hourly,
            "DAILY" => Frequency::Daily,
            "WEEKLY" => Frequency::Weekly,
            "MONTHLY" => Frequency::Monthly,
            "YEARLY" => Frequency::Yearly,
            _ => return Err(()),
        })
    }
}

/// A BYDAY entry such as `TU`, `3TU` or `-1FR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByWeekday {
    /// Nth occurrence within the month or year; negative counts from the end.
    pub ordinal: Option<i16>,
    pub weekday: Weekday,
}

/// How a rule terminates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEnd {
    /// Neither COUNT nor UNTIL: the series is open-ended.
    Forever,
    Count(u32),
    /// Inclusive bound.
    Until(CalTime),
}

/// A parsed RRULE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    pub interval: u32,
    pub end: RuleEnd,
    pub by_second: Vec<u32>,
    pub by_minute: Vec<u32>,
    pub by_hour: Vec<u32>,
    pub by_day: Vec<ByWeekday>,
    pub by_month_day: Vec<i32>,
    pub by_year_day: Vec<i32>,
    pub by_month: Vec<u32>,
    pub by_set_pos: Vec<i32>,
    pub week_start: Weekday,
}

impl RecurrenceRule {
    /// A rule with just a frequency: every period, forever.
    pub fn new(freq: Frequency) -> Self {
        RecurrenceRule {
            freq,
            interval: 1,
            end: RuleEnd::Forever,
            by_second: Vec::new(),
            by_minute: Vec::new(),
            by_hour: Vec::new(),
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_year_day: Vec::new(),
            by_month: Vec::new(),
            by_set_pos: Vec::new(),
            week_start: Weekday::Mon,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.end == RuleEnd::Forever
    }

    /// Parse the value of an RRULE property, e.g. `FREQ=WEEKLY;INTERVAL=2;BYDAY=TU,TH`.
    ///
    /// # Errors
    /// Returns `ReadError::InvalidPropertyValue` for a missing or unknown FREQ,
    /// out-of-range numbers, unsupported parts (BYWEEKNO) or COUNT combined with UNTIL.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: String| ReadError::invalid_because("RRULE", raw, reason);

        let mut freq = None;
        let mut rule = RecurrenceRule::new(Frequency::Daily);
        let mut count = None;
        let mut until = None;

        for part in raw.trim().split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid(format!("part {part:?} has no '='")))?;
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();

            match key.as_str() {
                "FREQ" => {
                    freq = Some(
                        value
                            .to_ascii_uppercase()
                            .parse::<Frequency>()
                            .map_err(|()| invalid(format!("unknown FREQ {value:?}")))?,
                    );
                }
                "INTERVAL" => {
                    rule.interval = value
                        .parse()
                        .ok()
                        .filter(|n| *n >= 1)
                        .ok_or_else(|| invalid(format!("bad INTERVAL {value:?}")))?;
                }
                "COUNT" => {
                    count = Some(
                        value
                            .parse::<u32>()
                            .map_err(|_| invalid(format!("bad COUNT {value:?}")))?,
                    );
                }
                "UNTIL" => {
                    until = Some(
                        parse_value(value, None, None)
                            .ok_or_else(|| invalid(format!("bad UNTIL {value:?}")))?,
                    );
                }
                "BYSECOND" => rule.by_second = numbers(value, 0, 60, false).map_err(invalid)?,
                "BYMINUTE" => rule.by_minute = numbers(value, 0, 59, false).map_err(invalid)?,
                "BYHOUR" => rule.by_hour = numbers(value, 0, 23, false).map_err(invalid)?,
                "BYMONTHDAY" => rule.by_month_day = numbers(value, 1, 31, true).map_err(invalid)?,
                "BYYEARDAY" => rule.by_year_day = numbers(value, 1, 366, true).map_err(invalid)?,
                "BYMONTH" => rule.by_month = numbers(value, 1, 12, false).map_err(invalid)?,
                "BYSETPOS" => rule.by_set_pos = numbers(value, 1, 366, true).map_err(invalid)?,
                "BYDAY" => {
                    rule.by_day = value
                        .split(',')
                        .map(|d| parse_by_weekday(d.trim()))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| invalid(format!("bad BYDAY {value:?}")))?;
                }
                "WKST" => {
                    rule.week_start = parse_weekday(&value.to_ascii_uppercase())
                        .ok_or_else(|| invalid(format!("bad WKST {value:?}")))?;
                }
                other => return Err(invalid(format!("unsupported rule part {other}"))),
            }
        }

        rule.freq = freq.ok_or_else(|| invalid("FREQ is required".to_string()))?;
        rule.end = match (count, until) {
            (Some(_), Some(_)) => {
                return Err(invalid("COUNT and UNTIL are mutually exclusive".to_string()))
            }
            (Some(count), None) => RuleEnd::Count(count),
            (None, Some(until)) => RuleEnd::Until(until),
            (None, None) => RuleEnd::Forever,
        };

        let ordinals = rule.by_day.iter().any(|d| d.ordinal.is_some());
        if ordinals && !matches!(rule.freq, Frequency::Monthly | Frequency::Yearly) {
            return Err(invalid("BYDAY ordinals need MONTHLY or YEARLY".to_string()));
        }

        Ok(rule)
    }
}

/// Parse a comma-separated list of integers in `min..=max`, optionally also
/// accepting the negated range (zero excluded).
fn numbers<T>(value: &str, min: i32, max: i32, signed: bool) -> std::result::Result<Vec<T>, String>
where
    T: TryFrom<i32>,
{
    value
        .split(',')
        .map(|item| {
            let n: i32 = item
                .trim()
                .parse()
                .map_err(|_| format!("bad number {item:?}"))?;
            let in_range = (min..=max).contains(&n) || (signed && (-max..=-min).contains(&n));
            if !in_range {
                return Err(format!("{n} is out of range"));
            }
            T::try_from(n).map_err(|_| format!("{n} is out of range"))
        })
        .collect()
}

fn parse_by_weekday(s: &str) -> Option<ByWeekday> {
    let split = s.len().checked_sub(2)?;
    if !s.is_char_boundary(split) {
        return None;
    }
    let (ordinal, day) = s.split_at(split);
    let weekday = parse_weekday(&day.to_ascii_uppercase())?;
    let ordinal = match ordinal {
        "" => None,
        n => {
            let n: i16 = n.strip_prefix('+').unwrap_or(n).parse().ok()?;
            if n == 0 || !(-53..=53).contains(&n) {
                return None;
            }
            Some(n)
        }
    };
    Some(ByWeekday { ordinal, weekday })
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    Some(match s {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        _ => return None,
    })
}
