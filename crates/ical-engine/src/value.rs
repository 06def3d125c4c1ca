//! Typed property values: DATE, DATE-TIME, DURATION and UTC-OFFSET.

use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{ReadError, Result};
use crate::lexer::{split_list, ContentLine};

/// How a wall-clock value is anchored to the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimeBasis {
    /// A DATE value. The time of day comes from the reader configuration.
    AllDay,
    /// A DATE-TIME with the `Z` designator.
    Utc,
    /// A DATE-TIME with neither `Z` nor TZID.
    Floating,
    /// A DATE-TIME with a TZID parameter.
    Zone(String),
}

/// A date or date-time value as written in the document.
///
/// `local` is the wall-clock reading; DATE values sit at midnight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalTime {
    pub local: NaiveDateTime,
    pub basis: TimeBasis,
}

impl CalTime {
    pub fn all_day(date: NaiveDate) -> Self {
        CalTime {
            local: date.and_time(NaiveTime::MIN),
            basis: TimeBasis::AllDay,
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.basis == TimeBasis::AllDay
    }

    /// Same basis, different wall-clock reading.
    pub fn with_local(&self, local: NaiveDateTime) -> Self {
        CalTime {
            local,
            basis: self.basis.clone(),
        }
    }
}

/// Parse `YYYYMMDD`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

/// Parse `YYYYMMDDTHHMMSS[Z]`, anchoring it to `tzid` when no `Z` is present.
pub fn parse_date_time(s: &str, tzid: Option<&str>) -> Option<CalTime> {
    let s = s.trim();
    let (body, utc) = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        Some(body) => (body, true),
        None => (s, false),
    };
    if body.len() != 15 || !body.is_ascii() || body.as_bytes()[8] != b'T' {
        return None;
    }
    let (date, time) = (&body[..8], &body[9..]);
    if !time.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let local = parse_date(date)?.and_time(NaiveTime::parse_from_str(time, "%H%M%S").ok()?);

    let basis = match (utc, tzid) {
        (true, _) => TimeBasis::Utc,
        (false, Some(tzid)) => TimeBasis::Zone(tzid.to_string()),
        (false, None) => TimeBasis::Floating,
    };
    Some(CalTime { local, basis })
}

/// Parse a single DATE or DATE-TIME value, honouring `VALUE=DATE`.
pub fn parse_value(raw: &str, value_type: Option<&str>, tzid: Option<&str>) -> Option<CalTime> {
    let is_date = match value_type {
        Some(t) => t.eq_ignore_ascii_case("DATE"),
        None => raw.trim().len() == 8,
    };
    if is_date {
        parse_date(raw).map(CalTime::all_day)
    } else {
        parse_date_time(raw, tzid)
    }
}

/// Parse a DTSTART/DTEND/RECURRENCE-ID style property.
///
/// # Errors
/// Returns `ReadError::InvalidPropertyValue` naming the property.
pub fn parse_time_property(prop: &ContentLine) -> Result<CalTime> {
    parse_value(&prop.value, prop.param("VALUE"), prop.param("TZID"))
        .ok_or_else(|| ReadError::invalid(&prop.name, &prop.value))
}

/// Parse an RDATE/EXDATE property into its list of instants.
///
/// PERIOD values (`start/end` or `start/duration`) contribute their start.
///
/// # Errors
/// Returns `ReadError::InvalidPropertyValue` if any list element fails to parse.
pub fn parse_time_list(prop: &ContentLine) -> Result<Vec<CalTime>> {
    let period = prop
        .param("VALUE")
        .is_some_and(|t| t.eq_ignore_ascii_case("PERIOD"));
    let value_type = if period { None } else { prop.param("VALUE") };

    split_list(&prop.value)
        .into_iter()
        .map(|item| {
            let item = if period {
                item.split('/').next().unwrap_or(item)
            } else {
                item
            };
            parse_value(item, value_type, prop.param("TZID"))
                .ok_or_else(|| ReadError::invalid(&prop.name, item))
        })
        .collect()
}

/// Parse an RFC 5545 DURATION such as `P1W`, `-PT15M` or `P1DT2H30M`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (negative, s) = match *s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let mut rest = s.strip_prefix('P').or_else(|| s.strip_prefix('p'))?;
    if rest.is_empty() {
        return None;
    }

    let mut seconds: i64 = 0;
    let mut in_time = false;
    let mut seen_unit = false;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('T') {
            if in_time {
                return None;
            }
            in_time = true;
            rest = after;
            continue;
        }
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || digits >= rest.len() {
            return None;
        }
        let n: i64 = rest[..digits].parse().ok()?;
        let unit = match (in_time, rest.as_bytes()[digits].to_ascii_uppercase()) {
            (false, b'W') => 7 * 86_400,
            (false, b'D') => 86_400,
            (true, b'H') => 3_600,
            (true, b'M') => 60,
            (true, b'S') => 1,
            _ => return None,
        };
        seconds = seconds.checked_add(n.checked_mul(unit)?)?;
        seen_unit = true;
        rest = &rest[digits + 1..];
    }
    if !seen_unit {
        return None;
    }

    Duration::try_seconds(if negative { -seconds } else { seconds })
}

/// Parse a UTC-OFFSET value: `+HHMM` or `-HHMMSS`.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    let sign = match *s.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = &s[1..];
    if !(digits.len() == 4 || digits.len() == 6) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    let secs: i32 = if digits.len() == 6 {
        digits[4..6].parse().ok()?
    } else {
        0
    };
    if minutes >= 60 || secs >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3_600 + minutes * 60 + secs))
}
