//! DST transition policies for local wall-clock times.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Policy for local times that fall into a DST gap (e.g., 2:30 AM during spring forward).
///
/// Ambiguous times (the repeated hour in autumn) always resolve to the earlier instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DstPolicy {
    /// Drop instances that fall in the DST gap.
    Skip,
    /// Read the time with the offset in effect before the gap, which moves it
    /// forward by the length of the gap (2:30 becomes 3:30).
    #[default]
    ShiftForward,
}

/// Map a wall-clock reading in `tz` to UTC.
///
/// Returns `None` only for gap times under [`DstPolicy::Skip`].
pub fn local_to_utc<Tz: TimeZone>(
    tz: &Tz,
    local: NaiveDateTime,
    policy: DstPolicy,
) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => match policy {
            DstPolicy::Skip => None,
            DstPolicy::ShiftForward => {
                let before_gap = tz.offset_from_utc_datetime(&(local - Duration::days(1))).fix();
                let utc = local - Duration::seconds(i64::from(before_gap.local_minus_utc()));
                Some(Utc.from_utc_datetime(&utc))
            }
        },
    }
}
