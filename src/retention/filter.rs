// Retention Filter - day-granularity and instant-granularity expiry checks

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use super::listing::{EntryTimestamp, RetentionEntry};

/// Start of the oldest day that is still retained.
///
/// Computed once per cleanup run and shared by every namespace pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RetentionCutoff {
    day: NaiveDate,
}

impl RetentionCutoff {
    /// `now - retention_days`, truncated to the start of that day
    pub fn from_now(now: NaiveDateTime, retention_days: u32) -> Self {
        let day = now
            .date()
            .checked_sub_days(Days::new(u64::from(retention_days)))
            .unwrap_or(NaiveDate::MIN);
        Self { day }
    }

    /// A cutoff at the start of `day`
    pub fn at_day(day: NaiveDate) -> Self {
        Self { day }
    }

    /// First day that is kept
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Midnight of the cutoff day
    pub fn start_of_day(&self) -> NaiveDateTime {
        self.day.and_time(NaiveTime::MIN)
    }
}

/// A day group is expired when its day starts strictly before the cutoff day
pub fn is_day_expired(date: NaiveDate, cutoff: &RetentionCutoff) -> bool {
    date.and_time(NaiveTime::MIN) < cutoff.start_of_day()
}

/// An object is expired when its instant is strictly before the cutoff instant
pub fn is_instant_expired(instant: NaiveDateTime, cutoff: &RetentionCutoff) -> bool {
    instant < cutoff.start_of_day()
}

/// Dispatch on the entry's timestamp granularity
pub fn is_expired(entry: &RetentionEntry, cutoff: &RetentionCutoff) -> bool {
    match entry.timestamp {
        EntryTimestamp::Day(date) => is_day_expired(date, cutoff),
        EntryTimestamp::Instant(instant) => is_instant_expired(instant, cutoff),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::listing::EntryKind;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_cutoff_is_start_of_day() {
        let now = day(2025, 4, 10).and_hms_opt(17, 45, 3).unwrap();
        let cutoff = RetentionCutoff::from_now(now, 90);

        assert_eq!(cutoff.day(), day(2025, 1, 10));
        assert_eq!(cutoff.start_of_day(), day(2025, 1, 10).and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_zero_days_keeps_today() {
        let now = day(2025, 4, 10).and_hms_opt(0, 0, 1).unwrap();
        let cutoff = RetentionCutoff::from_now(now, 0);

        assert!(!is_day_expired(day(2025, 4, 10), &cutoff));
        assert!(is_day_expired(day(2025, 4, 9), &cutoff));
    }

    #[test]
    fn test_day_boundary() {
        let cutoff = RetentionCutoff::at_day(day(2025, 1, 10));

        assert!(is_day_expired(day(2025, 1, 9), &cutoff));
        assert!(!is_day_expired(day(2025, 1, 10), &cutoff));
        assert!(!is_day_expired(day(2025, 1, 11), &cutoff));
    }

    #[test]
    fn test_instant_boundary() {
        let cutoff = RetentionCutoff::at_day(day(2025, 1, 10));

        assert!(is_instant_expired(day(2025, 1, 9).and_hms_opt(23, 59, 59).unwrap(), &cutoff));
        assert!(!is_instant_expired(day(2025, 1, 10).and_hms_opt(0, 0, 0).unwrap(), &cutoff));
        assert!(!is_instant_expired(day(2025, 1, 10).and_hms_opt(11, 59, 59).unwrap(), &cutoff));
    }

    #[test]
    fn test_is_expired_dispatches_on_kind() {
        let cutoff = RetentionCutoff::at_day(day(2025, 1, 10));
        let group = RetentionEntry {
            kind: EntryKind::PrefixGroup,
            key: "full/2025-01-09/".to_string(),
            timestamp: EntryTimestamp::Day(day(2025, 1, 9)),
        };
        let object = RetentionEntry {
            kind: EntryKind::Object,
            key: "binlogs/binlog.000001".to_string(),
            timestamp: EntryTimestamp::Instant(day(2025, 1, 10).and_hms_opt(0, 0, 1).unwrap()),
        };

        assert!(is_expired(&group, &cutoff));
        assert!(!is_expired(&object, &cutoff));
    }

    #[test]
    fn test_huge_window_does_not_panic() {
        let now = day(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap();
        let cutoff = RetentionCutoff::from_now(now, u32::MAX);

        assert!(!is_day_expired(day(1970, 1, 1), &cutoff));
    }
}
