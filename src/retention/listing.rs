// Object Listing Parser - turns `aws s3 ls` text into retention entries

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::trace;

lazy_static! {
    static ref PREFIX_GROUP_LINE: Regex =
        Regex::new(r"(?:^|\s)PRE\s+(\d{4}-\d{2}-\d{2})/").expect("valid prefix-group pattern");
}

/// What a listing line describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    /// A day directory such as `full/2025-01-10/`
    PrefixGroup,
    /// A single timestamped object
    Object,
}

/// Timestamp granularity carried by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryTimestamp {
    /// From a `PRE YYYY-MM-DD/` line
    Day(NaiveDate),
    /// From an object line
    Instant(NaiveDateTime),
}

/// One parsed listing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionEntry {
    /// Prefix group or object
    pub kind: EntryKind,
    /// Full key below the bucket root
    pub key: String,
    /// Day for prefix groups, instant for objects
    pub timestamp: EntryTimestamp,
}

/// Parse a whole listing of `prefix`. Unrecognised lines are dropped.
pub fn parse_listing(prefix: &str, text: &str) -> Vec<RetentionEntry> {
    text.lines()
        .filter_map(|line| {
            let entry = parse_line(prefix, line);
            if entry.is_none() && !line.trim().is_empty() {
                trace!(line = line, "Skipping unrecognised listing line");
            }
            entry
        })
        .collect()
}

/// Parse a single listing line
pub fn parse_line(prefix: &str, line: &str) -> Option<RetentionEntry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(captures) = PREFIX_GROUP_LINE.captures(line) {
        let raw = captures.get(1)?.as_str();
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
        return Some(RetentionEntry {
            kind: EntryKind::PrefixGroup,
            key: format!("{}{}/", prefix, raw),
            timestamp: EntryTimestamp::Day(date),
        });
    }

    if line.starts_with("PRE") {
        return None;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }
    let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(fields[1], "%H:%M:%S").ok()?;
    let name = fields[fields.len() - 1];

    Some(RetentionEntry {
        kind: EntryKind::Object,
        key: format!("{}{}", prefix, name),
        timestamp: EntryTimestamp::Instant(date.and_time(time)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_prefix_group_line() {
        let entry = parse_line("full/", "                           PRE 2025-11-24/").unwrap();

        assert_eq!(
            entry,
            RetentionEntry {
                kind: EntryKind::PrefixGroup,
                key: "full/2025-11-24/".to_string(),
                timestamp: EntryTimestamp::Day(day(2025, 11, 24)),
            }
        );
    }

    #[test]
    fn test_object_line() {
        let entry = parse_line("binlogs/", "2025-11-24 12:00:00      12345 binlog.000042").unwrap();

        assert_eq!(entry.kind, EntryKind::Object);
        assert_eq!(entry.key, "binlogs/binlog.000042");
        assert_eq!(
            entry.timestamp,
            EntryTimestamp::Instant(day(2025, 11, 24).and_hms_opt(12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_malformed_lines_dropped() {
        for line in [
            "",
            "   ",
            "PRE misc/",
            "PRE 2025-13-40/",
            "PRE2025-01-01/",
            "2025-11-24 12:00:00 binlog.000001",
            "yesterday 12:00:00 10 binlog.000001",
            "2025-11-24 noon 10 binlog.000001",
            "2025-02-30 12:00:00 10 binlog.000001",
            "total objects: 4",
        ] {
            assert_eq!(parse_line("binlogs/", line), None, "line {:?}", line);
        }
    }

    #[test]
    fn test_listing_keeps_order_and_skips_noise() {
        let text = "\
                           PRE 2025-01-01/
                           PRE not-a-date/

2025-01-02 03:04:05        100 binlog.000001
garbage
2025-01-03 03:04:05        200 binlog.000002
";
        let entries = parse_listing("x/", text);
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();

        assert_eq!(keys, vec!["x/2025-01-01/", "x/binlog.000001", "x/binlog.000002"]);
    }
}
