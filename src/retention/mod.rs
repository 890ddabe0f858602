//! Retention primitives shared by the cleanup workflow.
//!
//! Listing text is parsed into [`RetentionEntry`] values and each entry is
//! judged against a [`RetentionCutoff`]. Day directories are compared with
//! [`is_day_expired`], timestamped objects with [`is_instant_expired`].

/// Cutoff comparisons
pub mod filter;
/// Listing text parser
pub mod listing;

pub use filter::{is_day_expired, is_expired, is_instant_expired, RetentionCutoff};
pub use listing::{parse_line, parse_listing, EntryKind, EntryTimestamp, RetentionEntry};

/// Entries of `kind` that are expired against `cutoff`, in listing order
pub fn expired_entries(entries: Vec<RetentionEntry>, kind: EntryKind, cutoff: &RetentionCutoff) -> Vec<RetentionEntry> {
    entries
        .into_iter()
        .filter(|entry| entry.kind == kind && is_expired(entry, cutoff))
        .collect()
}
