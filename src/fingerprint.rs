//! Record identity and deduplication.
//!
//! A record's [`Fingerprint`] is its permalink plus timestamp when a permalink
//! is known, and otherwise its text, timestamp and author username. Missing
//! components count as empty strings. Dedup keeps the first occurrence of each
//! fingerprint and preserves the order of first occurrences.

use std::collections::HashSet;

use crate::model::Record;

/// Derived identity key for a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Keyed by permalink and timestamp.
    Permalink { url: String, timestamp: String },
    /// Fallback when no permalink was resolved.
    Content {
        text: String,
        timestamp: String,
        username: String,
    },
}

impl Fingerprint {
    /// Compute the fingerprint of a record.
    #[must_use]
    pub fn of(record: &Record) -> Self {
        let timestamp = trimmed(record.timestamp.as_deref());
        let url = trimmed(record.identity_url.as_deref());

        if url.is_empty() {
            Self::Content {
                text: record.text.trim().to_string(),
                timestamp,
                username: trimmed(record.author.username.as_deref()),
            }
        } else {
            Self::Permalink { url, timestamp }
        }
    }
}

fn trimmed(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// Incremental set of fingerprints already accepted.
#[derive(Debug, Default, Clone)]
pub struct SeenSet {
    seen: HashSet<Fingerprint>,
}

impl SeenSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fingerprint; returns `true` if it had not been seen before.
    pub fn insert(&mut self, fingerprint: Fingerprint) -> bool {
        self.seen.insert(fingerprint)
    }

    /// Record a record's fingerprint; returns `true` if it is new.
    pub fn insert_record(&mut self, record: &Record) -> bool {
        self.insert(Fingerprint::of(record))
    }

    #[must_use]
    pub fn contains(&self, record: &Record) -> bool {
        self.seen.contains(&Fingerprint::of(record))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Drop every record whose fingerprint was already seen earlier in `records`.
#[must_use]
pub fn dedupe(records: Vec<Record>) -> Vec<Record> {
    let mut seen = SeenSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert_record(record))
        .collect()
}

/// Append `incoming` to `existing`, then dedupe. Existing rows win ties.
#[must_use]
pub fn merge(existing: Vec<Record>, incoming: &[Record]) -> Vec<Record> {
    let mut combined = existing;
    combined.extend_from_slice(incoming);
    dedupe(combined)
}

/// Count records that share a fingerprint with an earlier record.
#[must_use]
pub fn duplicate_count(records: &[Record]) -> usize {
    let mut seen = SeenSet::new();
    records
        .iter()
        .filter(|record| !seen.insert_record(record))
        .count()
}
