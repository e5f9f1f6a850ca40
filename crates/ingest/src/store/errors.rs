use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::parser::ParseError;

/// Raw text kept in an error record, in characters.
pub const MAX_ERROR_RAW_LEN: usize = 500;

/// Diagnostic record for one rejected line. Carries no event data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub raw: String,
    pub kind: &'static str,
    pub reason: String,
}

impl ParseErrorRecord {
    pub fn new(timestamp: DateTime<Utc>, source_id: &str, raw: &str, error: &ParseError) -> Self {
        let raw = match raw.char_indices().nth(MAX_ERROR_RAW_LEN) {
            Some((idx, _)) => &raw[..idx],
            None => raw,
        };
        Self {
            timestamp,
            source_id: source_id.to_string(),
            raw: raw.to_string(),
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

/// Bounded error ring; the oldest record is dropped when full.
///
/// Alongside the records it keeps per-minute failure counts over a
/// retention window, so burst detection is not capped by the ring size.
#[derive(Debug)]
pub struct ErrorRing {
    inner: Mutex<Inner>,
    capacity: usize,
    retention_minutes: i64,
}

#[derive(Debug)]
struct Inner {
    records: VecDeque<ParseErrorRecord>,
    // (unix minute, failures), ascending by minute
    buckets: VecDeque<(i64, usize)>,
}

fn minute_of(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

// Concurrent producers may stamp a record just before the newest bucket.
fn bump(buckets: &mut VecDeque<(i64, usize)>, minute: i64) {
    let idx = buckets.partition_point(|(m, _)| *m < minute);
    if buckets.get(idx).is_some_and(|(m, _)| *m == minute) {
        buckets[idx].1 += 1;
    } else {
        buckets.insert(idx, (minute, 1));
    }
}

impl ErrorRing {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                records: VecDeque::with_capacity(capacity),
                buckets: VecDeque::new(),
            }),
            capacity,
            retention_minutes: retention.num_minutes().max(1),
        }
    }

    pub fn push(&self, record: ParseErrorRecord) {
        let minute = minute_of(record.timestamp);
        let mut inner = self.inner.lock();

        bump(&mut inner.buckets, minute);
        let oldest_kept = inner.buckets.back().map_or(minute, |(m, _)| *m) - self.retention_minutes;
        while inner.buckets.front().is_some_and(|(m, _)| *m < oldest_kept) {
            inner.buckets.pop_front();
        }

        if inner.records.len() >= self.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// The latest `n` records, most recent first.
    pub fn recent(&self, n: usize) -> Vec<ParseErrorRecord> {
        self.inner.lock().records.iter().rev().take(n).cloned().collect()
    }

    /// Failures stamped within `window` of `now`, at minute granularity.
    ///
    /// Counts every failure pushed, including records already rotated out
    /// of the ring; windows longer than the retention see only the retained
    /// minutes.
    pub fn count_since(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now.checked_sub_signed(window).map_or(i64::MIN, minute_of);
        self.inner
            .lock()
            .buckets
            .iter()
            .rev()
            .take_while(|(minute, _)| *minute >= cutoff)
            .map(|(_, count)| count)
            .sum()
    }
}
