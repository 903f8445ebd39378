//! Interval coverage: total time covered by a set of possibly overlapping spans.
//!
//! Overlapping and touching spans are merged before summing, so time tracked by
//! two activities at once is only counted once.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A bare `[start, end)` pair.
///
/// Unlike [`Window`](crate::Window) a span carries no sentinel meaning, and an
/// inverted span (`end < start`) is simply zero length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Length in milliseconds, zero for empty or inverted spans.
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds().max(0)
    }
}

/// Merges spans into disjoint, start-ordered spans.
///
/// Spans with `end <= start` are dropped. Spans that overlap or touch
/// (`next.start <= current.end`) are joined.
pub fn merge_spans(spans: &[Span]) -> Vec<Span> {
    let mut sorted: Vec<Span> = spans.iter().filter(|s| s.end > s.start).copied().collect();
    if sorted.is_empty() {
        return sorted;
    }
    sorted.sort_by_key(|s| s.start);

    let mut merged: Vec<Span> = Vec::with_capacity(sorted.len());
    for span in sorted {
        if let Some(last) = merged.last_mut() {
            if span.start <= last.end {
                last.end = last.end.max(span.end);
            } else {
                merged.push(span);
            }
        } else {
            merged.push(span);
        }
    }
    merged
}

/// Total covered time in milliseconds (the length of the union of `spans`).
pub fn covered_duration_ms(spans: &[Span]) -> i64 {
    merge_spans(spans).iter().map(Span::duration_ms).sum()
}
