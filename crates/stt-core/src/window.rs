//! Concrete time windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::coverage::Span;

/// A half-open `[start, end)` time window.
///
/// `start == end == UNIX_EPOCH` is the "all time" sentinel. Every operation
/// that bounds something by a window checks for it first, since treating it
/// as an ordinary window would collapse everything to nothing.
///
/// Deserialization goes through [`Window::new`], so inverted input becomes
/// an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawWindow")]
pub struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl From<RawWindow> for Window {
    fn from(raw: RawWindow) -> Self {
        Self::new(raw.start, raw.end)
    }
}

impl Window {
    /// The unbounded window covering every record.
    pub const ALL_TIME: Self = Self {
        start: DateTime::<Utc>::UNIX_EPOCH,
        end: DateTime::<Utc>::UNIX_EPOCH,
    };

    /// Creates a window. An inverted pair becomes an empty window at `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if end < start {
            return Self::empty_at(start);
        }
        Self { start, end }
    }

    /// An empty window anchored at `at`.
    ///
    /// An empty window at the epoch would be the all-time sentinel, so it is
    /// anchored one millisecond earlier instead.
    pub fn empty_at(at: DateTime<Utc>) -> Self {
        let at = if at == DateTime::<Utc>::UNIX_EPOCH {
            at - Duration::milliseconds(1)
        } else {
            at
        };
        Self { start: at, end: at }
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_all_time(&self) -> bool {
        *self == Self::ALL_TIME
    }

    /// True for a zero-length window that is not the all-time sentinel.
    pub fn is_empty(&self) -> bool {
        !self.is_all_time() && self.start == self.end
    }

    /// Window length in milliseconds. Zero for the sentinel.
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }

    /// Half-open overlap test: `start < self.end && end > self.start`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if self.is_all_time() {
            return true;
        }
        start < self.end && end > self.start
    }

    /// True if `[start, end)` lies entirely inside the window.
    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if self.is_all_time() {
            return true;
        }
        start >= self.start && end <= self.end
    }

    /// Clamps a span to the window bounds. The sentinel clamps nothing.
    pub fn clamp(&self, span: Span) -> Span {
        if self.contains(span.start, span.end) {
            return span;
        }
        Span {
            start: span.start.max(self.start),
            end: span.end.min(self.end),
        }
    }
}
