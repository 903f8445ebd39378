//! Core domain logic for the time tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Range resolution: turning "this week" or "last month" into a concrete window
//! - Coverage: merging overlapping intervals to measure tracked time
//! - Statistics: per-type totals plus untracked time within a window
//! - Filtering: compound filters over the activity log
//! - A cancellable query service and a latest-request-wins worker on top

pub mod coverage;
pub mod filter;
pub mod range;
pub mod record;
pub mod selector;
pub mod service;
pub mod statistics;
pub mod store;
pub mod types;
pub mod window;
pub mod worker;

pub use coverage::{Span, covered_duration_ms, merge_spans};
pub use filter::{CategoryItem, CommentItem, FilterKind, Polarity, RecordsFilter, TagItem};
pub use range::{CalendarConfig, RangeLength, resolve_window};
pub use record::{Record, RecordType, RunningRecord, TypeCatalog};
pub use selector::{clamp_to_window, select, select_from};
pub use service::{EngineError, StatisticsService};
pub use statistics::{StatisticsEntry, UntrackedBounds, aggregate, running_statistics};
pub use store::{
    Clock, FixedClock, InMemoryRecordStore, RecordStore, StoreError, StoreSnapshot, SystemClock,
};
pub use types::{CategoryId, RecordId, RecordTypeId, StatisticsId, TagId, ValidationError};
pub use window::Window;
pub use worker::{
    StatisticsReport, StatisticsRequest, StatisticsState, StatisticsWorker, StatisticsWorkerHandle,
    WorkerConfig,
};
