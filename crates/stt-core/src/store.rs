//! Storage and clock seams the engine reads through.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::record::{Record, RecordType, RunningRecord};
use crate::types::{RecordId, RecordTypeId};
use crate::window::Window;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store backend failed: {0}")]
    Backend(String),

    #[error("record store is unavailable: {0}")]
    Unavailable(String),
}

/// Everything one statistics query reads, taken at a single point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Completed records intersecting the window, or all of them for the
    /// all-time sentinel. Empty for an empty window.
    pub records: Vec<Record>,
    pub running: Vec<RunningRecord>,
    pub types: Vec<RecordType>,
    /// Start of the earliest completed record in the whole store.
    pub first_record_start: Option<DateTime<Utc>>,
}

/// Read access to persisted records.
///
/// Implementations must be safe to call from several tasks at once.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads records, running records, types and the earliest start for
    /// `window` as one consistent view. A write may land before or after the
    /// snapshot, never between its parts.
    async fn snapshot(&self, window: Window) -> Result<StoreSnapshot, StoreError>;

    /// Every completed record.
    async fn all_records(&self) -> Result<Vec<Record>, StoreError>;

    /// Completed records intersecting `window` (half-open overlap).
    async fn records_in_range(&self, window: Window) -> Result<Vec<Record>, StoreError>;

    /// Activities started and not yet stopped.
    async fn running_records(&self) -> Result<Vec<RunningRecord>, StoreError>;

    /// Start of the earliest completed record, if any.
    async fn first_record_start(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn record_types(&self) -> Result<Vec<RecordType>, StoreError>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn snapshot(&self, window: Window) -> Result<StoreSnapshot, StoreError> {
        (**self).snapshot(window).await
    }

    async fn all_records(&self) -> Result<Vec<Record>, StoreError> {
        (**self).all_records().await
    }

    async fn records_in_range(&self, window: Window) -> Result<Vec<Record>, StoreError> {
        (**self).records_in_range(window).await
    }

    async fn running_records(&self) -> Result<Vec<RunningRecord>, StoreError> {
        (**self).running_records().await
    }

    async fn first_record_start(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        (**self).first_record_start().await
    }

    async fn record_types(&self) -> Result<Vec<RecordType>, StoreError> {
        (**self).record_types().await
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Default)]
struct Contents {
    records: Vec<Record>,
    running: Vec<RunningRecord>,
    types: Vec<RecordType>,
}

/// A [`RecordStore`] held in memory, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    contents: Arc<Mutex<Contents>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: impl IntoIterator<Item = RecordType>) -> Self {
        let store = Self::new();
        store.lock().types.extend(types);
        store
    }

    pub fn add_record(&self, record: Record) {
        self.lock().records.push(record);
    }

    pub fn add_running(&self, running: RunningRecord) {
        self.lock().running.push(running);
    }

    pub fn add_type(&self, record_type: RecordType) {
        self.lock().types.push(record_type);
    }

    /// Moves the running record of `type_id` into the completed records,
    /// ending it at `at`. Returns false if that type was not running.
    pub fn stop_running(&self, id: RecordId, type_id: RecordTypeId, at: DateTime<Utc>) -> bool {
        let mut contents = self.lock();
        let Some(index) = contents.running.iter().position(|r| r.type_id == type_id) else {
            return false;
        };
        let running = contents.running.remove(index);
        let mut record = running.materialize(at);
        record.id = Some(id);
        contents.records.push(record);
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Contents> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Contents {
    fn records_in_range(&self, window: Window) -> Vec<Record> {
        if window.is_empty() {
            return Vec::new();
        }
        self.records
            .iter()
            .filter(|r| window.overlaps(r.time_started, r.time_ended))
            .cloned()
            .collect()
    }

    fn first_record_start(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.time_started).min()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn snapshot(&self, window: Window) -> Result<StoreSnapshot, StoreError> {
        let contents = self.lock();
        Ok(StoreSnapshot {
            records: contents.records_in_range(window),
            running: contents.running.clone(),
            types: contents.types.clone(),
            first_record_start: contents.first_record_start(),
        })
    }

    async fn all_records(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.lock().records.clone())
    }

    async fn records_in_range(&self, window: Window) -> Result<Vec<Record>, StoreError> {
        Ok(self.lock().records_in_range(window))
    }

    async fn running_records(&self) -> Result<Vec<RunningRecord>, StoreError> {
        Ok(self.lock().running.clone())
    }

    async fn first_record_start(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.lock().first_record_start())
    }

    async fn record_types(&self) -> Result<Vec<RecordType>, StoreError> {
        Ok(self.lock().types.clone())
    }
}
