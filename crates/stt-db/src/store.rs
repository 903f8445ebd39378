//! Async [`RecordStore`] adapter over [`Database`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stt_core::{
    Record, RecordStore, RecordType, RunningRecord, StoreError, StoreSnapshot, Window,
};

use crate::{Database, DbError};

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Shares one [`Database`] between tasks.
///
/// Queries run on tokio's blocking pool while holding the connection lock.
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteRecordStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> Result<Self, DbError> {
        Database::open(path).map(Self::new)
    }

    /// Runs `f` with exclusive access to the database, on the calling thread.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&mut Database) -> Result<T, DbError>,
    ) -> Result<T, StoreError> {
        let mut db = self
            .db
            .lock()
            .map_err(|_| StoreError::Unavailable("database lock poisoned".to_string()))?;
        f(&mut *db).map_err(StoreError::from)
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, DbError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let db = db
                .lock()
                .map_err(|_| StoreError::Unavailable("database lock poisoned".to_string()))?;
            f(&*db).map_err(StoreError::from)
        })
        .await
        .map_err(|err| StoreError::Unavailable(err.to_string()))?
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn snapshot(&self, window: Window) -> Result<StoreSnapshot, StoreError> {
        self.run(move |db| db.snapshot(window)).await
    }

    async fn all_records(&self) -> Result<Vec<Record>, StoreError> {
        self.run(Database::list_records).await
    }

    async fn records_in_range(&self, window: Window) -> Result<Vec<Record>, StoreError> {
        self.run(move |db| db.list_records_in_range(window)).await
    }

    async fn running_records(&self) -> Result<Vec<RunningRecord>, StoreError> {
        self.run(Database::list_running_records).await
    }

    async fn first_record_start(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.run(Database::first_record_start).await
    }

    async fn record_types(&self) -> Result<Vec<RecordType>, StoreError> {
        self.run(Database::list_record_types).await
    }
}
