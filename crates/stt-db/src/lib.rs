//! Storage layer for the time tracker.
//!
//! Provides persistence for record types, records, and running records using
//! `rusqlite`, plus [`SqliteRecordStore`], the async [`RecordStore`]
//! adapter the statistics engine reads through.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! [`SqliteRecordStore`] serializes access with a mutex and runs queries on the
//! blocking thread pool.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in ISO 8601 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`). Every value uses the same width, so
//! lexicographic ordering matches chronological ordering and range queries can
//! compare the text directly.
//!
//! ## Record Types
//!
//! Records reference their type by ID without a foreign key. Removing a type
//! keeps its records; the engine then leaves them out of per-type totals.
//!
//! [`RecordStore`]: stt_core::RecordStore

mod store;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use stt_core::{
    CategoryId, Record, RecordId, RecordType, RecordTypeId, RunningRecord, StoreSnapshot, TagId,
    ValidationError, Window,
};
use thiserror::Error;

pub use store::SqliteRecordStore;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {entity}: {timestamp}")]
    TimestampParse {
        entity: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored ID is not a valid identifier.
    #[error(transparent)]
    InvalidId(#[from] ValidationError),
    /// A record would end before it starts.
    #[error("record ends before it starts ({started} > {ended})")]
    InvertedRecord {
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
    },
    #[error("unknown record type: {0}")]
    UnknownType(RecordTypeId),
    #[error("record type {0} is already running")]
    AlreadyRunning(RecordTypeId),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A completed record ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub type_id: RecordTypeId,
    pub time_started: DateTime<Utc>,
    pub time_ended: DateTime<Utc>,
    pub comment: String,
    pub tag_ids: Vec<TagId>,
}

type RecordRow = (i64, i64, String, String, String);

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS record_types (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS record_type_categories (
                type_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                PRIMARY KEY (type_id, category_id),
                FOREIGN KEY (type_id) REFERENCES record_types(id) ON DELETE CASCADE
            );

            -- Completed records
            -- time_started/time_ended: ISO 8601 (e.g., '2024-01-15T10:30:00.000Z')
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type_id INTEGER NOT NULL,
                time_started TEXT NOT NULL,
                time_ended TEXT NOT NULL,
                comment TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_records_started ON records(time_started);
            CREATE INDEX IF NOT EXISTS idx_records_ended ON records(time_ended);
            CREATE INDEX IF NOT EXISTS idx_records_type ON records(type_id);

            CREATE TABLE IF NOT EXISTS record_tags (
                record_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (record_id, tag_id),
                FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE
            );

            -- At most one running record per type
            CREATE TABLE IF NOT EXISTS running_records (
                type_id INTEGER PRIMARY KEY,
                time_started TEXT NOT NULL,
                comment TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS running_record_tags (
                type_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (type_id, tag_id),
                FOREIGN KEY (type_id) REFERENCES running_records(type_id) ON DELETE CASCADE
            );
            ",
        )?;
        Ok(())
    }

    /// Creates a record type with its categories and returns its ID.
    pub fn insert_record_type(
        &mut self,
        name: &str,
        category_ids: &[CategoryId],
    ) -> Result<RecordTypeId, DbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO record_types (name, created_at) VALUES (?, ?)",
            params![name, format_timestamp(Utc::now())],
        )?;
        let id = RecordTypeId::new(tx.last_insert_rowid())?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO record_type_categories (type_id, category_id) VALUES (?, ?)",
            )?;
            for category in category_ids {
                stmt.execute(params![id.get(), category.get()])?;
            }
        }
        tx.commit()?;
        tracing::debug!(%id, name, categories = category_ids.len(), "inserted record type");
        Ok(id)
    }

    /// Removes a record type. Its records are kept.
    ///
    /// Returns `false` if no such type existed.
    pub fn remove_record_type(&self, id: RecordTypeId) -> Result<bool, DbError> {
        let removed = self
            .conn
            .execute("DELETE FROM record_types WHERE id = ?", [id.get()])?;
        Ok(removed > 0)
    }

    /// Lists record types ordered by ID.
    pub fn list_record_types(&self) -> Result<Vec<RecordType>, DbError> {
        let mut categories: HashMap<i64, Vec<CategoryId>> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT type_id, category_id FROM record_type_categories ORDER BY type_id, category_id",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (type_id, category_id) = row?;
                categories
                    .entry(type_id)
                    .or_default()
                    .push(CategoryId::new(category_id)?);
            }
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM record_types ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        let mut types = Vec::new();
        for row in rows {
            let (id, name) = row?;
            types.push(RecordType {
                id: RecordTypeId::new(id)?,
                name,
                category_ids: categories.remove(&id).unwrap_or_default(),
            });
        }
        Ok(types)
    }

    /// Finds a record type by exact name.
    pub fn find_record_type(&self, name: &str) -> Result<Option<RecordType>, DbError> {
        Ok(self
            .list_record_types()?
            .into_iter()
            .find(|record_type| record_type.name == name))
    }

    fn record_type_exists(&self, id: RecordTypeId) -> Result<bool, DbError> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT id FROM record_types WHERE id = ?", [id.get()], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Stores a completed record with its tags and returns its ID.
    pub fn insert_record(&mut self, record: &NewRecord) -> Result<RecordId, DbError> {
        if record.time_ended < record.time_started {
            return Err(DbError::InvertedRecord {
                started: record.time_started,
                ended: record.time_ended,
            });
        }
        if !self.record_type_exists(record.type_id)? {
            return Err(DbError::UnknownType(record.type_id));
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO records (type_id, time_started, time_ended, comment) VALUES (?, ?, ?, ?)",
            params![
                record.type_id.get(),
                format_timestamp(record.time_started),
                format_timestamp(record.time_ended),
                record.comment,
            ],
        )?;
        let id = RecordId::new(tx.last_insert_rowid())?;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO record_tags (record_id, tag_id) VALUES (?, ?)")?;
            for tag in &record.tag_ids {
                stmt.execute(params![id.get(), tag.get()])?;
            }
        }
        tx.commit()?;
        Ok(id)
    }

    /// Deletes a record and its tags. Returns `false` if it didn't exist.
    pub fn remove_record(&self, id: RecordId) -> Result<bool, DbError> {
        let removed = self
            .conn
            .execute("DELETE FROM records WHERE id = ?", [id.get()])?;
        Ok(removed > 0)
    }

    /// Lists all completed records ordered by start time then ID.
    pub fn list_records(&self) -> Result<Vec<Record>, DbError> {
        self.query_records(None)
    }

    /// Lists completed records intersecting the window.
    ///
    /// Uses half-open overlap: a record ending exactly at the window start is
    /// excluded. The all-time window returns every record.
    pub fn list_records_in_range(&self, window: Window) -> Result<Vec<Record>, DbError> {
        if window.is_all_time() {
            return self.list_records();
        }
        if window.is_empty() {
            return Ok(Vec::new());
        }
        self.query_records(Some((
            format_timestamp(window.start()),
            format_timestamp(window.end()),
        )))
    }

    fn query_records(&self, range: Option<(String, String)>) -> Result<Vec<Record>, DbError> {
        let (condition, bounds) = match range {
            Some((start, end)) => ("WHERE r.time_started < ?1 AND r.time_ended > ?2", vec![end, start]),
            None => ("", Vec::new()),
        };

        let mut tags: HashMap<i64, Vec<TagId>> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(&format!(
                "
                SELECT t.record_id, t.tag_id
                FROM record_tags t
                JOIN records r ON r.id = t.record_id
                {condition}
                ORDER BY t.record_id, t.tag_id
                "
            ))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(bounds.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (record_id, tag_id) = row?;
                tags.entry(record_id).or_default().push(TagId::new(tag_id)?);
            }
        }

        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT r.id, r.type_id, r.time_started, r.time_ended, r.comment
            FROM records r
            {condition}
            ORDER BY r.time_started ASC, r.id ASC
            "
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(bounds.iter()), |row| {
            Ok::<RecordRow, rusqlite::Error>((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (id, type_id, started, ended, comment) = row?;
            let entity = format!("record {id}");
            records.push(Record {
                id: Some(RecordId::new(id)?),
                type_id: RecordTypeId::new(type_id)?,
                time_started: parse_timestamp(&started, &entity)?,
                time_ended: parse_timestamp(&ended, &entity)?,
                comment,
                tag_ids: tags.remove(&id).unwrap_or_default(),
            });
        }
        Ok(records)
    }

    /// Start of the earliest completed record.
    pub fn first_record_start(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let first: Option<String> = self
            .conn
            .query_row("SELECT MIN(time_started) FROM records", [], |row| row.get(0))?;
        first
            .map(|timestamp| parse_timestamp(&timestamp, "first record"))
            .transpose()
    }

    /// Reads everything a statistics query needs inside one read transaction,
    /// so a concurrent `stop` from another connection is seen entirely or
    /// not at all.
    pub fn snapshot(&self, window: Window) -> Result<StoreSnapshot, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let snapshot = StoreSnapshot {
            records: self.list_records_in_range(window)?,
            running: self.list_running_records()?,
            types: self.list_record_types()?,
            first_record_start: self.first_record_start()?,
        };
        tx.commit()?;
        Ok(snapshot)
    }

    /// Starts tracking a type. Fails if the type is already running.
    pub fn start_running(&mut self, running: &RunningRecord) -> Result<(), DbError> {
        if !self.record_type_exists(running.type_id)? {
            return Err(DbError::UnknownType(running.type_id));
        }
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO running_records (type_id, time_started, comment) VALUES (?, ?, ?)",
            params![
                running.type_id.get(),
                format_timestamp(running.time_started),
                running.comment,
            ],
        )?;
        if inserted == 0 {
            return Err(DbError::AlreadyRunning(running.type_id));
        }
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO running_record_tags (type_id, tag_id) VALUES (?, ?)",
            )?;
            for tag in &running.tag_ids {
                stmt.execute(params![running.type_id.get(), tag.get()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Stops a running type at `at`, storing it as a completed record.
    ///
    /// Returns `None` if the type wasn't running. A stop time before the
    /// start produces a zero-length record.
    pub fn stop_running(
        &mut self,
        type_id: RecordTypeId,
        at: DateTime<Utc>,
    ) -> Result<Option<RecordId>, DbError> {
        let Some(running) = self
            .list_running_records()?
            .into_iter()
            .find(|running| running.type_id == type_id)
        else {
            return Ok(None);
        };

        let ended = at.max(running.time_started);
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO records (type_id, time_started, time_ended, comment) VALUES (?, ?, ?, ?)",
            params![
                type_id.get(),
                format_timestamp(running.time_started),
                format_timestamp(ended),
                running.comment,
            ],
        )?;
        let id = RecordId::new(tx.last_insert_rowid())?;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO record_tags (record_id, tag_id) VALUES (?, ?)")?;
            for tag in &running.tag_ids {
                stmt.execute(params![id.get(), tag.get()])?;
            }
        }
        tx.execute("DELETE FROM running_records WHERE type_id = ?", [type_id.get()])?;
        tx.commit()?;
        tracing::debug!(%type_id, record_id = %id, "stopped running record");
        Ok(Some(id))
    }

    /// Lists running records ordered by start time.
    pub fn list_running_records(&self) -> Result<Vec<RunningRecord>, DbError> {
        let mut tags: HashMap<i64, Vec<TagId>> = HashMap::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT type_id, tag_id FROM running_record_tags ORDER BY type_id, tag_id")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (type_id, tag_id) = row?;
                tags.entry(type_id).or_default().push(TagId::new(tag_id)?);
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT type_id, time_started, comment FROM running_records ORDER BY time_started ASC, type_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut running = Vec::new();
        for row in rows {
            let (type_id, started, comment) = row?;
            running.push(RunningRecord {
                type_id: RecordTypeId::new(type_id)?,
                time_started: parse_timestamp(&started, &format!("running type {type_id}"))?,
                comment,
                tag_ids: tags.remove(&type_id).unwrap_or_default(),
            });
        }
        Ok(running)
    }
}

fn parse_timestamp(timestamp: &str, entity: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            entity: entity.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
