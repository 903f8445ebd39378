//! Activity records and the record type catalog.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coverage::Span;
use crate::types::{CategoryId, RecordId, RecordTypeId, TagId};

/// A time-stamped activity interval.
///
/// Completed records carry the ID the store assigned them. In-progress
/// records are materialized at read time with `id = None` and
/// `time_ended = now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub type_id: RecordTypeId,
    pub time_started: DateTime<Utc>,
    pub time_ended: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
}

impl Record {
    /// Creates a completed record with no comment or tags.
    pub const fn new(
        id: RecordId,
        type_id: RecordTypeId,
        time_started: DateTime<Utc>,
        time_ended: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(id),
            type_id,
            time_started,
            time_ended,
            comment: String::new(),
            tag_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tag_ids: impl IntoIterator<Item = TagId>) -> Self {
        self.tag_ids = tag_ids.into_iter().collect();
        self
    }

    pub const fn span(&self) -> Span {
        Span::new(self.time_started, self.time_ended)
    }

    /// Duration in milliseconds; a record ending before it starts counts as zero.
    pub fn duration_ms(&self) -> i64 {
        self.span().duration_ms()
    }

    pub const fn is_running(&self) -> bool {
        self.id.is_none()
    }
}

/// An activity that has been started but not stopped yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningRecord {
    pub type_id: RecordTypeId,
    pub time_started: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
}

impl RunningRecord {
    /// Materializes the running record as an interval ending at `now`.
    pub fn materialize(&self, now: DateTime<Utc>) -> Record {
        Record {
            id: None,
            type_id: self.type_id,
            time_started: self.time_started,
            time_ended: now,
            comment: self.comment.clone(),
            tag_ids: self.tag_ids.clone(),
        }
    }
}

/// An activity type that records are tracked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub id: RecordTypeId,
    pub name: String,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
}

/// Lookup of the record types known to the caller.
///
/// Records whose type is absent are left out of per-type statistics, and
/// count as uncategorized for category filters.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: HashMap<RecordTypeId, RecordType>,
}

impl TypeCatalog {
    pub fn new(types: impl IntoIterator<Item = RecordType>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    pub fn contains(&self, id: RecordTypeId) -> bool {
        self.types.contains_key(&id)
    }

    pub fn get(&self, id: RecordTypeId) -> Option<&RecordType> {
        self.types.get(&id)
    }

    /// Categories of a type; empty for unknown or uncategorized types.
    pub fn categories(&self, id: RecordTypeId) -> &[CategoryId] {
        self.types
            .get(&id)
            .map_or(&[], |t| t.category_ids.as_slice())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::minutes(minutes)
    }

    fn type_id(id: i64) -> RecordTypeId {
        RecordTypeId::new(id).unwrap()
    }

    #[test]
    fn running_record_materializes_at_now() {
        let running = RunningRecord {
            type_id: type_id(1),
            time_started: ts(0),
            comment: "reading".to_string(),
            tag_ids: vec![TagId::new(4).unwrap()],
        };
        let record = running.materialize(ts(30));
        assert!(record.is_running());
        assert_eq!(record.time_ended, ts(30));
        assert_eq!(record.duration_ms(), 30 * 60_000);
        assert_eq!(record.comment, "reading");
    }

    #[test]
    fn inverted_record_has_zero_duration() {
        let record = Record::new(RecordId::new(1).unwrap(), type_id(1), ts(10), ts(0));
        assert_eq!(record.duration_ms(), 0);
    }

    #[test]
    fn catalog_reports_categories() {
        let catalog = TypeCatalog::new([
            RecordType {
                id: type_id(1),
                name: "work".to_string(),
                category_ids: vec![CategoryId::new(9).unwrap()],
            },
            RecordType {
                id: type_id(2),
                name: "sleep".to_string(),
                category_ids: vec![],
            },
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.categories(type_id(1)), &[CategoryId::new(9).unwrap()]);
        assert!(catalog.categories(type_id(2)).is_empty());
        assert!(catalog.categories(type_id(3)).is_empty());
        assert!(!catalog.contains(type_id(3)));
    }

    #[test]
    fn record_serde_skips_missing_id() {
        let running = RunningRecord {
            type_id: type_id(2),
            time_started: ts(0),
            comment: String::new(),
            tag_ids: vec![],
        }
        .materialize(ts(5));
        let json = serde_json::to_value(&running).unwrap();
        assert!(json.get("id").is_none());
        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, running);
    }
}
