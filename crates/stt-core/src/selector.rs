//! Selecting the records that intersect a window.

use chrono::{DateTime, Utc};

use crate::record::Record;
use crate::store::{RecordStore, StoreError, StoreSnapshot};
use crate::window::Window;

/// Returns the record cut down to `window`.
///
/// A record already inside the window is returned as is, so clamping twice
/// gives the same result as clamping once. The all-time sentinel never clamps.
pub fn clamp_to_window(record: &Record, window: Window) -> Record {
    if window.contains(record.time_started, record.time_ended) {
        return record.clone();
    }
    let span = window.clamp(record.span());
    Record {
        time_started: span.start,
        time_ended: span.end,
        ..record.clone()
    }
}

/// Fetches completed and in-progress records intersecting `window`.
///
/// The store is read through a single snapshot. See [`select_from`].
pub async fn select<S>(
    store: &S,
    window: Window,
    now: DateTime<Utc>,
) -> Result<Vec<Record>, StoreError>
where
    S: RecordStore + ?Sized,
{
    let snapshot = store.snapshot(window).await?;
    Ok(select_from(&snapshot, window, now))
}

/// Picks the records of `snapshot` intersecting `window`.
///
/// Running records are materialized as ending at `now`. For the all-time
/// sentinel every stored and running record is returned; an empty window
/// selects nothing. Records are not clamped here; callers clamp when summing.
pub fn select_from(snapshot: &StoreSnapshot, window: Window, now: DateTime<Utc>) -> Vec<Record> {
    if window.is_empty() {
        return Vec::new();
    }

    let mut records: Vec<Record> = snapshot
        .records
        .iter()
        .filter(|r| window.overlaps(r.time_started, r.time_ended))
        .cloned()
        .collect();
    records.extend(
        snapshot
            .running
            .iter()
            .filter(|r| {
                window.is_all_time() || (r.time_started < window.end() && now > window.start())
            })
            .map(|r| r.materialize(now)),
    );

    tracing::debug!(
        window_start = %window.start(),
        window_end = %window.end(),
        selected = records.len(),
        running = snapshot.running.len(),
        "selected records"
    );
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RunningRecord;
    use crate::store::InMemoryRecordStore;
    use crate::types::{RecordId, RecordTypeId};
    use chrono::{Duration, TimeZone};

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::minutes(minutes)
    }

    fn record(id: i64, start: i64, end: i64) -> Record {
        Record::new(
            RecordId::new(id).unwrap(),
            RecordTypeId::new(1).unwrap(),
            ts(start),
            ts(end),
        )
    }

    fn running(start: i64) -> RunningRecord {
        RunningRecord {
            type_id: RecordTypeId::new(2).unwrap(),
            time_started: ts(start),
            comment: String::new(),
            tag_ids: vec![],
        }
    }

    #[test]
    fn contained_record_is_unchanged() {
        let r = record(1, 10, 20);
        assert_eq!(clamp_to_window(&r, Window::new(ts(0), ts(60))), r);
    }

    #[test]
    fn clamp_trims_and_is_idempotent() {
        let window = Window::new(ts(0), ts(60));
        let once = clamp_to_window(&record(1, -30, 90), window);
        assert_eq!(once.time_started, ts(0));
        assert_eq!(once.time_ended, ts(60));
        assert_eq!(once.id, Some(RecordId::new(1).unwrap()));
        assert_eq!(clamp_to_window(&once, window), once);
    }

    #[test]
    fn sentinel_never_clamps() {
        let r = record(1, -1_000, 1_000);
        assert_eq!(clamp_to_window(&r, Window::ALL_TIME), r);
    }

    #[tokio::test]
    async fn selects_intersecting_and_running_records() {
        let store = InMemoryRecordStore::new();
        store.add_record(record(1, -30, 5));
        store.add_record(record(2, 20, 40));
        store.add_record(record(3, 60, 90));
        store.add_record(record(4, -60, 0));
        store.add_running(running(50));
        store.add_running(running(70));

        let selected = select(&store, Window::new(ts(0), ts(60)), ts(80)).await.unwrap();
        let stored: Vec<i64> = selected
            .iter()
            .filter_map(|r| r.id)
            .map(RecordId::get)
            .collect();
        assert_eq!(stored, vec![1, 2]);

        let materialized: Vec<&Record> = selected.iter().filter(|r| r.is_running()).collect();
        assert_eq!(materialized.len(), 1);
        assert_eq!(materialized[0].time_started, ts(50));
        assert_eq!(materialized[0].time_ended, ts(80));
    }

    #[tokio::test]
    async fn running_record_is_dropped_when_now_precedes_window() {
        let store = InMemoryRecordStore::new();
        store.add_running(running(-10));
        let selected = select(&store, Window::new(ts(0), ts(60)), ts(-5)).await.unwrap();
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn empty_window_selects_nothing() {
        let store = InMemoryRecordStore::new();
        store.add_record(record(1, -60, 60));
        store.add_running(running(-30));
        let selected = select(&store, Window::empty_at(ts(0)), ts(30)).await.unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn select_from_drops_records_outside_window() {
        let snapshot = StoreSnapshot {
            records: vec![record(1, -30, 5), record(2, 60, 90)],
            ..StoreSnapshot::default()
        };
        let selected = select_from(&snapshot, Window::new(ts(0), ts(60)), ts(120));
        assert_eq!(selected, vec![record(1, -30, 5)]);
    }

    #[tokio::test]
    async fn all_time_returns_everything() {
        let store = InMemoryRecordStore::new();
        store.add_record(record(1, -10_000, -9_000));
        store.add_record(record(2, 0, 10));
        store.add_running(running(100));

        let selected = select(&store, Window::ALL_TIME, ts(120)).await.unwrap();
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].time_started, ts(-10_000));
    }
}
