//! Per-type duration totals and untracked time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;

use crate::coverage::{Span, covered_duration_ms};
use crate::record::{Record, RunningRecord, TypeCatalog};
use crate::types::{RecordTypeId, StatisticsId};
use crate::window::Window;

/// Total duration attributed to one record type, or to untracked time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatisticsEntry {
    pub id: StatisticsId,
    pub duration_ms: i64,
}

/// Inputs needed to compute untracked time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntrackedBounds {
    pub now: DateTime<Utc>,
    /// Earliest record start in the store; anchors untracked time for the
    /// all-time window.
    pub first_record_start: Option<DateTime<Utc>>,
}

/// Aggregates `records` into per-type totals within `window`.
///
/// Records whose type the catalog doesn't know are left out of the per-type
/// totals but still count as covered time. When `untracked` is given, an
/// untracked entry is appended if the window (bounded by `now`) has any time
/// not covered by a record.
///
/// Entries are ordered by type ID with untracked last.
pub fn aggregate(
    window: Window,
    records: &[Record],
    catalog: &TypeCatalog,
    untracked: Option<UntrackedBounds>,
) -> Vec<StatisticsEntry> {
    let mut groups: BTreeMap<RecordTypeId, Vec<&Record>> = BTreeMap::new();
    let mut skipped = 0usize;
    for record in records {
        if catalog.contains(record.type_id) {
            groups.entry(record.type_id).or_default().push(record);
        } else {
            skipped += 1;
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, "records with unknown type left out of statistics");
    }

    let groups: Vec<(RecordTypeId, Vec<&Record>)> = groups.into_iter().collect();
    let mut entries: Vec<StatisticsEntry> = groups
        .par_iter()
        .map(|(type_id, records)| StatisticsEntry {
            id: StatisticsId::Type(*type_id),
            duration_ms: type_duration_ms(window, records),
        })
        .collect();

    if let Some(bounds) = untracked {
        let duration_ms = untracked_duration_ms(window, records, bounds);
        if duration_ms > 0 {
            entries.push(StatisticsEntry {
                id: StatisticsId::Untracked,
                duration_ms,
            });
        }
    }
    entries
}

/// Per-type time of the records running at `now`.
///
/// Each running record counts `now - start`; one that starts in the future
/// counts zero. Entries are ordered by type ID.
pub fn running_statistics(running: &[RunningRecord], now: DateTime<Utc>) -> Vec<StatisticsEntry> {
    let mut totals: BTreeMap<RecordTypeId, i64> = BTreeMap::new();
    for record in running {
        let duration_ms = (now - record.time_started).num_milliseconds().max(0);
        *totals.entry(record.type_id).or_default() += duration_ms;
    }
    totals
        .into_iter()
        .map(|(type_id, duration_ms)| StatisticsEntry {
            id: StatisticsId::Type(type_id),
            duration_ms,
        })
        .collect()
}

fn type_duration_ms(window: Window, records: &[&Record]) -> i64 {
    if window.is_all_time() {
        records.iter().map(|r| r.duration_ms()).sum()
    } else {
        records
            .iter()
            .map(|r| window.clamp(r.span()).duration_ms())
            .sum()
    }
}

/// Time in the effective window not covered by any record.
///
/// The effective window ends at `now` at the latest. For the all-time
/// window it starts at the earliest known record.
fn untracked_duration_ms(window: Window, records: &[Record], bounds: UntrackedBounds) -> i64 {
    let (start, end) = if window.is_all_time() {
        let earliest_selected = records.iter().map(|r| r.time_started).min();
        let first = match (bounds.first_record_start, earliest_selected) {
            (Some(a), Some(b)) => a.min(b),
            (a, b) => match a.or(b) {
                Some(first) => first,
                None => return 0,
            },
        };
        (first, bounds.now)
    } else {
        (window.start(), window.end().min(bounds.now))
    };
    if end <= start {
        return 0;
    }

    let effective = Window::new(start, end);
    let spans: Vec<Span> = records.iter().map(|r| effective.clamp(r.span())).collect();
    let covered = covered_duration_ms(&spans);
    (effective.duration_ms() - covered).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use crate::types::RecordId;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    const MINUTE_MS: i64 = 60_000;
    const HOUR_MS: i64 = 60 * MINUTE_MS;

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::minutes(minutes)
    }

    fn type_id(id: i64) -> RecordTypeId {
        RecordTypeId::new(id).unwrap()
    }

    fn record(id: i64, type_raw: i64, start: i64, end: i64) -> Record {
        Record::new(RecordId::new(id).unwrap(), type_id(type_raw), ts(start), ts(end))
    }

    fn catalog(ids: &[i64]) -> TypeCatalog {
        TypeCatalog::new(ids.iter().map(|&id| RecordType {
            id: type_id(id),
            name: format!("type-{id}"),
            category_ids: vec![],
        }))
    }

    fn bounds(now: i64) -> Option<UntrackedBounds> {
        Some(UntrackedBounds {
            now: ts(now),
            first_record_start: None,
        })
    }

    fn duration_of(entries: &[StatisticsEntry], id: StatisticsId) -> Option<i64> {
        entries.iter().find(|e| e.id == id).map(|e| e.duration_ms)
    }

    #[test]
    fn per_type_totals_are_clamped_to_window() {
        let records = [
            record(1, 1, -30, 30),
            record(2, 1, 40, 50),
            record(3, 2, 50, 90),
        ];
        let entries = aggregate(Window::new(ts(0), ts(60)), &records, &catalog(&[1, 2]), None);
        assert_eq!(
            entries,
            vec![
                StatisticsEntry {
                    id: StatisticsId::Type(type_id(1)),
                    duration_ms: 40 * MINUTE_MS,
                },
                StatisticsEntry {
                    id: StatisticsId::Type(type_id(2)),
                    duration_ms: 10 * MINUTE_MS,
                },
            ]
        );
    }

    #[test]
    fn untracked_is_window_minus_merged_coverage() {
        // Two overlapping records cover 0..40
        let records = [record(1, 1, 0, 30), record(2, 2, 10, 40)];
        let entries = aggregate(
            Window::new(ts(0), ts(60)),
            &records,
            &catalog(&[1, 2]),
            bounds(120),
        );
        assert_eq!(
            duration_of(&entries, StatisticsId::Untracked),
            Some(20 * MINUTE_MS)
        );
        assert_eq!(entries.last().map(|e| e.id), Some(StatisticsId::Untracked));
    }

    #[test]
    fn untracked_never_counts_future_time() {
        let entries = aggregate(
            Window::new(ts(-60), ts(60)),
            &[],
            &catalog(&[]),
            bounds(0),
        );
        assert_eq!(
            entries,
            vec![StatisticsEntry {
                id: StatisticsId::Untracked,
                duration_ms: HOUR_MS,
            }]
        );
    }

    #[test]
    fn empty_input_over_finite_window_is_all_untracked() {
        let entries = aggregate(Window::new(ts(0), ts(60)), &[], &catalog(&[1]), bounds(600));
        assert_eq!(
            entries,
            vec![StatisticsEntry {
                id: StatisticsId::Untracked,
                duration_ms: 60 * MINUTE_MS,
            }]
        );
    }

    #[test]
    fn window_entirely_in_future_has_no_untracked() {
        let entries = aggregate(Window::new(ts(60), ts(120)), &[], &catalog(&[]), bounds(0));
        assert!(entries.is_empty());
    }

    #[test]
    fn fully_covered_window_emits_no_untracked_entry() {
        let records = [record(1, 1, -10, 70)];
        let entries = aggregate(
            Window::new(ts(0), ts(60)),
            &records,
            &catalog(&[1]),
            bounds(600),
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(duration_of(&entries, StatisticsId::Untracked), None);
    }

    #[test]
    fn unknown_types_are_skipped_but_still_cover_time() {
        let records = [record(1, 1, 0, 20), record(2, 99, 20, 60)];
        let entries = aggregate(
            Window::new(ts(0), ts(60)),
            &records,
            &catalog(&[1]),
            bounds(600),
        );
        assert_eq!(
            entries,
            vec![StatisticsEntry {
                id: StatisticsId::Type(type_id(1)),
                duration_ms: 20 * MINUTE_MS,
            }]
        );
    }

    #[test]
    fn all_time_sums_unclamped_and_anchors_untracked_at_first_record() {
        let records = [record(1, 1, -600, -540), record(2, 2, -60, 0)];
        let entries = aggregate(
            Window::ALL_TIME,
            &records,
            &catalog(&[1, 2]),
            Some(UntrackedBounds {
                now: ts(60),
                first_record_start: Some(ts(-600)),
            }),
        );
        assert_eq!(duration_of(&entries, StatisticsId::Type(type_id(1))), Some(HOUR_MS));
        assert_eq!(duration_of(&entries, StatisticsId::Type(type_id(2))), Some(HOUR_MS));
        // 660 minutes elapsed since the first record, 120 of them tracked
        assert_eq!(
            duration_of(&entries, StatisticsId::Untracked),
            Some(540 * MINUTE_MS)
        );
    }

    #[test]
    fn all_time_without_records_has_no_untracked() {
        let entries = aggregate(Window::ALL_TIME, &[], &catalog(&[]), bounds(0));
        assert!(entries.is_empty());
    }

    #[test]
    fn all_time_falls_back_to_selected_records_for_first_start() {
        let records = [record(1, 1, -120, -60)];
        let entries = aggregate(Window::ALL_TIME, &records, &catalog(&[1]), bounds(0));
        assert_eq!(duration_of(&entries, StatisticsId::Untracked), Some(HOUR_MS));
    }

    fn running(type_raw: i64, start: i64) -> RunningRecord {
        RunningRecord {
            type_id: type_id(type_raw),
            time_started: ts(start),
            comment: String::new(),
            tag_ids: vec![],
        }
    }

    #[test]
    fn running_statistics_group_by_type() {
        let entries = running_statistics(&[running(2, -30), running(1, -90)], ts(0));
        assert_eq!(
            entries,
            vec![
                StatisticsEntry {
                    id: StatisticsId::Type(type_id(1)),
                    duration_ms: 90 * MINUTE_MS,
                },
                StatisticsEntry {
                    id: StatisticsId::Type(type_id(2)),
                    duration_ms: 30 * MINUTE_MS,
                },
            ]
        );
    }

    #[test]
    fn running_record_starting_later_counts_zero() {
        assert_eq!(
            running_statistics(&[running(1, 15)], ts(0)),
            vec![StatisticsEntry {
                id: StatisticsId::Type(type_id(1)),
                duration_ms: 0,
            }]
        );
        assert!(running_statistics(&[], ts(0)).is_empty());
    }

    proptest! {
        #[test]
        fn disjoint_records_plus_untracked_fill_the_window(
            layout in prop::collection::vec((0i64..30, 1i64..30, 1i64..4), 0..12)
        ) {
            // Lay records end to end with gaps so none overlap.
            let mut cursor = -20;
            let mut records = Vec::new();
            for (i, (gap, len, type_raw)) in layout.iter().enumerate() {
                let start = cursor + gap;
                let end = start + len;
                records.push(record(i64::try_from(i).unwrap() + 1, *type_raw, start, end));
                cursor = end;
            }
            let window = Window::new(ts(0), ts(240));
            let entries = aggregate(window, &records, &catalog(&[1, 2, 3]), bounds(10_000));
            let total: i64 = entries.iter().map(|e| e.duration_ms).sum();
            prop_assert_eq!(total, window.duration_ms());
        }

        #[test]
        fn totals_never_exceed_window_without_overlap(
            layout in prop::collection::vec((0i64..30, 1i64..30), 0..12),
            now in -60i64..300
        ) {
            let mut cursor = -20;
            let mut records = Vec::new();
            for (i, (gap, len)) in layout.iter().enumerate() {
                let start = cursor + gap;
                let end = start + len;
                records.push(record(i64::try_from(i).unwrap() + 1, 1, start, end));
                cursor = end;
            }
            let window = Window::new(ts(0), ts(240));
            let entries = aggregate(window, &records, &catalog(&[1]), bounds(now));
            let total: i64 = entries.iter().map(|e| e.duration_ms).sum();
            prop_assert!(entries.iter().all(|e| e.duration_ms >= 0));
            prop_assert!(total <= window.duration_ms());
        }
    }
}
