//! Statistics queries over a record store.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use crate::filter::{self, RecordsFilter};
use crate::range::{CalendarConfig, RangeLength, resolve_window};
use crate::record::{Record, TypeCatalog};
use crate::selector::select_from;
use crate::statistics::{StatisticsEntry, UntrackedBounds, aggregate, running_statistics};
use crate::store::{Clock, RecordStore, StoreError};
use crate::window::Window;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("statistics request was cancelled")]
    Cancelled,
}

/// Answers statistics queries against a store, a clock and a calendar.
///
/// `Tz` is the zone calendar periods are computed in; the CLI uses
/// [`chrono::Local`].
pub struct StatisticsService<S, Tz: TimeZone> {
    store: S,
    clock: Arc<dyn Clock>,
    calendar: CalendarConfig,
    timezone: Tz,
}

impl<S: RecordStore, Tz: TimeZone> StatisticsService<S, Tz> {
    pub fn new(store: S, clock: Arc<dyn Clock>, calendar: CalendarConfig, timezone: Tz) -> Self {
        Self {
            store,
            clock,
            calendar,
            timezone,
        }
    }

    pub const fn calendar(&self) -> &CalendarConfig {
        &self.calendar
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolves a range relative to the clock's current instant.
    pub fn resolve_window(&self, range: &RangeLength, shift: i32) -> Window {
        self.resolve_window_at(range, shift, self.clock.now())
    }

    /// Resolves a range relative to `at`, in the service's time zone.
    pub fn resolve_window_at(&self, range: &RangeLength, shift: i32, at: DateTime<Utc>) -> Window {
        let at = at.with_timezone(&self.timezone);
        resolve_window(range, shift, &self.calendar, &at)
    }

    /// Computes per-type totals for `window`, keeping only records that pass
    /// every filter clause.
    ///
    /// The store is read once. Cancelling the token abandons the query with
    /// [`EngineError::Cancelled`].
    pub async fn get_statistics(
        &self,
        window: Window,
        filters: &[RecordsFilter],
        include_untracked: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatisticsEntry>, EngineError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("statistics query cancelled");
                Err(EngineError::Cancelled)
            }
            result = self.compute(window, filters, include_untracked) => result,
        }
    }

    async fn compute(
        &self,
        window: Window,
        filters: &[RecordsFilter],
        include_untracked: bool,
    ) -> Result<Vec<StatisticsEntry>, EngineError> {
        let now = self.clock.now();
        let snapshot = self.store.snapshot(window).await?;
        let records = select_from(&snapshot, window, now);
        let catalog = TypeCatalog::new(snapshot.types);

        let untracked = include_untracked.then(|| UntrackedBounds {
            now,
            first_record_start: if window.is_all_time() {
                snapshot.first_record_start
            } else {
                None
            },
        });

        let selected = records.len();
        let records = filter::apply_all(records, filters, &catalog);
        let entries = aggregate(window, &records, &catalog, untracked);
        tracing::debug!(
            selected,
            matched = records.len(),
            entries = entries.len(),
            all_time = window.is_all_time(),
            "computed statistics"
        );
        Ok(entries)
    }

    /// Per-type time of the activities running right now.
    pub async fn get_running_statistics(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<StatisticsEntry>, EngineError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("running statistics query cancelled");
                Err(EngineError::Cancelled)
            }
            result = self.store.running_records() => {
                Ok(running_statistics(&result?, self.clock.now()))
            }
        }
    }

    /// Loads the record types known to the store.
    pub async fn type_catalog(&self) -> Result<TypeCatalog, EngineError> {
        Ok(TypeCatalog::new(self.store.record_types().await?))
    }

    /// True when `record` passes every clause in `filters`.
    pub fn matches_filter(
        &self,
        record: &Record,
        filters: &[RecordsFilter],
        catalog: &TypeCatalog,
    ) -> bool {
        filter::matches(record, filters, catalog)
    }
}

impl<S, Tz: TimeZone> std::fmt::Debug for StatisticsService<S, Tz> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsService")
            .field("calendar", &self.calendar)
            .field("now", &self.clock.now().with_timezone(&Utc))
            .finish_non_exhaustive()
    }
}
