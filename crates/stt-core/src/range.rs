//! Range resolution: abstract range descriptors to concrete windows.
//!
//! Calendar arithmetic happens in the caller's time zone, on local dates.
//! Each period is computed directly from today's date plus the shift, never by
//! stepping a calendar repeatedly, so shifting by one always moves exactly one
//! period.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;
use crate::window::Window;

/// Number of days covered by `last` when no count is given.
pub const DEFAULT_LAST_DAYS: u32 = 7;

/// Which period a statistics request covers.
///
/// The offset from the current period is passed separately as `shift`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeLength {
    Day,
    Week,
    Month,
    Year,
    All,
    Custom(Window),
    /// The `days` days leading up to now.
    Last { days: u32 },
}

impl fmt::Display for RangeLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
            Self::Year => write!(f, "year"),
            Self::All => write!(f, "all"),
            Self::Custom(_) => write!(f, "custom"),
            Self::Last { days } => write!(f, "last-{days}"),
        }
    }
}

impl FromStr for RangeLength {
    type Err = ValidationError;

    /// Parses `day`, `week`, `month`, `year`, `all`, `last` or `last-N`.
    ///
    /// Custom ranges need explicit bounds and cannot be parsed from a name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ValidationError::UnknownRange {
            value: s.to_string(),
        };
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all" | "overall" => Ok(Self::All),
            "last" => Ok(Self::Last {
                days: DEFAULT_LAST_DAYS,
            }),
            other => {
                let days = other
                    .strip_prefix("last-")
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(unknown)?;
                Ok(Self::Last { days })
            }
        }
    }
}

/// User calendar preferences applied during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Day a week starts on.
    pub first_day_of_week: Weekday,

    /// Offset of the start of a day from local midnight, in milliseconds.
    /// A value of 3 hours makes a "day" run from 03:00 to 03:00.
    pub day_start_offset_ms: i64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            first_day_of_week: Weekday::Mon,
            day_start_offset_ms: 0,
        }
    }
}

/// Resolves a range and shift to a concrete window.
///
/// `now` supplies both the current instant and the time zone used for
/// calendar arithmetic. `All` always resolves to [`Window::ALL_TIME`] and
/// `Custom` passes its window through; both ignore `shift`. `Last { days }`
/// moves by whole multiples of `days`.
///
/// Arithmetic that leaves chrono's representable range yields an empty window
/// at `now` instead of failing.
pub fn resolve_window<Tz: TimeZone>(
    range: &RangeLength,
    shift: i32,
    calendar: &CalendarConfig,
    now: &DateTime<Tz>,
) -> Window {
    let now_utc = now.with_timezone(&Utc);
    let resolved = match range {
        RangeLength::All => Some(Window::ALL_TIME),
        RangeLength::Custom(window) => Some(*window),
        RangeLength::Last { days } => last_days(*days, shift, now_utc),
        RangeLength::Day | RangeLength::Week | RangeLength::Month | RangeLength::Year => {
            calendar_period(range, shift, calendar, now)
        }
    };

    resolved.unwrap_or_else(|| {
        tracing::warn!(%range, shift, "range arithmetic overflowed, using empty window");
        Window::empty_at(now_utc)
    })
}

/// Local date of `now`, taking the configured day start into account.
///
/// Before the day start (e.g. 01:00 with a 03:00 start) it is still
/// yesterday.
pub fn current_day<Tz: TimeZone>(calendar: &CalendarConfig, now: &DateTime<Tz>) -> NaiveDate {
    let offset = Duration::try_milliseconds(calendar.day_start_offset_ms).unwrap_or(Duration::zero());
    now.naive_local()
        .checked_sub_signed(offset)
        .unwrap_or_else(|| now.naive_local())
        .date()
}

fn calendar_period<Tz: TimeZone>(
    range: &RangeLength,
    shift: i32,
    calendar: &CalendarConfig,
    now: &DateTime<Tz>,
) -> Option<Window> {
    let today = current_day(calendar, now);
    let shift = i64::from(shift);

    let (start_date, end_date) = match range {
        RangeLength::Day => {
            let start = today.checked_add_signed(Duration::try_days(shift)?)?;
            (start, start.checked_add_signed(Duration::days(1))?)
        }
        RangeLength::Week => {
            let days_into_week = (i64::from(today.weekday().num_days_from_monday()) + 7
                - i64::from(calendar.first_day_of_week.num_days_from_monday()))
                % 7;
            let current = today.checked_sub_signed(Duration::days(days_into_week))?;
            let start = current.checked_add_signed(Duration::try_days(shift.checked_mul(7)?)?)?;
            (start, start.checked_add_signed(Duration::days(7))?)
        }
        RangeLength::Month => {
            let first = today.with_day(1)?;
            (add_months(first, shift)?, add_months(first, shift.checked_add(1)?)?)
        }
        RangeLength::Year => {
            let year = i64::from(today.year()).checked_add(shift)?;
            let year = i32::try_from(year).ok()?;
            (
                NaiveDate::from_ymd_opt(year, 1, 1)?,
                NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?,
            )
        }
        RangeLength::All | RangeLength::Custom(_) | RangeLength::Last { .. } => return None,
    };

    let tz = now.timezone();
    let start = day_start(&tz, start_date, calendar.day_start_offset_ms)?;
    let end = day_start(&tz, end_date, calendar.day_start_offset_ms)?;
    Some(Window::new(start, end))
}

fn last_days(days: u32, shift: i32, now: DateTime<Utc>) -> Option<Window> {
    let span = Duration::try_days(i64::from(days))?;
    let moved = Duration::try_days(i64::from(days).checked_mul(i64::from(shift))?)?;
    let end = now.checked_add_signed(moved)?;
    let start = end.checked_sub_signed(span)?;
    Some(Window::new(start, end))
}

fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = u32::try_from(months.unsigned_abs()).ok()?;
    if months >= 0 {
        date.checked_add_months(Months::new(magnitude))
    } else {
        date.checked_sub_months(Months::new(magnitude))
    }
}

/// Converts the start of local day `date` to UTC.
///
/// The day starts at local midnight plus `offset_ms`. On a DST fall-back the
/// earlier instant is used; inside a spring-forward gap, the wall clock one
/// hour later (which is guaranteed to exist).
pub fn day_start<Tz: TimeZone>(tz: &Tz, date: NaiveDate, offset_ms: i64) -> Option<DateTime<Utc>> {
    let offset = Duration::try_milliseconds(offset_ms)?;
    let local = date.and_time(NaiveTime::MIN).checked_add_signed(offset)?;
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => {
            let later: NaiveDateTime = local.checked_add_signed(Duration::hours(1))?;
            tz.from_local_datetime(&later)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}
