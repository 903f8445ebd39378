//! Stats command: time per record type over a range.
//!
//! This module implements `stt stats`. The range comes from `--range` and
//! `--shift` (or `--from`/`--to`), the filter flags become filter clauses, and
//! the result is printed as a table or as JSON.

use std::fmt::{Display, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;
use stt_core::{
    CategoryItem, CommentItem, Polarity, RangeLength, RecordStore, RecordType, RecordsFilter,
    StatisticsEntry, StatisticsId, StatisticsService, SystemClock, TagItem, TypeCatalog, Window,
};
use stt_db::{Database, SqliteRecordStore};
use tokio_util::sync::CancellationToken;

use super::util::parse_datetime;
use crate::cli::StatsArgs;
use crate::config::Config;

/// Label used for untracked time.
const UNTRACKED_LABEL: &str = "(untracked)";

/// Label for records whose type no longer exists.
const UNKNOWN_TYPE_LABEL: &str = "(unknown type)";

/// Computed statistics ready for display.
#[derive(Debug)]
pub struct StatsData {
    pub generated_at: DateTime<Utc>,
    pub timezone: String,
    pub range: RangeLength,
    pub period: String,
    pub window: Window,
    pub filters: Vec<RecordsFilter>,
    pub rows: Vec<StatsRow>,
}

/// One line of the statistics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsRow {
    pub id: StatisticsId,
    pub name: String,
    pub duration_ms: i64,
}

// ========== Request Building ==========

/// Picks the range from the arguments; `--from`/`--to` take precedence.
pub fn resolve_range(args: &StatsArgs) -> Result<RangeLength> {
    let (Some(from), Some(to)) = (&args.from, &args.to) else {
        return Ok(args.range);
    };
    let start = parse_datetime(from).context("invalid --from")?;
    let end = parse_datetime(to).context("invalid --to")?;
    if end < start {
        tracing::warn!(%start, %end, "custom range ends before it starts; it will be empty");
    }
    Ok(RangeLength::Custom(Window::new(start, end)))
}

/// Turns the filter flags into filter clauses.
pub fn build_filters(args: &StatsArgs, types: &[RecordType]) -> Result<Vec<RecordsFilter>> {
    let mut filters = Vec::new();

    if !args.types.is_empty() {
        let ids = args
            .types
            .iter()
            .map(|name| {
                types
                    .iter()
                    .find(|t| t.name == *name)
                    .map(|t| t.id)
                    .with_context(|| format!("unknown record type '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        filters.push(RecordsFilter::Activity(ids));
    }

    if !args.categories.is_empty() || args.uncategorized {
        let mut items: Vec<CategoryItem> = args
            .categories
            .iter()
            .copied()
            .map(CategoryItem::Categorized)
            .collect();
        if args.uncategorized {
            items.push(CategoryItem::Uncategorized);
        }
        filters.push(RecordsFilter::Category(items));
    }

    let mut comments = Vec::new();
    if args.no_comment {
        comments.push(CommentItem::NoComment);
    }
    if args.any_comment {
        comments.push(CommentItem::AnyComment);
    }
    if let Some(text) = &args.comment {
        comments.push(CommentItem::Text(text.clone()));
    }
    if !comments.is_empty() {
        filters.push(RecordsFilter::Comment(comments));
    }

    if !args.tags.is_empty() || args.untagged {
        let mut items: Vec<TagItem> = args.tags.iter().copied().map(TagItem::Tagged).collect();
        if args.untagged {
            items.push(TagItem::Untagged);
        }
        filters.push(RecordsFilter::SelectedTags(items));
    }

    if !args.exclude_tags.is_empty() {
        filters.push(RecordsFilter::FilteredTags(
            args.exclude_tags.iter().copied().map(TagItem::Tagged).collect(),
        ));
    }

    if !args.only_records.is_empty() {
        filters.push(RecordsFilter::ManuallyFiltered {
            record_ids: args.only_records.clone(),
            polarity: Polarity::Include,
        });
    }
    if !args.exclude_records.is_empty() {
        filters.push(RecordsFilter::ManuallyFiltered {
            record_ids: args.exclude_records.clone(),
            polarity: Polarity::Exclude,
        });
    }

    Ok(filters)
}

/// Names each entry and orders rows for display: longest first, untracked last.
pub fn build_rows(entries: &[StatisticsEntry], catalog: &TypeCatalog) -> Vec<StatsRow> {
    let mut rows: Vec<StatsRow> = entries
        .iter()
        .map(|entry| {
            let name = match entry.id {
                StatisticsId::Type(id) => catalog
                    .get(id)
                    .map_or_else(|| UNKNOWN_TYPE_LABEL.to_string(), |t| t.name.clone()),
                StatisticsId::Untracked => UNTRACKED_LABEL.to_string(),
            };
            StatsRow {
                id: entry.id,
                name,
                duration_ms: entry.duration_ms,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.id.is_untracked()
            .cmp(&b.id.is_untracked())
            .then(b.duration_ms.cmp(&a.duration_ms))
            .then_with(|| a.name.cmp(&b.name))
    });
    rows
}

/// Describes the resolved window for the report header.
pub fn describe_period<Tz>(range: &RangeLength, window: Window, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if window.is_all_time() {
        return "All time".to_string();
    }
    let start = window.start().with_timezone(tz);
    let end = window.end().with_timezone(tz);
    match range {
        RangeLength::Day => format!("{}", start.format("%A, %b %-d, %Y")),
        RangeLength::Week => format!("Week of {}", start.format("%b %-d, %Y")),
        RangeLength::Month => format!("{}", start.format("%B %Y")),
        RangeLength::Year => format!("{}", start.format("%Y")),
        RangeLength::All | RangeLength::Custom(_) | RangeLength::Last { .. } => format!(
            "{} - {}",
            start.format("%b %-d, %Y %H:%M"),
            end.format("%b %-d, %Y %H:%M")
        ),
    }
}

// ========== Duration Formatting ==========

/// Formats milliseconds as duration string.
/// Returns "Xh Ym" if >= 1 hour, "Xm" if < 1 hour.
/// Negative durations are treated as 0m.
pub fn format_duration(ms: i64) -> String {
    if ms < 0 {
        return "0m".to_string();
    }
    let total_minutes = ms / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

// ========== Progress Bar ==========

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: i64, max: i64) -> String {
    if max <= 0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        (ratio * 10.0).round().clamp(0.0, 10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn percent(value: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (value as f64 / total as f64 * 100.0).round() as i64
}

// ========== Text Output ==========

/// Formats the human-readable statistics output.
pub fn format_stats(data: &StatsData) -> String {
    let mut output = String::new();

    writeln!(output, "STATISTICS: {}", data.period).unwrap();
    if !data.filters.is_empty() {
        let filters: Vec<String> = data.filters.iter().map(ToString::to_string).collect();
        writeln!(output, "Filters: {}", filters.join(", ")).unwrap();
    }

    if data.rows.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "No records in this range.").unwrap();
        return output;
    }

    let total: i64 = data.rows.iter().map(|r| r.duration_ms).sum();
    let max = data.rows.iter().map(|r| r.duration_ms).max().unwrap_or(0);

    writeln!(output).unwrap();
    writeln!(output, "BY TYPE").unwrap();
    writeln!(output, "───────").unwrap();
    for row in &data.rows {
        writeln!(
            output,
            "{:<24}{:>8}  {}  {:>3}%",
            row.name,
            format_duration(row.duration_ms),
            progress_bar(row.duration_ms, max),
            percent(row.duration_ms, total)
        )
        .unwrap();
    }

    let untracked: i64 = data
        .rows
        .iter()
        .filter(|r| r.id.is_untracked())
        .map(|r| r.duration_ms)
        .sum();

    writeln!(output).unwrap();
    writeln!(output, "SUMMARY").unwrap();
    writeln!(output, "───────").unwrap();
    writeln!(output, "Tracked:   {}", format_duration(total - untracked)).unwrap();
    if untracked > 0 {
        writeln!(output, "Untracked: {}", format_duration(untracked)).unwrap();
    }

    output
}

// ========== JSON Output ==========

/// JSON statistics structure.
#[derive(Debug, Serialize)]
pub struct JsonStats<'a> {
    pub generated_at: String,
    pub timezone: &'a str,
    pub range: String,
    pub window: JsonWindow,
    pub filters: &'a [RecordsFilter],
    pub entries: &'a [StatsRow],
    pub totals: JsonTotals,
}

#[derive(Debug, Serialize)]
pub struct JsonWindow {
    pub all_time: bool,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JsonTotals {
    pub tracked_ms: i64,
    pub untracked_ms: i64,
}

/// Formats statistics as JSON.
pub fn format_stats_json(data: &StatsData) -> Result<String> {
    let untracked_ms: i64 = data
        .rows
        .iter()
        .filter(|r| r.id.is_untracked())
        .map(|r| r.duration_ms)
        .sum();
    let tracked_ms: i64 = data
        .rows
        .iter()
        .filter(|r| !r.id.is_untracked())
        .map(|r| r.duration_ms)
        .sum();

    let window = if data.window.is_all_time() {
        JsonWindow {
            all_time: true,
            start: None,
            end: None,
        }
    } else {
        JsonWindow {
            all_time: false,
            start: Some(data.window.start().to_rfc3339()),
            end: Some(data.window.end().to_rfc3339()),
        }
    };

    let stats = JsonStats {
        generated_at: data.generated_at.to_rfc3339(),
        timezone: &data.timezone,
        range: data.range.to_string(),
        window,
        filters: &data.filters,
        entries: &data.rows,
        totals: JsonTotals {
            tracked_ms,
            untracked_ms,
        },
    };

    Ok(serde_json::to_string_pretty(&stats)?)
}

// ========== Public Interface ==========

/// Queries the statistics described by `args`.
pub async fn collect(db: Database, config: &Config, args: &StatsArgs) -> Result<StatsData> {
    let generated_at = Utc::now();
    let service = StatisticsService::new(
        SqliteRecordStore::new(db),
        Arc::new(SystemClock),
        config.calendar(),
        Local,
    );

    let types = service.store().record_types().await?;
    let filters = build_filters(args, &types)?;
    let catalog = TypeCatalog::new(types);

    let range = resolve_range(args)?;
    let window = service.resolve_window_at(&range, args.shift, generated_at);
    tracing::debug!(%range, shift = args.shift, ?window, clauses = filters.len(), "resolved stats request");

    let entries = service
        .get_statistics(window, &filters, args.untracked, &CancellationToken::new())
        .await
        .context("failed to compute statistics")?;

    Ok(StatsData {
        generated_at,
        timezone: iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string()),
        range,
        period: describe_period(&range, window, &Local),
        window,
        filters,
        rows: build_rows(&entries, &catalog),
    })
}

/// Runs the stats command.
pub fn run(db: Database, config: &Config, args: &StatsArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let data = runtime.block_on(collect(db, config, args))?;

    if args.json {
        println!("{}", format_stats_json(&data)?);
    } else {
        print!("{}", format_stats(&data));
    }
    Ok(())
}
