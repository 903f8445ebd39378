//! `stt add`, `stt start` and `stt stop`.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use stt_core::{RunningRecord, TagId};
use stt_db::{Database, NewRecord};

use super::stats::format_duration;
use super::types::find_type;
use super::util::parse_datetime;

/// Adds a completed record.
pub fn add(
    db: &mut Database,
    type_name: &str,
    from: &str,
    to: &str,
    comment: &str,
    tags: &[TagId],
) -> Result<()> {
    let record_type = find_type(db, type_name)?;
    let time_started = parse_datetime(from).context("invalid --from")?;
    let time_ended = parse_datetime(to).context("invalid --to")?;

    let id = db.insert_record(&NewRecord {
        type_id: record_type.id,
        time_started,
        time_ended,
        comment: comment.to_string(),
        tag_ids: tags.to_vec(),
    })?;
    let duration = format_duration((time_ended - time_started).num_milliseconds());
    println!("Added record {id}: {} ({duration})", record_type.name);
    Ok(())
}

/// Starts tracking a record type.
pub fn start(
    db: &mut Database,
    type_name: &str,
    at: Option<&str>,
    comment: &str,
    tags: &[TagId],
) -> Result<()> {
    let record_type = find_type(db, type_name)?;
    let time_started = resolve_at(at)?;

    db.start_running(&RunningRecord {
        type_id: record_type.id,
        time_started,
        comment: comment.to_string(),
        tag_ids: tags.to_vec(),
    })?;
    println!(
        "Started {} at {}",
        record_type.name,
        time_started.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

/// Stops a running record type.
pub fn stop(db: &mut Database, type_name: &str, at: Option<&str>) -> Result<()> {
    let record_type = find_type(db, type_name)?;
    let time_ended = resolve_at(at)?;

    let Some(id) = db.stop_running(record_type.id, time_ended)? else {
        anyhow::bail!("{} is not running", record_type.name);
    };
    println!("Stopped {} (record {id})", record_type.name);
    Ok(())
}

fn resolve_at(at: Option<&str>) -> Result<DateTime<Utc>> {
    at.map_or_else(|| Ok(Utc::now()), |s| parse_datetime(s).context("invalid --at"))
}
