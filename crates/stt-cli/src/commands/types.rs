//! `stt types` subcommands.

use std::fmt::Write;

use anyhow::{Context, Result};
use stt_core::{CategoryId, RecordType};
use stt_db::Database;

/// Creates a record type.
pub fn add(db: &mut Database, name: &str, categories: &[CategoryId]) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("record type name must not be empty");
    }
    let id = db
        .insert_record_type(name, categories)
        .with_context(|| format!("failed to create record type '{name}'"))?;
    println!("Created record type {id}: {name}");
    Ok(())
}

/// Lists record types.
pub fn list(db: &Database, json: bool) -> Result<()> {
    let types = db.list_record_types()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&types)?);
    } else {
        print!("{}", format_types(&types));
    }
    Ok(())
}

/// Removes a record type by name.
pub fn remove(db: &Database, name: &str) -> Result<()> {
    let record_type = find_type(db, name)?;
    db.remove_record_type(record_type.id)?;
    println!("Removed record type {}: {name}", record_type.id);
    Ok(())
}

/// Looks up a record type by name.
pub fn find_type(db: &Database, name: &str) -> Result<RecordType> {
    db.find_record_type(name)?.with_context(|| {
        format!("unknown record type '{name}'. Run 'stt types list' to see available types")
    })
}

fn format_types(types: &[RecordType]) -> String {
    let mut output = String::new();
    if types.is_empty() {
        writeln!(output, "No record types. Create one with 'stt types add <name>'.").unwrap();
        return output;
    }
    writeln!(output, "{:<6}{:<24}CATEGORIES", "ID", "NAME").unwrap();
    for record_type in types {
        let categories = if record_type.category_ids.is_empty() {
            "-".to_string()
        } else {
            record_type
                .category_ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        writeln!(
            output,
            "{:<6}{:<24}{categories}",
            record_type.id.to_string(),
            record_type.name
        )
        .unwrap();
    }
    output
}
