//! Content command implementations.
//!
//! Offline reads straight from the local store; the remote is never
//! contacted.

use crate::cli::ContentCommands;
use crate::cli::commands::{open_storage, truncate};
use crate::error::{Error, Result};
use crate::model::ContentUnit;
use crate::storage::{LocalStore, SqliteStorage, read_or_default};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ListOutput {
    units: Vec<UnitSummary>,
    count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnitSummary {
    id: String,
    name: String,
    parent_group_id: String,
    parent_collection_id: String,
}

impl From<ContentUnit> for UnitSummary {
    fn from(unit: ContentUnit) -> Self {
        Self {
            id: unit.id,
            name: unit.name,
            parent_group_id: unit.parent_group_id,
            parent_collection_id: unit.parent_collection_id,
        }
    }
}

/// Execute content commands.
///
/// # Errors
///
/// Returns `NotInitialized` without a database, or `ContentNotFound` for an
/// unknown id.
pub fn execute(command: &ContentCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    match command {
        ContentCommands::List { group } => list(&storage, group.as_deref(), json),
        ContentCommands::Show { id } => show(&storage, id, json),
    }
}

fn list(storage: &SqliteStorage, group: Option<&str>, json: bool) -> Result<()> {
    let groups = match group {
        Some(g) => vec![g.to_string()],
        None => read_or_default("group ids", storage.list_group_ids()),
    };

    let mut units: Vec<ContentUnit> = groups
        .iter()
        .flat_map(|g| read_or_default("content units", storage.query_content_units_by_group(g)))
        .collect();
    units.sort_by(|a, b| {
        a.parent_group_id
            .cmp(&b.parent_group_id)
            .then_with(|| a.name.cmp(&b.name))
    });

    if json {
        let summaries: Vec<UnitSummary> = units.into_iter().map(UnitSummary::from).collect();
        let output = ListOutput {
            count: summaries.len(),
            units: summaries,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if units.is_empty() {
        println!("No cached content. Run 'edusync sync' while online.");
        return Ok(());
    }

    let mut current_group = "";
    for unit in &units {
        if unit.parent_group_id != current_group {
            current_group = &unit.parent_group_id;
            println!("{}", current_group.bold());
        }
        println!("  {} {}", unit.id.cyan(), truncate(&unit.name, 60));
    }
    println!();
    println!("{} units", units.len());
    Ok(())
}

fn show(storage: &SqliteStorage, id: &str, json: bool) -> Result<()> {
    let unit = storage
        .get_content_unit(id)?
        .ok_or_else(|| Error::ContentNotFound { id: id.to_string() })?;
    let synced = storage.has_ledger_entry(id)?;

    if json {
        let mut value = serde_json::to_value(&unit)?;
        value["synced"] = serde_json::Value::Bool(synced);
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    println!("{}", unit.name.bold());
    println!("  ID:         {}", unit.id);
    println!("  Group:      {}", unit.parent_group_id);
    if !unit.parent_collection_id.is_empty() {
        println!("  Collection: {}", unit.parent_collection_id);
    }
    if !synced {
        println!("  {}", "not in sync ledger".yellow());
    }
    if !unit.description.is_empty() {
        println!();
        println!("{}", unit.description);
    }
    println!();
    println!("{}", unit.body);
    Ok(())
}
