//! Collection command implementations.
//!
//! Offline reads of mirrored reference collections.

use crate::cli::CollectionCommands;
use crate::cli::commands::{open_storage, truncate};
use crate::error::{Error, Result};
use crate::model::{CollectionDocument, CollectionSummary};
use crate::storage::{LocalStore, SqliteStorage, read_or_default};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct CollectionsOutput<'a> {
    collections: &'a [CollectionSummary],
    count: usize,
}

#[derive(Serialize)]
struct DocumentsOutput<'a> {
    collection: &'a str,
    documents: Vec<&'a serde_json::Value>,
    count: usize,
}

/// Execute collection commands.
///
/// # Errors
///
/// Returns `NotInitialized` without a database, or `DocumentNotFound` for an
/// unknown document.
pub fn execute(command: &CollectionCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    match command {
        CollectionCommands::List { name: None } => list_collections(&storage, json),
        CollectionCommands::List { name: Some(name) } => list_documents(&storage, name, json),
        CollectionCommands::Show { name, id } => show(&storage, name, id, json),
    }
}

fn list_collections(storage: &SqliteStorage, json: bool) -> Result<()> {
    let collections = read_or_default("collections", storage.list_collections());

    if json {
        let output = CollectionsOutput {
            collections: &collections,
            count: collections.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if collections.is_empty() {
        println!("No mirrored collections. Run 'edusync mirror <name>' while online.");
        return Ok(());
    }
    for collection in &collections {
        let mirrored = chrono::DateTime::from_timestamp_millis(collection.mirrored_at)
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:<20} {:>6} documents  {}",
            collection.name.cyan(),
            collection.documents,
            mirrored.dimmed()
        );
    }
    Ok(())
}

fn list_documents(storage: &SqliteStorage, name: &str, json: bool) -> Result<()> {
    let documents = read_or_default("collection documents", storage.list_collection(name));

    if json {
        let output = DocumentsOutput {
            collection: name,
            documents: documents.iter().map(|d| &d.data).collect(),
            count: documents.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if documents.is_empty() {
        println!("No documents in '{name}'.");
        return Ok(());
    }
    for document in &documents {
        println!("  {} {}", document.id.cyan(), truncate(&label(document), 60));
    }
    println!();
    println!("{} documents", documents.len());
    Ok(())
}

/// A human label for a document: its `name` or `title` field if present.
fn label(document: &CollectionDocument) -> String {
    ["name", "title", "nombre"]
        .iter()
        .find_map(|key| document.data.get(*key).and_then(|v| v.as_str()))
        .unwrap_or_default()
        .to_string()
}

fn show(storage: &SqliteStorage, name: &str, id: &str, json: bool) -> Result<()> {
    let document = storage
        .get_collection_document(name, id)?
        .ok_or_else(|| Error::DocumentNotFound {
            collection: name.to_string(),
            id: id.to_string(),
        })?;

    if json {
        println!("{}", serde_json::to_string(&document.data)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&document.data)?);
    }
    Ok(())
}
