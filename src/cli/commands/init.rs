//! Initialize the local database.
//!
//! Creates `~/.edusync/data/edusync.db` (or the path from `--db` /
//! `EDUSYNC_DB`) with the schema applied, plus a default `config.json` if
//! none exists yet.

use crate::config::{EdusyncConfig, config_path, resolve_db_path, save_config_to};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<PathBuf>,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the database exists and `force` is not
/// set, or an error if the directory or database cannot be created.
pub fn execute(db_path: Option<&PathBuf>, force: bool, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path()))
        .ok_or_else(|| Error::Config("Could not determine edusync directory".to_string()))?;

    let config = config_path().ok().filter(|p| !p.exists());
    init_at(&db_path, config.as_deref(), force)?;

    if json {
        let output = InitOutput {
            database: db_path,
            config,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized edusync database");
        println!("  Database: {}", db_path.display());
        if let Some(config) = config {
            println!("  Config:   {}", config.display());
        }
        println!();
        println!("Next: set remote.endpoint in config.json, then run 'edusync sync'.");
    }

    Ok(())
}

fn init_at(db_path: &Path, config: Option<&Path>, force: bool) -> Result<()> {
    if db_path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized {
                path: db_path.to_path_buf(),
            });
        }
        fs::remove_file(db_path)?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = PathBuf::from(format!("{}{suffix}", db_path.display()));
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Opening applies the schema.
    SqliteStorage::open(db_path)?;

    if let Some(config) = config {
        save_config_to(config, &EdusyncConfig::default())?;
    }

    Ok(())
}
