//! AI answer command implementations.
//!
//! Answers are cached on the device only; nothing here contacts the remote.

use crate::cli::commands::{open_storage, truncate};
use crate::cli::{AiCommands, AiSaveArgs};
use crate::error::{Error, Result};
use crate::model::AiContent;
use crate::storage::{LocalStore, SqliteStorage, read_or_default};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ListOutput<'a> {
    answers: &'a [AiContent],
    count: usize,
}

/// Execute AI answer commands.
///
/// # Errors
///
/// Returns `NotInitialized` without a database, `InvalidArgument` for an
/// empty answer, or `AiContentNotFound` for an unknown id.
pub fn execute(command: &AiCommands, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    match command {
        AiCommands::Save(args) => save(&storage, args, json),
        AiCommands::List { grade, subject } => list(&storage, grade, subject, json),
        AiCommands::Show { id } => show(&storage, id, json),
    }
}

fn build_answer(args: &AiSaveArgs) -> Result<AiContent> {
    let content = match (&args.content, &args.content_file) {
        (Some(content), _) => content.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => String::new(),
    };
    if content.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "answer is empty; pass --content or --content-file".into(),
        ));
    }
    if args.query.trim().is_empty() {
        return Err(Error::InvalidArgument("--query must not be empty".into()));
    }

    let answer = AiContent::new(&args.query, content, &args.grade, &args.subject);
    Ok(match &args.license {
        Some(license) => answer.with_license(license),
        None => answer,
    })
}

fn save(storage: &SqliteStorage, args: &AiSaveArgs, json: bool) -> Result<()> {
    let answer = build_answer(args)?;
    storage.put_ai_content(&answer)?;

    if json {
        println!("{}", serde_json::to_string(&answer)?);
    } else {
        println!("{} {}", "Saved".green(), answer.id);
    }
    Ok(())
}

fn list(storage: &SqliteStorage, grade: &str, subject: &str, json: bool) -> Result<()> {
    let answers = read_or_default("ai answers", storage.list_ai_content(grade, subject));

    if json {
        let output = ListOutput {
            answers: &answers,
            count: answers.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if answers.is_empty() {
        println!("No saved answers for {grade} / {subject}.");
        return Ok(());
    }
    for answer in &answers {
        let created = chrono::DateTime::from_timestamp_millis(answer.created_at)
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "  {} {} {}",
            answer.id.cyan(),
            created.dimmed(),
            truncate(&answer.query, 60)
        );
    }
    Ok(())
}

fn show(storage: &SqliteStorage, id: &str, json: bool) -> Result<()> {
    let answer = storage
        .get_ai_content(id)?
        .ok_or_else(|| Error::AiContentNotFound { id: id.to_string() })?;

    if json {
        println!("{}", serde_json::to_string(&answer)?);
        return Ok(());
    }

    println!("{}", answer.query.bold());
    println!("  {} / {}", answer.grade_slug, answer.subject_slug);
    println!();
    println!("{}", answer.content);
    Ok(())
}
