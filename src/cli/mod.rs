//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// edusync - Offline content mirror and write outbox
#[derive(Parser, Debug)]
#[command(name = "edusync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.edusync/data/edusync.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Remote endpoint (overrides EDUSYNC_REMOTE and config.json)
    #[arg(long, global = true)]
    pub remote: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the local database and a default config file
    Init {
        /// Overwrite an existing database
        #[arg(long)]
        force: bool,
    },

    /// Run one pull-and-reconcile pass against the remote
    Sync,

    /// Show local counts, outbox state and sync progress
    Status,

    /// Read cached content (works offline)
    Content {
        #[command(subcommand)]
        command: ContentCommands,
    },

    /// Write a content unit (queued if the remote is unreachable)
    Write(WriteArgs),

    /// Inspect and replay queued writes
    Outbox {
        #[command(subcommand)]
        command: OutboxCommands,
    },

    /// Replace local copies of reference collections with the remote ones
    Mirror {
        /// Collections to mirror (default: mirror.collections in config.json)
        collections: Vec<String>,
    },

    /// Read mirrored collections (works offline)
    Collection {
        #[command(subcommand)]
        command: CollectionCommands,
    },

    /// Save and read cached AI answers (works offline)
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },

    /// Keep syncing: probe connectivity and print status until Ctrl-C
    Watch,

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Content Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ContentCommands {
    /// List cached units
    List {
        /// Only units in this group
        #[arg(long, short)]
        group: Option<String>,
    },

    /// Show one cached unit
    Show {
        /// Unit ID
        id: String,
    },
}

// ============================================================================
// Collection Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum CollectionCommands {
    /// List mirrored collections, or the documents of one
    List {
        /// Collection name
        name: Option<String>,
    },

    /// Show one mirrored document
    Show {
        /// Collection name
        name: String,

        /// Document ID
        id: String,
    },
}

// ============================================================================
// AI Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum AiCommands {
    /// Store a generated answer
    Save(AiSaveArgs),

    /// List answers for a grade and subject, newest first
    List {
        /// Grade slug
        grade: String,

        /// Subject slug
        subject: String,
    },

    /// Show one answer
    Show {
        /// Answer ID
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct AiSaveArgs {
    /// Grade slug
    pub grade: String,

    /// Subject slug
    pub subject: String,

    /// The question that was asked
    #[arg(long)]
    pub query: String,

    /// The answer (Markdown)
    #[arg(long, conflicts_with = "content_file")]
    pub content: Option<String>,

    /// Read the answer from a file
    #[arg(long)]
    pub content_file: Option<PathBuf>,

    /// License the question was asked under
    #[arg(long)]
    pub license: Option<String>,
}

// ============================================================================
// Write
// ============================================================================

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Group the unit belongs to
    pub group: String,

    /// Unit ID (slug)
    pub id: String,

    /// Display name
    #[arg(long)]
    pub name: String,

    /// Short description
    #[arg(long, short)]
    pub description: Option<String>,

    /// Body (HTML)
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Collection the unit is filed under
    #[arg(long)]
    pub collection: Option<String>,
}

// ============================================================================
// Outbox Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum OutboxCommands {
    /// List queued writes
    List,

    /// Replay queued writes now
    Drain {
        /// Ignore backoff and send every pending entry
        #[arg(long)]
        all: bool,
    },

    /// Return a rejected or backed-off entry to the queue
    Requeue {
        /// Outbox entry ID
        id: String,
    },

    /// Delete a queued write without sending it
    Discard {
        /// Outbox entry ID
        id: String,
    },
}
