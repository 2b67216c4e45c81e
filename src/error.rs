//! Error types for edusync.
//!
//! Provides structured error handling with:
//! - A three-way failure taxonomy (`ErrorClass`) that decides retry behavior
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for edusync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Class ───────────────────────────────────────────────

/// How a failure should be treated by the sync and outbox machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connectivity absent or request timed out. Transient; retry later.
    Network,
    /// The backend answered and rejected the request. Never auto-retried.
    Remote,
    /// Local persistence failed.
    Storage,
    /// Anything else (bad input, config, local I/O).
    Local,
}

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string; shells on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    NotInitialized,
    AlreadyInitialized,
    StorageError,

    // Not Found (exit 3)
    ContentNotFound,
    OutboxEntryNotFound,
    DocumentNotFound,
    AiContentNotFound,

    // Validation (exit 4)
    InvalidArgument,

    // Network (exit 6)
    NetworkError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Remote rejection (exit 9)
    RemoteRejected,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::StorageError => "STORAGE_ERROR",
            Self::ContentNotFound => "CONTENT_NOT_FOUND",
            Self::OutboxEntryNotFound => "OUTBOX_ENTRY_NOT_FOUND",
            Self::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            Self::AiContentNotFound => "AI_CONTENT_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::RemoteRejected => "REMOTE_REJECTED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::StorageError => 2,
            Self::ContentNotFound
            | Self::OutboxEntryNotFound
            | Self::DocumentNotFound
            | Self::AiContentNotFound => 3,
            Self::InvalidArgument => 4,
            Self::NetworkError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::RemoteRejected => 9,
        }
    }

    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::StorageError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in edusync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `edusync init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Content unit not found: {id}")]
    ContentNotFound { id: String },

    #[error("Outbox entry not found: {id}")]
    OutboxEntryNotFound { id: String },

    #[error("Document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    #[error("AI answer not found: {id}")]
    AiContentNotFound { id: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote rejected request ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify this error for retry decisions.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_) => ErrorClass::Network,
            Self::Remote { .. } => ErrorClass::Remote,
            Self::Storage(_) | Self::NotInitialized => ErrorClass::Storage,
            _ => ErrorClass::Local,
        }
    }

    /// True for transient connectivity failures.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self.class(), ErrorClass::Network)
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Storage(_) => ErrorCode::StorageError,
            Self::ContentNotFound { .. } => ErrorCode::ContentNotFound,
            Self::OutboxEntryNotFound { .. } => ErrorCode::OutboxEntryNotFound,
            Self::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            Self::AiContentNotFound { .. } => ErrorCode::AiContentNotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Network(_) => ErrorCode::NetworkError,
            Self::Remote { .. } => ErrorCode::RemoteRejected,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `edusync init` to create the local database".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::ContentNotFound { id } => Some(format!(
                "No local content with ID '{id}'. Run `edusync sync` while online, \
                 or `edusync content list` to see what is cached."
            )),

            Self::OutboxEntryNotFound { id } => Some(format!(
                "No outbox entry with ID '{id}'. Use `edusync outbox list` to see queued writes."
            )),

            Self::DocumentNotFound { collection, .. } => Some(format!(
                "Run `edusync mirror {collection}` while online to refresh the local copy"
            )),

            Self::AiContentNotFound { .. } => {
                Some("Use `edusync ai list` to see cached answers".to_string())
            }

            Self::Network(_) => Some(
                "The remote backend is unreachable. Local reads keep working; \
                 writes are queued and replayed when connectivity returns."
                    .to_string(),
            ),

            Self::Remote { status, .. } if *status == 401 || *status == 403 => Some(
                "Check the remote token (`EDUSYNC_TOKEN` or `remote.token` in config.json)"
                    .to_string(),
            ),

            Self::Remote { .. } => Some(
                "The backend rejected the write. Rejected outbox entries stay parked; \
                 use `edusync outbox requeue <id>` after fixing the cause, \
                 or `edusync outbox discard <id>`."
                    .to_string(),
            ),

            Self::Config(_) => {
                Some("Configuration lives in ~/.edusync/config.json".to_string())
            }

            Self::Storage(_) | Self::Io(_) | Self::Json(_) | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(Error::Network("timeout".into()).class(), ErrorClass::Network);
        assert_eq!(
            Error::Remote { status: 422, message: "bad".into() }.class(),
            ErrorClass::Remote
        );
        assert_eq!(
            Error::Storage(rusqlite::Error::InvalidQuery).class(),
            ErrorClass::Storage
        );
        assert_eq!(Error::InvalidArgument("x".into()).class(), ErrorClass::Local);
    }

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::NotInitialized.exit_code(), 2);
        assert_eq!(Error::ContentNotFound { id: "a".into() }.exit_code(), 3);
        assert_eq!(
            Error::DocumentNotFound { collection: "licenses".into(), id: "x".into() }.exit_code(),
            3
        );
        assert_eq!(Error::Network("down".into()).exit_code(), 6);
        assert_eq!(Error::Remote { status: 400, message: String::new() }.exit_code(), 9);
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::Remote { status: 403, message: "forbidden".into() };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "REMOTE_REJECTED");
        assert_eq!(json["error"]["retryable"], false);
        assert!(json["error"]["hint"].as_str().unwrap().contains("token"));
    }

    #[test]
    fn test_network_is_retryable() {
        let json = Error::Network("timed out".into()).to_structured_json();
        assert_eq!(json["error"]["retryable"], true);
    }
}
