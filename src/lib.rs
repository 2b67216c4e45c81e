//! edusync - offline content mirror and write outbox
//!
//! This crate keeps a local copy of curriculum content readable without a
//! connection, replicates the remote catalog when connectivity returns, and
//! queues writes that could not reach the backend.
//!
//! # Architecture
//!
//! - [`storage`] - SQLite local store (content, sync ledger, outbox,
//!   mirrored collections, cached AI answers)
//! - [`remote`] - Remote gateway trait, HTTP and in-memory implementations
//! - [`connectivity`] - Online/offline state and reachability probe
//! - [`sync`] - Pull-and-reconcile engine, catalog, in-flight set
//! - [`outbox`] - Queued writes, replay and backoff
//! - [`mirror`] - Clear-and-replace mirror of reference collections
//! - [`status`] - Derived progress and connectivity view
//! - [`context`] - Wiring of the above, built once at startup
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Paths and settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod error;
pub mod mirror;
pub mod model;
pub mod notify;
pub mod outbox;
pub mod remote;
pub mod status;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
