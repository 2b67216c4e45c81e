//! Sync engine.
//!
//! Pulls remote content, diffs it against the sync ledger and writes the
//! delta into the local store:
//!
//! - **Engine**: single-flight pull-and-reconcile passes
//! - **In-flight set**: ids currently being written, for "syncing" indicators
//! - **Catalog**: unit ids from the last fetch, the denominator of progress
//!
//! # Example
//!
//! ```ignore
//! let engine = SyncEngine::new(store, gateway, monitor, in_flight, catalog);
//! let report = engine.run().await;
//! println!("{}% synced", report.progress);
//! ```

mod catalog;
mod engine;
mod inflight;

pub use catalog::Catalog;
pub use engine::{PassOutcome, PassReport, SyncEngine, progress_percent};
pub use inflight::{InFlightGuard, InFlightSet};
