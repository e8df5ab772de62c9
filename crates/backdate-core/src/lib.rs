//! backdate-core library.
//!
//! Rebuilds "as this item looked on day D" snapshots from an append-only log
//! of attribute-change events, then labels every snapshot with a category
//! taken from an ordered, per-scope rule set.
//!
//! Data flows leaves-first:
//!
//! 1. [`store::EventStore`] answers as-of questions against the event log
//!    ([`db::SqliteStore`] is the bundled implementation).
//! 2. [`rules::load_rules`] turns a recategorization table into stored rules.
//! 3. [`reconstruct::Reconstructor`] walks the window day by day and writes
//!    one [`model::snapshot::Snapshot`] per active item.
//! 4. [`recategorize::recategorize`] applies the rules and publishes the
//!    reporting-facing table, which [`backlog::tall_backlog`] summarizes.
//!
//! # Conventions
//!
//! - **Errors**: domain operations return [`error::EngineError`]; storage
//!   helpers return `anyhow::Result` with context.
//! - **Logging**: `tracing` macros with structured fields.

pub mod backlog;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod recategorize;
pub mod reconstruct;
pub mod rules;
pub mod store;

pub use error::{EngineError, ErrorCode};
