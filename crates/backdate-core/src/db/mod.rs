//! SQLite-backed event store.
//!
//! Connections run in WAL mode so report readers are not blocked by a
//! reconstruction, wait up to [`BUSY_TIMEOUT`] on a locked database, and
//! enforce foreign keys on the source log tables.

pub mod migrations;
pub mod schema;
pub mod store;

pub use store::SqliteStore;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

/// How long a connection waits on a locked database.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the store at `path`, creating the file and its directory if needed,
/// and migrate it to the current schema.
///
/// # Errors
///
/// Fails if the directory or database cannot be created, a pragma is
/// rejected, or a migration fails.
pub fn open_store(path: &Path) -> Result<SqliteStore> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create store directory {}", dir.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store {}", path.display()))?;
    tune(&conn).with_context(|| format!("set pragmas on {}", path.display()))?;
    let version = migrations::migrate(&mut conn).context("migrate store schema")?;
    tracing::debug!(path = %path.display(), version, "store ready");

    Ok(SqliteStore::new(conn))
}

fn tune(conn: &Connection) -> rusqlite::Result<()> {
    // journal_mode answers with the resulting mode, so it has to be read.
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(%mode, "store is not in WAL mode");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)
}
