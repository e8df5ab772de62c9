//! Versioned schema upgrades, tracked in `PRAGMA user_version`.

use super::schema;
use rusqlite::{Connection, Transaction, types::Type};
use tracing::{debug, warn};

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "event log, rules and snapshot tables",
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        name: "as-of and scope indexes",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// Newest schema this build can write.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

/// Schema version recorded in the database header.
///
/// # Errors
///
/// Fails if the pragma cannot be read or holds a negative/oversized value.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(err)))
}

fn apply(tx: &Transaction<'_>, migration: &Migration) -> rusqlite::Result<()> {
    tx.execute_batch(migration.sql)?;
    let version = i64::from(migration.version);
    tx.pragma_update(None, "user_version", version)?;
    tx.execute(
        "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
        [version],
    )?;
    Ok(())
}

/// Bring the database up to [`LATEST_SCHEMA_VERSION`], one transaction per
/// step. Returns the version the database ends at.
///
/// A database written by a newer build is left untouched.
///
/// # Errors
///
/// Fails if reading the version or applying any step fails; earlier steps
/// stay committed.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let start = current_schema_version(conn)?;
    if start > LATEST_SCHEMA_VERSION {
        warn!(
            found = start,
            latest = LATEST_SCHEMA_VERSION,
            "store schema is newer than this build"
        );
        return Ok(start);
    }

    let mut version = start;
    for migration in MIGRATIONS.iter().filter(|m| m.version > start) {
        let tx = conn.transaction()?;
        apply(&tx, migration)?;
        tx.commit()?;
        debug!(version = migration.version, name = migration.name, "applied migration");
        version = migration.version;
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_object(conn: &Connection, kind: &str, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = ?1 AND name = ?2",
            [kind, name],
            |row| row.get(0),
        )
        .expect("query sqlite_master")
    }

    fn meta_version(conn: &Connection) -> i64 {
        conn.query_row("SELECT schema_version FROM store_meta WHERE id = 1", [], |row| {
            row.get(0)
        })
        .expect("store_meta row")
    }

    #[test]
    fn fresh_database_gets_every_table_and_index() {
        let mut conn = Connection::open_in_memory().expect("open");
        assert_eq!(migrate(&mut conn).expect("migrate"), LATEST_SCHEMA_VERSION);
        assert_eq!(
            current_schema_version(&conn).expect("version"),
            LATEST_SCHEMA_VERSION
        );

        let tables = [
            "tags",
            "columns",
            "items",
            "item_parents",
            "events",
            "day_edges",
            "rules",
            "snapshots",
            "category_edges",
            "categorized_snapshots",
            "store_meta",
        ];
        let missing: Vec<_> = tables
            .iter()
            .filter(|table| !has_object(&conn, "table", table))
            .collect();
        assert!(missing.is_empty(), "missing tables: {missing:?}");

        for index in schema::REQUIRED_INDEXES {
            assert!(has_object(&conn, "index", index), "missing index {index}");
        }
    }

    #[test]
    fn rerunning_is_a_no_op() {
        let mut conn = Connection::open_in_memory().expect("open");
        migrate(&mut conn).expect("first run");
        migrate(&mut conn).expect("second run");

        let meta_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM store_meta", [], |row| row.get(0))
            .expect("count");
        assert_eq!(meta_rows, 1);
        assert_eq!(meta_version(&conn), i64::from(LATEST_SCHEMA_VERSION));
    }

    #[test]
    fn version_one_store_keeps_its_event_log() {
        let mut conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(schema::MIGRATION_V1_SQL).expect("v1 ddl");
        conn.pragma_update(None, "user_version", 1_i64).expect("pragma");
        conn.execute(
            "INSERT INTO items (item_id, title, story_points, status)
             VALUES (42, 'Migrate search', '3', 'open')",
            [],
        )
        .expect("seed item");

        assert_eq!(migrate(&mut conn).expect("migrate"), LATEST_SCHEMA_VERSION);

        let title: String = conn
            .query_row("SELECT title FROM items WHERE item_id = 42", [], |row| row.get(0))
            .expect("item survives");
        assert_eq!(title, "Migrate search");
        assert_eq!(meta_version(&conn), i64::from(LATEST_SCHEMA_VERSION));
    }

    #[test]
    fn newer_store_is_left_alone() {
        let mut conn = Connection::open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");
        conn.pragma_update(None, "user_version", 9_i64).expect("pragma");

        assert_eq!(migrate(&mut conn).expect("migrate"), 9);
        assert_eq!(meta_version(&conn), i64::from(LATEST_SCHEMA_VERSION));
    }
}
